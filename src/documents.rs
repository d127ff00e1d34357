//! Document sources for the bulk sweeps.

use crate::bulk::JobKind;
use crate::html;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Opaque document identifier, persisted as a plain JSON string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<u64> for DocumentId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for DocumentId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for DocumentId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Numeric ids compare numerically and sort before all other ids.
impl Ord for DocumentId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.0.parse::<u64>(), other.0.parse::<u64>()) {
            (Ok(a), Ok(b)) => a.cmp(&b).then_with(|| self.0.cmp(&other.0)),
            (Ok(_), Err(_)) => Ordering::Less,
            (Err(_), Ok(_)) => Ordering::Greater,
            (Err(_), Err(_)) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for DocumentId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub id: DocumentId,
    pub title: String,
    /// Raw markup or text as stored.
    pub body: String,
    /// Where relative image paths in `body` are resolved from, if anywhere.
    pub base_dir: Option<PathBuf>,
}

/// Where the sweeps get their documents from.
pub trait DocumentStore: Send + Sync {
    /// Ids a sweep of `kind` should visit, in processing order.
    fn list_eligible_document_ids(&self, kind: JobKind) -> Result<Vec<DocumentId>>;

    fn load(&self, id: &DocumentId) -> Result<Document>;
}

impl<T: DocumentStore + ?Sized> DocumentStore for Arc<T> {
    fn list_eligible_document_ids(&self, kind: JobKind) -> Result<Vec<DocumentId>> {
        (**self).list_eligible_document_ids(kind)
    }

    fn load(&self, id: &DocumentId) -> Result<Document> {
        (**self).load(id)
    }
}

const DOCUMENT_EXTENSIONS: &[&str] = &["html", "htm", "md", "txt"];

/// Every `.html`, `.htm`, `.md` or `.txt` file directly inside `root` is a
/// document whose id is the file stem.
#[derive(Debug, Clone)]
pub struct DirectoryDocuments {
    root: PathBuf,
}

impl DirectoryDocuments {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn is_document(path: &Path) -> bool {
        path.is_file()
            && path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| DOCUMENT_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                .unwrap_or(false)
    }

    fn path_for(&self, id: &DocumentId) -> Result<PathBuf> {
        let id = id.as_str();
        if id.is_empty() || id.contains(['/', '\\']) || id == "." || id == ".." {
            bail!("Invalid document id '{}'", id);
        }

        DOCUMENT_EXTENSIONS
            .iter()
            .map(|ext| self.root.join(format!("{}.{}", id, ext)))
            .find(|path| path.is_file())
            .with_context(|| format!("Document '{}' not found in {}", id, self.root.display()))
    }
}

impl DocumentStore for DirectoryDocuments {
    fn list_eligible_document_ids(&self, kind: JobKind) -> Result<Vec<DocumentId>> {
        let entries = std::fs::read_dir(&self.root)
            .with_context(|| format!("Failed to read documents directory {}", self.root.display()))?;

        let mut ids = Vec::new();
        for entry in entries {
            let path = entry.context("Failed to read directory entry")?.path();
            if !Self::is_document(&path) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(DocumentId::from(stem));
            }
        }
        ids.sort();
        // "a.html" and "a.md" are the same document
        ids.dedup();

        debug!(
            "Listed {} documents for {} sweep in {}",
            ids.len(),
            kind,
            self.root.display()
        );
        Ok(ids)
    }

    fn load(&self, id: &DocumentId) -> Result<Document> {
        let path = self.path_for(id)?;
        let body = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read document {}", path.display()))?;
        let title = html::extract_title(&body).unwrap_or_else(|| id.to_string());

        Ok(Document {
            id: id.clone(),
            title,
            body,
            base_dir: Some(self.root.clone()),
        })
    }
}
