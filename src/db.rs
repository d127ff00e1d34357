use crate::bulk::{KeyValueStore, StoreError};
use crate::documents::DocumentId;
use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Keywords generated for one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredKeywords {
    pub keywords: String,
    pub language: String,
    pub updated_at: String,
}

/// SQLite store for bulk job state (`kv`) and generated artifacts.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the database file and its tables.
    pub fn new(database_path: &str) -> Result<Self> {
        if let Some(parent) = Path::new(database_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create database directory {}", parent.display())
                })?;
            }
        }

        let conn = Connection::open(database_path)
            .context(format!("Failed to open database at {}", database_path))?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS document_keywords (
                document_id TEXT PRIMARY KEY,
                keywords TEXT NOT NULL,
                language TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS document_alt_texts (
                document_id TEXT NOT NULL,
                image_key TEXT NOT NULL,
                alt_text TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (document_id, image_key)
            );",
        )
        .context("Failed to create tables")?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    // ==================== Artifacts ====================

    pub fn save_keywords(&self, document: &DocumentId, keywords: &str, language: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO document_keywords (document_id, keywords, language, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(document_id) DO UPDATE SET
                keywords = excluded.keywords,
                language = excluded.language,
                updated_at = excluded.updated_at",
            params![document.as_str(), keywords, language, Utc::now().to_rfc3339()],
        )
        .context(format!("Failed to save keywords for document {}", document))?;
        Ok(())
    }

    pub fn keywords_for(&self, document: &DocumentId) -> Result<Option<StoredKeywords>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT keywords, language, updated_at FROM document_keywords WHERE document_id = ?1",
            params![document.as_str()],
            |row| {
                Ok(StoredKeywords {
                    keywords: row.get(0)?,
                    language: row.get(1)?,
                    updated_at: row.get(2)?,
                })
            },
        )
        .optional()
        .context(format!("Failed to load keywords for document {}", document))
    }

    /// Replace every stored alt text of `document` with `alt_texts`.
    pub fn replace_alt_texts(
        &self,
        document: &DocumentId,
        alt_texts: &BTreeMap<String, String>,
    ) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction()
            .context("Failed to begin alt text transaction")?;

        tx.execute(
            "DELETE FROM document_alt_texts WHERE document_id = ?1",
            params![document.as_str()],
        )?;
        let now = Utc::now().to_rfc3339();
        for (image_key, alt_text) in alt_texts {
            tx.execute(
                "INSERT INTO document_alt_texts (document_id, image_key, alt_text, updated_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![document.as_str(), image_key, alt_text, now],
            )?;
        }

        tx.commit()
            .context(format!("Failed to save alt texts for document {}", document))?;
        Ok(())
    }

    pub fn alt_texts_for(&self, document: &DocumentId) -> Result<BTreeMap<String, String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT image_key, alt_text FROM document_alt_texts WHERE document_id = ?1",
        )?;
        let rows = stmt.query_map(params![document.as_str()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let alt_texts = rows
            .collect::<rusqlite::Result<BTreeMap<_, _>>>()
            .context(format!("Failed to load alt texts for document {}", document))?;
        Ok(alt_texts)
    }
}

impl KeyValueStore for Database {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let conn = self.conn()?;
        Ok(conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }

    fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        new: Option<&str>,
    ) -> Result<bool, StoreError> {
        let mut conn = self.conn()?;
        // IMMEDIATE takes the write lock up front so other connections to the
        // same file cannot interleave between the read and the write
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let current: Option<String> = tx
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        if current.as_deref() != expected {
            return Ok(false);
        }

        match new {
            Some(value) => tx.execute(
                "INSERT INTO kv (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )?,
            None => tx.execute("DELETE FROM kv WHERE key = ?1", params![key])?,
        };
        tx.commit()?;
        Ok(true)
    }
}
