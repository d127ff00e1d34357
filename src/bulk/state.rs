//! Persisted shape of a bulk job.

use super::error::BulkError;
use super::store::{KeyValueStore, StoreError};
use crate::documents::DocumentId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// The two sweeps a controller can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Keywords,
    AltText,
}

impl JobKind {
    pub const ALL: [JobKind; 2] = [JobKind::Keywords, JobKind::AltText];

    /// Slug used in persisted key names.
    pub fn slug(self) -> &'static str {
        match self {
            JobKind::Keywords => "keywords",
            JobKind::AltText => "alt",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for JobKind {
    type Err = BulkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "keywords" => Ok(JobKind::Keywords),
            "alt" | "alt_text" => Ok(JobKind::AltText),
            other => Err(BulkError::Configuration(format!(
                "unknown job kind '{}' (expected 'keywords' or 'alt')",
                other
            ))),
        }
    }
}

/// Store keys of one job kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateKeys {
    pub queue: String,
    pub total: String,
    pub lock: String,
    pub stopped: String,
}

impl StateKeys {
    pub fn for_kind(kind: JobKind) -> Self {
        let prefix = format!("bulk_{}", kind.slug());
        Self {
            queue: format!("{}_post_list", prefix),
            total: format!("{}_post_list_total", prefix),
            lock: format!("{}_lock", prefix),
            stopped: format!("{}_stopped", prefix),
        }
    }

    pub fn all(&self) -> [&str; 4] {
        [&self.queue, &self.total, &self.lock, &self.stopped]
    }
}

/// Snapshot of the work still to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkJobState {
    pub pending: VecDeque<DocumentId>,
    pub total: usize,
}

impl BulkJobState {
    pub fn new(pending: Vec<DocumentId>) -> Self {
        let total = pending.len();
        Self {
            pending: pending.into(),
            total,
        }
    }

    pub fn remaining(&self) -> usize {
        self.pending.len()
    }

    /// Documents already taken off the queue.
    pub fn processed(&self) -> usize {
        self.total.saturating_sub(self.remaining())
    }

    /// `floor(processed * 100 / total)`, 0 for an empty job.
    pub fn percentage(&self) -> i32 {
        percentage(self.processed(), self.total)
    }

    /// Read the snapshot; `None` when no queue has been persisted yet.
    ///
    /// A missing total falls back to the queue length.
    pub fn load<S: KeyValueStore + ?Sized>(
        store: &S,
        keys: &StateKeys,
    ) -> Result<Option<Self>, BulkError> {
        let Some(raw_queue) = store.get(&keys.queue)? else {
            return Ok(None);
        };
        let pending: VecDeque<DocumentId> = serde_json::from_str(&raw_queue).map_err(|e| {
            BulkError::Configuration(format!("malformed queue under {}: {}", keys.queue, e))
        })?;

        let total = match store.get(&keys.total)? {
            Some(raw) => raw.trim().parse::<usize>().map_err(|e| {
                BulkError::Configuration(format!(
                    "malformed total under {}: '{}' ({})",
                    keys.total, raw, e
                ))
            })?,
            None => pending.len(),
        };

        Ok(Some(Self { pending, total }))
    }

    pub fn save<S: KeyValueStore + ?Sized>(
        &self,
        store: &S,
        keys: &StateKeys,
    ) -> Result<(), BulkError> {
        self.save_queue(store, keys)?;
        store.set(&keys.total, &self.total.to_string())?;
        Ok(())
    }

    /// Persist only the queue; the total never changes after the snapshot.
    pub fn save_queue<S: KeyValueStore + ?Sized>(
        &self,
        store: &S,
        keys: &StateKeys,
    ) -> Result<(), BulkError> {
        let queue = serde_json::to_string(&self.pending).map_err(StoreError::from)?;
        store.set(&keys.queue, &queue)?;
        Ok(())
    }
}

pub(crate) fn percentage(processed: usize, total: usize) -> i32 {
    if total == 0 {
        return 0;
    }
    ((processed.min(total) * 100) / total) as i32
}

/// Lock record of a running step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobLease {
    pub holder: String,
    pub acquired_at: DateTime<Utc>,
}

impl JobLease {
    pub fn new() -> Self {
        Self {
            holder: uuid::Uuid::new_v4().to_string(),
            acquired_at: Utc::now(),
        }
    }

    /// A lease is live until `timeout` has elapsed since acquisition.
    pub fn is_live(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        let age = now.signed_duration_since(self.acquired_at);
        match chrono::Duration::from_std(timeout) {
            Ok(timeout) => age < timeout,
            // timeouts beyond chrono's range never expire
            Err(_) => true,
        }
    }

    pub fn parse(raw: &str, key: &str) -> Result<Self, BulkError> {
        serde_json::from_str(raw)
            .map_err(|e| BulkError::Configuration(format!("malformed lease under {}: {}", key, e)))
    }

    pub fn to_json(&self) -> Result<String, BulkError> {
        Ok(serde_json::to_string(self).map_err(StoreError::from)?)
    }
}

impl Default for JobLease {
    fn default() -> Self {
        Self::new()
    }
}
