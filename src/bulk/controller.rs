//! One-document-per-call driver for the bulk sweeps.
//!
//! Every call to [`BulkJobController::step`] rebuilds the job from the store,
//! so consecutive steps may come from different tasks or processes as long as
//! they share the store.

use super::error::BulkError;
use super::lease::{self, LeaseOutcome};
use super::state::{percentage, BulkJobState, JobKind, JobLease, StateKeys};
use super::store::KeyValueStore;
use crate::documents::{DocumentId, DocumentStore};
use chrono::Utc;
use futures::future::BoxFuture;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// What the per-document callback did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationResult {
    Generated { text: Option<String> },
    Skipped { reason: String },
    Failed { reason: String },
}

/// Work done for one document of a sweep.
///
/// An `Err` aborts the step with a failure report; `Ok(Failed)` and
/// `Ok(Skipped)` count the document as processed and let the job continue.
pub trait GenerationCallback: Send + Sync {
    fn generate<'a>(
        &'a self,
        document: &'a DocumentId,
    ) -> BoxFuture<'a, anyhow::Result<GenerationResult>>;
}

impl<F, Fut> GenerationCallback for F
where
    F: Fn(DocumentId) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<GenerationResult>> + Send + 'static,
{
    fn generate<'a>(
        &'a self,
        document: &'a DocumentId,
    ) -> BoxFuture<'a, anyhow::Result<GenerationResult>> {
        Box::pin(self(document.clone()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Progress,
    Complete,
    Stopped,
    Busy,
    Failed,
}

/// Outcome of one step, as reported to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReport {
    pub status: StepStatus,
    /// -1 when stopped, 100 when complete, otherwise progress so far.
    pub percentage: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document: Option<DocumentId>,
}

pub const STOPPED_PERCENTAGE: i32 = -1;

impl StepReport {
    fn new(status: StepStatus, percentage: i32, message: impl Into<String>) -> Self {
        Self {
            status,
            percentage,
            message: message.into(),
            document: None,
        }
    }

    fn for_document(mut self, document: DocumentId) -> Self {
        self.document = Some(document);
        self
    }

    fn stopped() -> Self {
        Self::new(StepStatus::Stopped, STOPPED_PERCENTAGE, "Process was stopped")
    }

    fn busy() -> Self {
        Self::new(StepStatus::Busy, 0, "Another process is already running")
    }

    fn complete(message: impl Into<String>) -> Self {
        Self::new(StepStatus::Complete, 100, message)
    }

    /// True once the caller should stop polling.
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, StepStatus::Complete | StepStatus::Stopped)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StopAck {
    pub success: bool,
}

/// Read-only view of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkJobStatus {
    pub kind: JobKind,
    /// A queue has been snapshotted and not yet cleared.
    pub running: bool,
    pub total: usize,
    pub remaining: usize,
    pub percentage: i32,
    /// A live lease exists.
    pub locked: bool,
    pub stop_requested: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Age after which a lease may be taken over.
    pub lock_timeout: Duration,
    /// Ceiling for a single callback invocation.
    pub step_timeout: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(120),
            step_timeout: Duration::from_secs(300),
        }
    }
}

pub struct BulkJobController<S, D> {
    store: S,
    documents: D,
    config: ControllerConfig,
    callbacks: HashMap<JobKind, Arc<dyn GenerationCallback>>,
}

impl<S, D> BulkJobController<S, D>
where
    S: KeyValueStore,
    D: DocumentStore,
{
    pub fn new(store: S, documents: D, config: ControllerConfig) -> Self {
        Self {
            store,
            documents,
            config,
            callbacks: HashMap::new(),
        }
    }

    /// Register the per-document work for `kind`, replacing any previous one.
    pub fn with_callback(
        mut self,
        kind: JobKind,
        callback: impl GenerationCallback + 'static,
    ) -> Self {
        self.callbacks.insert(kind, Arc::new(callback));
        self
    }

    pub fn config(&self) -> ControllerConfig {
        self.config
    }

    /// Process at most one document of `kind`.
    ///
    /// Never fails: every error becomes a [`StepStatus::Failed`] report and
    /// no path leaves the lease held.
    pub async fn step(&self, kind: JobKind) -> StepReport {
        let keys = StateKeys::for_kind(kind);
        match self.try_step(kind, &keys).await {
            Ok(report) => {
                debug!(
                    "{} step: {:?} {}% {}",
                    kind, report.status, report.percentage, report.message
                );
                report
            }
            Err(e) => {
                warn!("{} step failed: {}", kind, e);
                let report =
                    StepReport::new(StepStatus::Failed, 0, format!("Error processing: {}", e));
                match e.document() {
                    Some(document) => report.for_document(document.clone()),
                    None => report,
                }
            }
        }
    }

    async fn try_step(&self, kind: JobKind, keys: &StateKeys) -> Result<StepReport, BulkError> {
        if self.stop_requested(keys)? {
            self.clear(keys, true)?;
            info!("{} sweep stopped", kind);
            return Ok(StepReport::stopped());
        }

        let callback = self.callbacks.get(&kind).cloned().ok_or_else(|| {
            BulkError::Configuration(format!("no generation callback registered for {}", kind))
        })?;

        let lease = match lease::acquire(&self.store, &keys.lock, self.config.lock_timeout)? {
            LeaseOutcome::Acquired(lease) => lease,
            LeaseOutcome::Held => return Ok(StepReport::busy()),
        };

        let outcome = self.step_locked(kind, keys, callback.as_ref()).await;

        let released = lease::release(&self.store, &keys.lock, &lease);
        match (outcome, released) {
            (Ok(report), Ok(_)) => Ok(report),
            (Err(e), _) => Err(e),
            (Ok(_), Err(e)) => Err(e),
        }
    }

    /// Everything that happens while the lease is held.
    async fn step_locked(
        &self,
        kind: JobKind,
        keys: &StateKeys,
        callback: &dyn GenerationCallback,
    ) -> Result<StepReport, BulkError> {
        let mut state = match BulkJobState::load(&self.store, keys)? {
            Some(state) => state,
            None => {
                let ids = self
                    .documents
                    .list_eligible_document_ids(kind)
                    .map_err(BulkError::Documents)?;
                let state = BulkJobState::new(ids);
                state.save(&self.store, keys)?;
                info!("{} sweep started with {} documents", kind, state.total);
                state
            }
        };

        // a stop may have arrived while the queue was being snapshotted
        if self.stop_requested(keys)? {
            self.clear(keys, false)?;
            info!("{} sweep stopped", kind);
            return Ok(StepReport::stopped());
        }

        let Some(document) = state.pending.pop_front() else {
            self.clear(keys, false)?;
            info!("{} sweep complete", kind);
            return Ok(StepReport::complete("Processing complete"));
        };

        let processed = state.total.saturating_sub(state.remaining() + 1);
        let pct = percentage(processed, state.total);

        // persisted before the callback runs: a failing document is not retried
        state.save_queue(&self.store, keys)?;

        let result = match self.run_callback(callback, &document).await {
            Ok(result) => result,
            Err(e) => {
                warn!("{} sweep: document {} failed: {}", kind, document, e);
                return Ok(StepReport::new(
                    StepStatus::Failed,
                    pct,
                    format!("Error processing document {}: {}", document, e),
                )
                .for_document(document));
            }
        };

        if state.pending.is_empty() {
            self.clear(keys, false)?;
            info!("{} sweep complete ({} documents)", kind, state.total);
            return Ok(StepReport::complete(format!(
                "Processing complete: {} documents processed",
                state.total
            ))
            .for_document(document));
        }

        let mut message = format!(
            "Processing document {}... ({} of {})",
            document, processed, state.total
        );
        match &result {
            GenerationResult::Generated { .. } => {}
            GenerationResult::Skipped { reason } => {
                debug!("{} sweep: skipped {}: {}", kind, document, reason);
                message.push_str(&format!(" [skipped: {}]", reason));
            }
            GenerationResult::Failed { reason } => {
                warn!("{} sweep: generation for {} failed: {}", kind, document, reason);
                message.push_str(&format!(" [failed: {}]", reason));
            }
        }

        Ok(StepReport::new(StepStatus::Progress, pct, message).for_document(document))
    }

    async fn run_callback(
        &self,
        callback: &dyn GenerationCallback,
        document: &DocumentId,
    ) -> Result<GenerationResult, BulkError> {
        match tokio::time::timeout(self.config.step_timeout, callback.generate(document)).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(source)) => Err(BulkError::Generation {
                document: document.clone(),
                source,
            }),
            Err(_) => Err(BulkError::Timeout {
                document: document.clone(),
                after: self.config.step_timeout,
            }),
        }
    }

    /// Ask the running sweep of `kind` to stop at its next step.
    pub fn request_stop(&self, kind: JobKind) -> StopAck {
        let keys = StateKeys::for_kind(kind);
        match self.store.set(&keys.stopped, "1") {
            Ok(()) => {
                info!("Stop requested for {} sweep", kind);
                StopAck { success: true }
            }
            Err(e) => {
                warn!("Failed to request stop for {} sweep: {}", kind, e);
                StopAck { success: false }
            }
        }
    }

    pub fn status(&self, kind: JobKind) -> Result<BulkJobStatus, BulkError> {
        let keys = StateKeys::for_kind(kind);
        let state = BulkJobState::load(&self.store, &keys)?;

        let locked = match self.store.get(&keys.lock)? {
            Some(raw) => JobLease::parse(&raw, &keys.lock)?
                .is_live(Utc::now(), self.config.lock_timeout),
            None => false,
        };

        Ok(BulkJobStatus {
            kind,
            running: state.is_some(),
            total: state.as_ref().map_or(0, |s| s.total),
            remaining: state.as_ref().map_or(0, |s| s.remaining()),
            percentage: state.as_ref().map_or(0, |s| s.percentage()),
            locked,
            stop_requested: self.stop_requested(&keys)?,
        })
    }

    /// Forget everything persisted for `kind`, lease included.
    pub fn reset(&self, kind: JobKind) -> Result<(), BulkError> {
        self.clear(&StateKeys::for_kind(kind), true)?;
        info!("{} sweep state reset", kind);
        Ok(())
    }

    fn stop_requested(&self, keys: &StateKeys) -> Result<bool, BulkError> {
        Ok(self.store.get(&keys.stopped)?.is_some())
    }

    /// Delete queue, total and stop flag. The lease key is only removed when
    /// `include_lock` is set; otherwise the holder releases it by CAS.
    fn clear(&self, keys: &StateKeys, include_lock: bool) -> Result<(), BulkError> {
        for key in keys.all() {
            if key == keys.lock && !include_lock {
                continue;
            }
            self.store.delete(key)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bulk::store::MemoryStore;
    use crate::documents::Document;
    use anyhow::bail;
    use std::sync::Mutex;

    // ==================== Fixtures ====================

    struct FixedDocuments {
        ids: Vec<DocumentId>,
        fail: bool,
    }

    impl FixedDocuments {
        fn new(ids: &[u64]) -> Self {
            Self {
                ids: ids.iter().map(|id| DocumentId::from(*id)).collect(),
                fail: false,
            }
        }
    }

    impl DocumentStore for FixedDocuments {
        fn list_eligible_document_ids(&self, _kind: JobKind) -> anyhow::Result<Vec<DocumentId>> {
            if self.fail {
                bail!("listing unavailable");
            }
            Ok(self.ids.clone())
        }

        fn load(&self, id: &DocumentId) -> anyhow::Result<Document> {
            bail!("not used: {}", id)
        }
    }

    type Calls = Arc<Mutex<Vec<DocumentId>>>;

    fn recording_callback(
        calls: Calls,
    ) -> impl Fn(DocumentId) -> BoxFuture<'static, anyhow::Result<GenerationResult>> + Send + Sync
    {
        move |id: DocumentId| {
            calls.lock().unwrap().push(id);
            Box::pin(async { Ok(GenerationResult::Generated { text: None }) })
                as BoxFuture<'static, _>
        }
    }

    fn controller(
        ids: &[u64],
    ) -> (
        BulkJobController<Arc<MemoryStore>, FixedDocuments>,
        Arc<MemoryStore>,
        Calls,
    ) {
        let store = Arc::new(MemoryStore::new());
        let calls: Calls = Arc::new(Mutex::new(Vec::new()));
        let controller = BulkJobController::new(
            store.clone(),
            FixedDocuments::new(ids),
            ControllerConfig::default(),
        )
        .with_callback(JobKind::Keywords, recording_callback(calls.clone()));
        (controller, store, calls)
    }

    fn keys() -> StateKeys {
        StateKeys::for_kind(JobKind::Keywords)
    }

    // ==================== Step Tests ====================

    #[tokio::test]
    async fn test_three_document_job() {
        let (controller, store, calls) = controller(&[101, 102, 103]);

        let first = controller.step(JobKind::Keywords).await;
        assert_eq!(first.status, StepStatus::Progress);
        assert_eq!(first.percentage, 0);
        assert!(first.message.contains("101"));
        assert_eq!(first.message, "Processing document 101... (0 of 3)");

        let second = controller.step(JobKind::Keywords).await;
        assert_eq!(second.percentage, 33);
        assert!(second.message.contains("102"));

        let third = controller.step(JobKind::Keywords).await;
        assert_eq!(third.status, StepStatus::Complete);
        assert_eq!(third.percentage, 100);
        assert!(third.message.contains("complete"));

        let called: Vec<String> = calls.lock().unwrap().iter().map(|id| id.to_string()).collect();
        assert_eq!(called, vec!["101", "102", "103"]);

        for key in keys().all() {
            assert_eq!(store.get(key).unwrap(), None, "{} should be cleared", key);
        }
    }

    #[tokio::test]
    async fn test_percentage_is_monotonic() {
        let ids: Vec<u64> = (1..=7).collect();
        let (controller, _store, _calls) = controller(&ids);

        let mut last = -1;
        for _ in 0..ids.len() {
            let report = controller.step(JobKind::Keywords).await;
            assert!(report.percentage >= last);
            last = report.percentage;
        }
        assert_eq!(last, 100);
    }

    #[tokio::test]
    async fn test_empty_job_completes_immediately() {
        let (controller, store, calls) = controller(&[]);
        let report = controller.step(JobKind::Keywords).await;
        assert_eq!(report.status, StepStatus::Complete);
        assert_eq!(report.percentage, 100);
        assert_eq!(report.message, "Processing complete");
        assert!(calls.lock().unwrap().is_empty());
        assert_eq!(store.get(&keys().queue).unwrap(), None);
    }

    #[tokio::test]
    async fn test_persisted_empty_queue_completes_without_snapshot() {
        let (controller, store, calls) = controller(&[1, 2]);
        store.set(&keys().queue, "[]").unwrap();
        store.set(&keys().total, "2").unwrap();

        let report = controller.step(JobKind::Keywords).await;
        assert_eq!(report.status, StepStatus::Complete);
        assert_eq!(report.percentage, 100);
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_is_not_recomputed_mid_run() {
        let store = Arc::new(MemoryStore::new());
        let calls: Calls = Arc::new(Mutex::new(Vec::new()));
        let first = BulkJobController::new(
            store.clone(),
            FixedDocuments::new(&[1, 2]),
            ControllerConfig::default(),
        )
        .with_callback(JobKind::Keywords, recording_callback(calls.clone()));
        first.step(JobKind::Keywords).await;

        // a new document appears; the running job does not see it
        let second = BulkJobController::new(
            store.clone(),
            FixedDocuments::new(&[1, 2, 3]),
            ControllerConfig::default(),
        )
        .with_callback(JobKind::Keywords, recording_callback(calls.clone()));
        let report = second.step(JobKind::Keywords).await;
        assert_eq!(report.status, StepStatus::Complete);
        assert_eq!(calls.lock().unwrap().len(), 2);
    }

    // ==================== Lease Tests ====================

    #[tokio::test]
    async fn test_live_lease_reports_busy() {
        let (controller, store, calls) = controller(&[1, 2, 3]);
        controller.step(JobKind::Keywords).await;
        let queue_before = store.get(&keys().queue).unwrap();

        store.set(&keys().lock, &JobLease::new().to_json().unwrap()).unwrap();
        let report = controller.step(JobKind::Keywords).await;

        assert_eq!(report.status, StepStatus::Busy);
        assert_eq!(report.percentage, 0);
        assert_eq!(report.message, "Another process is already running");
        assert_eq!(store.get(&keys().queue).unwrap(), queue_before);
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_stale_lease_is_taken_over() {
        let (controller, store, calls) = controller(&[1, 2]);
        let stale = JobLease {
            holder: "crashed".to_string(),
            acquired_at: Utc::now() - chrono::Duration::seconds(300),
        };
        store.set(&keys().lock, &stale.to_json().unwrap()).unwrap();

        let report = controller.step(JobKind::Keywords).await;
        assert_eq!(report.status, StepStatus::Progress);
        assert_eq!(calls.lock().unwrap().len(), 1);
        assert_eq!(store.get(&keys().lock).unwrap(), None);
    }

    #[tokio::test]
    async fn test_lease_released_after_each_step() {
        let (controller, store, _calls) = controller(&[1, 2, 3]);
        controller.step(JobKind::Keywords).await;
        assert_eq!(store.get(&keys().lock).unwrap(), None);
    }

    #[tokio::test]
    async fn test_malformed_lease_reports_failure() {
        let (controller, store, calls) = controller(&[1]);
        store.set(&keys().lock, "1700000000").unwrap();

        let report = controller.step(JobKind::Keywords).await;
        assert_eq!(report.status, StepStatus::Failed);
        assert!(calls.lock().unwrap().is_empty());
    }

    // ==================== Stop Tests ====================

    #[tokio::test]
    async fn test_stop_reports_once_then_restarts() {
        let (controller, store, _calls) = controller(&[1, 2, 3]);
        controller.step(JobKind::Keywords).await;

        assert!(controller.request_stop(JobKind::Keywords).success);
        let stopped = controller.step(JobKind::Keywords).await;
        assert_eq!(stopped.status, StepStatus::Stopped);
        assert_eq!(stopped.percentage, -1);
        assert_eq!(stopped.message, "Process was stopped");
        for key in keys().all() {
            assert_eq!(store.get(key).unwrap(), None);
        }

        let restarted = controller.step(JobKind::Keywords).await;
        assert_eq!(restarted.status, StepStatus::Progress);
        assert_eq!(restarted.percentage, 0);
        assert!(restarted.message.contains("(0 of 3)"));
    }

    #[tokio::test]
    async fn test_request_stop_is_idempotent() {
        let (controller, _store, _calls) = controller(&[1]);
        assert!(controller.request_stop(JobKind::Keywords).success);
        assert!(controller.request_stop(JobKind::Keywords).success);

        assert_eq!(controller.step(JobKind::Keywords).await.percentage, -1);
        assert_ne!(controller.step(JobKind::Keywords).await.percentage, -1);
    }

    #[tokio::test]
    async fn test_stop_wins_over_live_lease() {
        let (controller, store, _calls) = controller(&[1, 2]);
        store.set(&keys().lock, &JobLease::new().to_json().unwrap()).unwrap();
        controller.request_stop(JobKind::Keywords);

        let report = controller.step(JobKind::Keywords).await;
        assert_eq!(report.status, StepStatus::Stopped);
        assert_eq!(store.get(&keys().lock).unwrap(), None);
    }

    #[tokio::test]
    async fn test_job_kinds_are_independent() {
        let (controller, store, _calls) = controller(&[1, 2]);
        controller.step(JobKind::Keywords).await;
        controller.request_stop(JobKind::AltText);

        let report = controller.step(JobKind::Keywords).await;
        assert_eq!(report.status, StepStatus::Complete);
        assert_eq!(
            store
                .get(&StateKeys::for_kind(JobKind::AltText).stopped)
                .unwrap()
                .as_deref(),
            Some("1")
        );
    }

    // ==================== Failure Tests ====================

    #[tokio::test]
    async fn test_callback_error_releases_lease_and_keeps_queue() {
        let store = Arc::new(MemoryStore::new());
        let controller = BulkJobController::new(
            store.clone(),
            FixedDocuments::new(&[1, 2, 3]),
            ControllerConfig::default(),
        )
        .with_callback(JobKind::Keywords, |id: DocumentId| async move {
            if id.as_str() == "1" {
                bail!("provider exploded");
            }
            Ok::<_, anyhow::Error>(GenerationResult::Generated { text: None })
        });

        let failed = controller.step(JobKind::Keywords).await;
        assert_eq!(failed.status, StepStatus::Failed);
        assert_eq!(failed.percentage, 0);
        assert_eq!(
            failed.message,
            "Error processing document 1: provider exploded"
        );
        assert_eq!(failed.document, Some(DocumentId::from(1u64)));
        assert_eq!(store.get(&keys().lock).unwrap(), None);
        // already popped, not retried
        assert_eq!(store.get(&keys().queue).unwrap().as_deref(), Some(r#"["2","3"]"#));

        let next = controller.step(JobKind::Keywords).await;
        assert_eq!(next.status, StepStatus::Progress);
        assert!(next.message.contains("document 2"));
    }

    #[tokio::test]
    async fn test_failed_generation_result_continues_job() {
        let store = Arc::new(MemoryStore::new());
        let controller = BulkJobController::new(
            store.clone(),
            FixedDocuments::new(&[1, 2]),
            ControllerConfig::default(),
        )
        .with_callback(JobKind::Keywords, |_id: DocumentId| async move {
            Ok::<_, anyhow::Error>(GenerationResult::Failed {
                reason: "rate limited".to_string(),
            })
        });

        let report = controller.step(JobKind::Keywords).await;
        assert_eq!(report.status, StepStatus::Progress);
        assert!(report.message.ends_with("[failed: rate limited]"));
        assert_eq!(controller.step(JobKind::Keywords).await.status, StepStatus::Complete);
    }

    #[tokio::test]
    async fn test_callback_timeout() {
        let store = Arc::new(MemoryStore::new());
        let controller = BulkJobController::new(
            store.clone(),
            FixedDocuments::new(&[1, 2]),
            ControllerConfig {
                lock_timeout: Duration::from_secs(120),
                step_timeout: Duration::from_millis(50),
            },
        )
        .with_callback(JobKind::Keywords, |_id: DocumentId| async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, anyhow::Error>(GenerationResult::Generated { text: None })
        });

        let report = controller.step(JobKind::Keywords).await;
        assert_eq!(report.status, StepStatus::Failed);
        assert!(report.message.contains("timed out"));
        assert_eq!(store.get(&keys().lock).unwrap(), None);
    }

    #[tokio::test]
    async fn test_listing_failure_writes_no_state() {
        let store = Arc::new(MemoryStore::new());
        let controller = BulkJobController::new(
            store.clone(),
            FixedDocuments {
                ids: Vec::new(),
                fail: true,
            },
            ControllerConfig::default(),
        )
        .with_callback(JobKind::Keywords, recording_callback(Arc::default()));

        let report = controller.step(JobKind::Keywords).await;
        assert_eq!(report.status, StepStatus::Failed);
        assert!(report.message.contains("listing unavailable"));
        for key in keys().all() {
            assert_eq!(store.get(key).unwrap(), None);
        }
    }

    #[tokio::test]
    async fn test_malformed_queue_is_left_for_inspection() {
        let (controller, store, calls) = controller(&[1]);
        store.set(&keys().queue, "{broken").unwrap();

        let report = controller.step(JobKind::Keywords).await;
        assert_eq!(report.status, StepStatus::Failed);
        assert!(report.message.contains("malformed queue"));
        assert_eq!(store.get(&keys().queue).unwrap().as_deref(), Some("{broken"));
        assert_eq!(store.get(&keys().lock).unwrap(), None);
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_callback_is_configuration_failure() {
        let store = Arc::new(MemoryStore::new());
        let controller: BulkJobController<_, _> = BulkJobController::new(
            store.clone(),
            FixedDocuments::new(&[1]),
            ControllerConfig::default(),
        );

        let report = controller.step(JobKind::AltText).await;
        assert_eq!(report.status, StepStatus::Failed);
        assert!(report.message.contains("no generation callback"));
        assert_eq!(store.get(&StateKeys::for_kind(JobKind::AltText).lock).unwrap(), None);
    }

    // ==================== Status Tests ====================

    #[tokio::test]
    async fn test_status_and_reset() {
        let (controller, store, _calls) = controller(&[1, 2, 3, 4]);

        let idle = controller.status(JobKind::Keywords).unwrap();
        assert!(!idle.running);
        assert_eq!(idle.total, 0);

        controller.step(JobKind::Keywords).await;
        let status = controller.status(JobKind::Keywords).unwrap();
        assert!(status.running);
        assert_eq!(status.total, 4);
        assert_eq!(status.remaining, 3);
        assert_eq!(status.percentage, 25);
        assert!(!status.locked);
        assert!(!status.stop_requested);

        controller.request_stop(JobKind::Keywords);
        assert!(controller.status(JobKind::Keywords).unwrap().stop_requested);

        controller.reset(JobKind::Keywords).unwrap();
        for key in keys().all() {
            assert_eq!(store.get(key).unwrap(), None);
        }
    }

    #[test]
    fn test_step_report_serialization() {
        let report = StepReport::stopped();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "stopped");
        assert_eq!(json["percentage"], -1);
        assert!(json.get("document").is_none());
        assert!(report.is_terminal());
        assert!(!StepReport::busy().is_terminal());
    }

    #[tokio::test]
    async fn test_overlapping_steps_process_one_document() {
        let store = Arc::new(MemoryStore::new());
        let calls: Calls = Arc::new(Mutex::new(Vec::new()));
        let recorded = calls.clone();
        let controller = Arc::new(
            BulkJobController::new(
                store.clone(),
                FixedDocuments::new(&[1, 2, 3]),
                ControllerConfig::default(),
            )
            .with_callback(JobKind::Keywords, move |id: DocumentId| {
                recorded.lock().unwrap().push(id);
                async move {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Ok::<_, anyhow::Error>(GenerationResult::Generated { text: None })
                }
            }),
        );

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let controller = controller.clone();
                tokio::spawn(async move { controller.step(JobKind::Keywords).await })
            })
            .collect();

        let mut statuses = Vec::new();
        for handle in handles {
            statuses.push(handle.await.unwrap().status);
        }

        let progressed = statuses.iter().filter(|s| **s == StepStatus::Progress).count();
        let busy = statuses.iter().filter(|s| **s == StepStatus::Busy).count();
        assert_eq!(progressed, 1);
        assert_eq!(busy, 7);
        assert_eq!(calls.lock().unwrap().len(), 1);
        assert_eq!(store.get(&keys().queue).unwrap().as_deref(), Some(r#"["2","3"]"#));
    }
}
