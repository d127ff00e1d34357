//! Expiring job lock taken with compare-and-swap.

use super::error::BulkError;
use super::state::JobLease;
use super::store::KeyValueStore;
use chrono::Utc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaseOutcome {
    /// This caller now holds the lease.
    Acquired(JobLease),
    /// Someone else holds a live lease (or won the race for it).
    Held,
}

/// Try to take the lease at `key`.
///
/// An expired lease is taken over. The swap is conditional on the exact raw
/// value observed, so two callers racing for the same stale lease cannot
/// both win.
pub fn acquire<S: KeyValueStore + ?Sized>(
    store: &S,
    key: &str,
    timeout: Duration,
) -> Result<LeaseOutcome, BulkError> {
    let observed = store.get(key)?;

    if let Some(raw) = observed.as_deref() {
        let current = JobLease::parse(raw, key)?;
        if current.is_live(Utc::now(), timeout) {
            debug!("Lease {} held by {}", key, current.holder);
            return Ok(LeaseOutcome::Held);
        }
        warn!(
            "Taking over expired lease {} (holder {}, acquired {})",
            key, current.holder, current.acquired_at
        );
    }

    let lease = JobLease::new();
    let value = lease.to_json()?;
    if store.compare_and_swap(key, observed.as_deref(), Some(&value))? {
        debug!("Lease {} acquired by {}", key, lease.holder);
        Ok(LeaseOutcome::Acquired(lease))
    } else {
        debug!("Lost race for lease {}", key);
        Ok(LeaseOutcome::Held)
    }
}

/// Release `lease` if it is still the stored one.
///
/// Returns `false` when another caller has taken the lease over in the
/// meantime; their lease is left alone.
pub fn release<S: KeyValueStore + ?Sized>(
    store: &S,
    key: &str,
    lease: &JobLease,
) -> Result<bool, BulkError> {
    let value = lease.to_json()?;
    let released = store.compare_and_swap(key, Some(&value), None)?;
    if !released {
        warn!("Lease {} was taken over before release by {}", key, lease.holder);
    }
    Ok(released)
}
