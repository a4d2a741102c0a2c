//! Per-request lock table.
//!
//! Operations on one request serialize on that request's mutex; different
//! requests never contend. Acquisition is bounded: a caller that cannot
//! take the lock within `max_attempts * timeout` gets `Contention`.

use super::model::RequestId;
use crate::error::AuthorizationError;
use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub struct RequestLocks {
    locks: DashMap<RequestId, Arc<Mutex<()>>>,
    timeout: Duration,
    max_attempts: u32,
}

impl RequestLocks {
    pub fn new(timeout: Duration, max_attempts: u32) -> Self {
        Self {
            locks: DashMap::new(),
            timeout,
            max_attempts: max_attempts.max(1),
        }
    }

    /// The mutex guarding `id`, created on first use.
    ///
    /// The DashMap shard guard is dropped before returning.
    pub fn lock_for(&self, id: &RequestId) -> Arc<Mutex<()>> {
        self.locks.entry(id.clone()).or_default().value().clone()
    }

    /// Drop the table entry for a request that will never be mutated again.
    ///
    /// Callers still holding the old mutex keep it alive through their `Arc`.
    pub fn release(&self, id: &RequestId) {
        self.locks.remove(id);
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    /// Take `lock`, retrying up to the configured bound.
    pub fn acquire<'a>(
        &self,
        id: &RequestId,
        lock: &'a Mutex<()>,
    ) -> Result<MutexGuard<'a, ()>, AuthorizationError> {
        for attempt in 1..=self.max_attempts {
            if let Some(guard) = lock.try_lock_for(self.timeout) {
                return Ok(guard);
            }
            debug!(request_id = %id, attempt, "Request lock busy");
        }
        Err(AuthorizationError::Contention(id.clone()))
    }
}
