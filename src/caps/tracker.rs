//! Request Tracker.
//!
//! Owns capability requests and the candidates offered against each one.
//! A request moves `Pending -> Resolved` exactly once; resolving it keeps
//! the chosen candidate and discards the rest.

use super::model::{
    Capability, CapabilityId, CapabilityRequest, PendingRequest, PrincipalId, RequestId,
    RequestStatus, RequesterAttributes,
};
use crate::error::TrackerError;
use parking_lot::RwLock;
use std::collections::HashMap;

struct Entry {
    request: CapabilityRequest,
    /// Candidates in attach order. Emptied on resolve.
    candidates: Vec<Capability>,
}

#[derive(Default)]
struct Ledger {
    entries: Vec<Entry>,
    index: HashMap<RequestId, usize>,
}

impl Ledger {
    fn entry(&self, id: &RequestId) -> Result<&Entry, TrackerError> {
        self.index
            .get(id)
            .map(|&slot| &self.entries[slot])
            .ok_or_else(|| TrackerError::NotFound(id.clone()))
    }

    fn pending_entry_mut(&mut self, id: &RequestId) -> Result<&mut Entry, TrackerError> {
        let slot = *self
            .index
            .get(id)
            .ok_or_else(|| TrackerError::NotFound(id.clone()))?;
        let entry = &mut self.entries[slot];
        if !entry.request.is_pending() {
            return Err(TrackerError::AlreadyResolved(id.clone()));
        }
        Ok(entry)
    }
}

/// Fields of a new capability request.
#[derive(Debug, Clone)]
pub struct NewRequest {
    pub requester: PrincipalId,
    pub requestee: PrincipalId,
    pub capability: String,
    pub value: String,
    pub attributes: RequesterAttributes,
}

/// Outcome of resolving a request.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub request: CapabilityRequest,
    /// Candidates that were not chosen.
    pub discarded: Vec<Capability>,
}

/// Manages the lifecycle of capability requests.
#[derive(Default)]
pub struct RequestTracker {
    ledger: RwLock<Ledger>,
}

impl RequestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new Pending request.
    pub fn submit(&self, new: NewRequest) -> RequestId {
        let id = RequestId::generate();
        let request = CapabilityRequest {
            id: id.clone(),
            requester: new.requester,
            requestee: new.requestee,
            capability: new.capability,
            value: new.value,
            status: RequestStatus::Pending,
            attributes: new.attributes,
            granted: None,
        };
        let mut ledger = self.ledger.write();
        let slot = ledger.entries.len();
        ledger.index.insert(id.clone(), slot);
        ledger.entries.push(Entry {
            request,
            candidates: Vec::new(),
        });
        id
    }

    /// Record `capability` as a candidate for a pending request.
    ///
    /// Attaching the same capability id twice is a no-op.
    pub fn attach_candidate(
        &self,
        id: &RequestId,
        capability: Capability,
    ) -> Result<(), TrackerError> {
        let mut ledger = self.ledger.write();
        let entry = ledger.pending_entry_mut(id)?;
        if entry.candidates.iter().all(|c| c.id != capability.id) {
            entry.candidates.push(capability);
        }
        Ok(())
    }

    /// Pending requests with their candidates, both in insertion order.
    pub fn list_pending(&self) -> Vec<PendingRequest> {
        self.ledger
            .read()
            .entries
            .iter()
            .filter(|e| e.request.is_pending())
            .map(|e| PendingRequest {
                request: e.request.clone(),
                candidates: e.candidates.clone(),
            })
            .collect()
    }

    /// Every request regardless of status, insertion order.
    pub fn list_all(&self) -> Vec<CapabilityRequest> {
        self.ledger
            .read()
            .entries
            .iter()
            .map(|e| e.request.clone())
            .collect()
    }

    pub fn get(&self, id: &RequestId) -> Result<CapabilityRequest, TrackerError> {
        self.ledger.read().entry(id).map(|e| e.request.clone())
    }

    /// The request and its current candidates.
    pub fn view(&self, id: &RequestId) -> Result<PendingRequest, TrackerError> {
        self.ledger.read().entry(id).map(|e| PendingRequest {
            request: e.request.clone(),
            candidates: e.candidates.clone(),
        })
    }

    /// Look up a candidate of a still-pending request.
    pub fn candidate(
        &self,
        id: &RequestId,
        capability: &CapabilityId,
    ) -> Result<Capability, TrackerError> {
        let ledger = self.ledger.read();
        let entry = ledger.entry(id)?;
        if !entry.request.is_pending() {
            return Err(TrackerError::AlreadyResolved(id.clone()));
        }
        entry
            .candidates
            .iter()
            .find(|c| &c.id == capability)
            .cloned()
            .ok_or_else(|| TrackerError::UnknownCandidate {
                request: id.clone(),
                capability: capability.clone(),
            })
    }

    /// Mark a request Resolved with `chosen`, discarding other candidates.
    pub fn resolve(
        &self,
        id: &RequestId,
        chosen: &CapabilityId,
    ) -> Result<Resolution, TrackerError> {
        let mut ledger = self.ledger.write();
        let entry = ledger.pending_entry_mut(id)?;
        if entry.candidates.iter().all(|c| &c.id != chosen) {
            return Err(TrackerError::UnknownCandidate {
                request: id.clone(),
                capability: chosen.clone(),
            });
        }
        let discarded = std::mem::take(&mut entry.candidates)
            .into_iter()
            .filter(|c| &c.id != chosen)
            .collect();
        entry.request.status = RequestStatus::Resolved;
        entry.request.granted = Some(chosen.clone());
        Ok(Resolution {
            request: entry.request.clone(),
            discarded,
        })
    }

    pub fn pending_count(&self) -> usize {
        self.ledger
            .read()
            .entries
            .iter()
            .filter(|e| e.request.is_pending())
            .count()
    }
}
