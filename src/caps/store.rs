//! Capability Store.
//!
//! Arena of capability records plus an id index. The delegation forest is
//! expressed purely through `authorized_by` id lookups into the arena.
//! Writes replace whole records under the write lock, so readers never
//! observe a torn capability.

use super::model::{Capability, CapabilityId, CapabilityStatus};
use crate::error::StoreError;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

#[derive(Default)]
struct Arena {
    /// Records in insertion order.
    records: Vec<Capability>,
    /// Capability id -> slot in `records`.
    index: HashMap<CapabilityId, usize>,
}

/// Durable mapping from capability id to capability record.
#[derive(Default)]
pub struct CapabilityStore {
    arena: RwLock<Arena>,
}

/// Capability counts per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub delegated: usize,
    pub granted: usize,
    pub revoked: usize,
    pub superseded: usize,
}

impl CapabilityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new capability. Ids are never reused.
    pub fn put(&self, capability: Capability) -> Result<(), StoreError> {
        let mut arena = self.arena.write();
        if arena.index.contains_key(&capability.id) {
            return Err(StoreError::DuplicateId(capability.id));
        }
        let slot = arena.records.len();
        arena.index.insert(capability.id.clone(), slot);
        arena.records.push(capability);
        Ok(())
    }

    pub fn get(&self, id: &CapabilityId) -> Result<Capability, StoreError> {
        let arena = self.arena.read();
        arena
            .index
            .get(id)
            .map(|&slot| arena.records[slot].clone())
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    pub fn contains(&self, id: &CapabilityId) -> bool {
        self.arena.read().index.contains_key(id)
    }

    /// Snapshot of every capability, insertion order.
    pub fn list_all(&self) -> Vec<Capability> {
        self.arena.read().records.clone()
    }

    /// Snapshot of capabilities in `status`, insertion order.
    pub fn list_by_status(&self, status: CapabilityStatus) -> Vec<Capability> {
        self.arena
            .read()
            .records
            .iter()
            .filter(|c| c.status == status)
            .cloned()
            .collect()
    }

    /// First capability (insertion order) matching `predicate`.
    pub fn find<F>(&self, predicate: F) -> Option<Capability>
    where
        F: Fn(&Capability) -> bool,
    {
        self.arena
            .read()
            .records
            .iter()
            .find(|c| predicate(c))
            .cloned()
    }

    /// Atomically move a capability to `next`, returning the updated record.
    pub fn set_status(
        &self,
        id: &CapabilityId,
        next: CapabilityStatus,
    ) -> Result<Capability, StoreError> {
        let mut arena = self.arena.write();
        let slot = *arena
            .index
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        let record = &mut arena.records[slot];
        if !record.status.can_transition_to(next) {
            return Err(StoreError::InvalidTransition {
                id: id.clone(),
                from: record.status,
                to: next,
            });
        }
        record.status = next;
        Ok(record.clone())
    }

    /// Move a Delegated capability to Granted, provided its parent is still
    /// Granted.
    ///
    /// The parent check and the write happen under one write lock, so a
    /// concurrent revocation of the parent either lands first and fails this
    /// call, or lands after the child is already Granted.
    pub fn promote(&self, id: &CapabilityId) -> Result<Capability, StoreError> {
        let mut arena = self.arena.write();
        let slot = *arena
            .index
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        let record = &arena.records[slot];
        if !record.status.can_transition_to(CapabilityStatus::Granted) {
            return Err(StoreError::InvalidTransition {
                id: id.clone(),
                from: record.status,
                to: CapabilityStatus::Granted,
            });
        }
        if let Some(parent) = &record.authorized_by {
            let parent_status = arena.index.get(parent).map(|&p| arena.records[p].status);
            if parent_status != Some(CapabilityStatus::Granted) {
                return Err(StoreError::ParentNotGranted {
                    id: id.clone(),
                    parent: parent.clone(),
                });
            }
        }
        let record = &mut arena.records[slot];
        record.status = CapabilityStatus::Granted;
        Ok(record.clone())
    }

    /// Mark every still-Delegated capability in `ids` Superseded.
    ///
    /// Returns the ids that were changed; others are left as they are.
    pub fn supersede(&self, ids: &[CapabilityId]) -> Vec<CapabilityId> {
        let mut arena = self.arena.write();
        let mut changed = Vec::with_capacity(ids.len());
        for id in ids {
            let Some(&slot) = arena.index.get(id) else {
                continue;
            };
            let record = &mut arena.records[slot];
            if record.status == CapabilityStatus::Delegated {
                record.status = CapabilityStatus::Superseded;
                changed.push(id.clone());
            }
        }
        changed
    }

    /// Lazily walk from `id` up through `authorized_by` links to a root.
    pub fn chain_of(&self, id: &CapabilityId) -> Chain<'_> {
        Chain {
            store: self,
            next: Some(id.clone()),
            visited: HashSet::new(),
        }
    }

    pub fn counts(&self) -> StatusCounts {
        let arena = self.arena.read();
        let mut counts = StatusCounts::default();
        for record in &arena.records {
            match record.status {
                CapabilityStatus::Delegated => counts.delegated += 1,
                CapabilityStatus::Granted => counts.granted += 1,
                CapabilityStatus::Revoked => counts.revoked += 1,
                CapabilityStatus::Superseded => counts.superseded += 1,
            }
        }
        counts
    }

    pub fn len(&self) -> usize {
        self.arena.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Iterator over a delegation chain, child first.
///
/// Each step takes the read lock only for the single lookup. A revisited id
/// yields [`StoreError::CycleDetected`] and ends the walk.
pub struct Chain<'a> {
    store: &'a CapabilityStore,
    next: Option<CapabilityId>,
    visited: HashSet<CapabilityId>,
}

impl Iterator for Chain<'_> {
    type Item = Result<Capability, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next.take()?;
        if !self.visited.insert(id.clone()) {
            return Some(Err(StoreError::CycleDetected(id)));
        }
        match self.store.get(&id) {
            Ok(capability) => {
                self.next = capability.authorized_by.clone();
                Some(Ok(capability))
            }
            Err(e) => Some(Err(e)),
        }
    }
}
