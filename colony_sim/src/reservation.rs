// Explicit reservation table for harvestable targets.
//
// Maps a resource to the single agent currently walking to or working it,
// so two colonists never head for the same tree. Acquire succeeds when the
// target is free or already held by the caller; only the holder can
// release.
//
// See also: `sim.rs` which reserves on gather orders and releases on
// completion, failure or goal change.

use crate::types::{AgentId, ResourceId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ReservationTable {
    holders: BTreeMap<ResourceId, AgentId>,
}

impl ReservationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&mut self, target: ResourceId, agent: AgentId) -> bool {
        match self.holders.get(&target) {
            Some(&holder) => holder == agent,
            None => {
                self.holders.insert(target, agent);
                true
            }
        }
    }

    /// Returns whether `agent` held the reservation.
    pub fn release(&mut self, target: ResourceId, agent: AgentId) -> bool {
        if self.holders.get(&target) == Some(&agent) {
            self.holders.remove(&target);
            true
        } else {
            false
        }
    }

    pub fn holder_of(&self, target: ResourceId) -> Option<AgentId> {
        self.holders.get(&target).copied()
    }

    /// Drop every reservation `agent` holds; returns the freed targets.
    pub fn release_all_for(&mut self, agent: AgentId) -> Vec<ResourceId> {
        let freed: Vec<_> = self
            .holders
            .iter()
            .filter(|&(_, &holder)| holder == agent)
            .map(|(&target, _)| target)
            .collect();
        for target in &freed {
            self.holders.remove(target);
        }
        freed
    }

    /// Forget a target entirely (it no longer exists).
    pub fn forget(&mut self, target: ResourceId) {
        self.holders.remove(&target);
    }

    pub fn len(&self) -> usize {
        self.holders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.holders.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_agent_cannot_take_a_held_target() {
        let mut table = ReservationTable::new();
        assert!(table.acquire(ResourceId(1), AgentId(0)));
        assert!(table.acquire(ResourceId(1), AgentId(0)));
        assert!(!table.acquire(ResourceId(1), AgentId(7)));
        assert_eq!(table.holder_of(ResourceId(1)), Some(AgentId(0)));
    }

    #[test]
    fn only_holder_releases() {
        let mut table = ReservationTable::new();
        table.acquire(ResourceId(1), AgentId(0));
        assert!(!table.release(ResourceId(1), AgentId(2)));
        assert!(table.release(ResourceId(1), AgentId(0)));
        assert!(table.acquire(ResourceId(1), AgentId(2)));
    }

    #[test]
    fn release_all_for_agent() {
        let mut table = ReservationTable::new();
        table.acquire(ResourceId(1), AgentId(0));
        table.acquire(ResourceId(2), AgentId(1));
        table.acquire(ResourceId(3), AgentId(0));
        assert_eq!(
            table.release_all_for(AgentId(0)),
            vec![ResourceId(1), ResourceId(3)]
        );
        assert_eq!(table.len(), 1);
    }
}
