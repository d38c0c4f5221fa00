//! Execution slot packing
//!
//! Greedy packing of eligible transactions into bounded slots. Input is
//! pre-sorted (priority descending, then age ascending), so a candidate
//! is placed into the first slot that accepts it; candidates that fit
//! nowhere wait for the next round.

use super::transaction::Priority;
use uuid::Uuid;

/// Packing limits for one round
#[derive(Debug, Clone, Copy)]
pub(crate) struct SlotLimits {
    pub slot_size: usize,
    pub gas_ceiling: u64,
    pub per_entity_cap: usize,
    pub max_slots: usize,
}

/// Minimal view of a queued transaction used for packing
#[derive(Debug, Clone)]
pub(crate) struct SlotCandidate {
    pub id: Uuid,
    pub entity_id: String,
    pub priority: Priority,
    pub gas_limit: u64,
}

/// Ephemeral grouping of at most `slot_size` transactions for one round
#[derive(Debug, Clone)]
pub(crate) struct SlotPlan {
    pub members: Vec<Uuid>,
    pub estimated_gas: u64,
    /// Dominant priority of the members
    pub priority: Priority,
    entity_counts: Vec<(String, usize)>,
}

impl SlotPlan {
    fn new() -> Self {
        Self {
            members: Vec::new(),
            estimated_gas: 0,
            priority: Priority::Low,
            entity_counts: Vec::new(),
        }
    }

    fn accepts(&self, candidate: &SlotCandidate, limits: &SlotLimits) -> bool {
        if self.members.len() >= limits.slot_size {
            return false;
        }
        match self.estimated_gas.checked_add(candidate.gas_limit) {
            Some(total) if total <= limits.gas_ceiling => {}
            _ => return false,
        }
        let same_entity = self
            .entity_counts
            .iter()
            .find(|(entity, _)| *entity == candidate.entity_id)
            .map(|(_, count)| *count)
            .unwrap_or(0);
        same_entity < limits.per_entity_cap
    }

    fn push(&mut self, candidate: &SlotCandidate) {
        self.members.push(candidate.id);
        self.estimated_gas += candidate.gas_limit;
        self.priority = self.priority.max(candidate.priority);
        match self
            .entity_counts
            .iter_mut()
            .find(|(entity, _)| *entity == candidate.entity_id)
        {
            Some((_, count)) => *count += 1,
            None => self.entity_counts.push((candidate.entity_id.clone(), 1)),
        }
    }
}

/// Pack pre-sorted candidates into up to `max_slots` slots
pub(crate) fn pack_slots(candidates: &[SlotCandidate], limits: &SlotLimits) -> Vec<SlotPlan> {
    let mut slots: Vec<SlotPlan> = Vec::new();

    for candidate in candidates {
        let placed = slots
            .iter_mut()
            .find(|slot| slot.accepts(candidate, limits))
            .map(|slot| slot.push(candidate))
            .is_some();

        if !placed && candidate.gas_limit <= limits.gas_ceiling && slots.len() < limits.max_slots {
            let mut slot = SlotPlan::new();
            slot.push(candidate);
            slots.push(slot);
        }
        // Unplaced candidates stay queued for the next round
    }

    slots
}
