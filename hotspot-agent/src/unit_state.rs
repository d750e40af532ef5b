//! Per-execution-unit scratch state
//!
//! Each CPU owns exactly one slot recording which entity it switched in last
//! and when. Only the owning unit writes its slot, so the slot needs no lock;
//! relaxed atomics keep the type `Sync` without unsafe code.

use hotspot_common::UnitState;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Padded to a cache line so neighbouring units never share one.
#[repr(align(64))]
#[derive(Debug, Default)]
struct Slot {
    entity_id: AtomicU32,
    timestamp_ns: AtomicU64,
}

/// Fixed table of one [`UnitState`] per execution unit.
#[derive(Debug)]
pub struct PerUnitState {
    slots: Box<[Slot]>,
}

impl PerUnitState {
    /// Reserve one zeroed slot per unit.
    pub fn new(units: usize) -> Self {
        let slots = (0..units).map(|_| Slot::default()).collect();
        Self { slots }
    }

    pub fn units(&self) -> usize {
        self.slots.len()
    }

    /// Swap in the new entity and timestamp for `unit`, returning what the
    /// slot held before.
    ///
    /// Returns `None` only when `unit` is outside the configured unit count.
    pub fn read_and_update(
        &self,
        unit: u32,
        entity_id: u32,
        timestamp_ns: u64,
    ) -> Option<UnitState> {
        let slot = self.slots.get(unit as usize)?;

        let prev = UnitState::new(
            slot.entity_id.load(Ordering::Relaxed),
            slot.timestamp_ns.load(Ordering::Relaxed),
        );
        slot.entity_id.store(entity_id, Ordering::Relaxed);
        slot.timestamp_ns.store(timestamp_ns, Ordering::Relaxed);

        Some(prev)
    }

    /// Current contents of a slot without modifying it.
    pub fn peek(&self, unit: u32) -> Option<UnitState> {
        self.slots.get(unit as usize).map(|slot| {
            UnitState::new(
                slot.entity_id.load(Ordering::Relaxed),
                slot.timestamp_ns.load(Ordering::Relaxed),
            )
        })
    }
}
