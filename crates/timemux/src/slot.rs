//! Preallocated per-client timer slots.
//!
//! Every `(client, slot)` pair owns one [`TimerSlot`] in a flat arena that is sized once at
//! startup and never reallocated. The timeout queue links slots through the `link` field by
//! arena index, so no slot is ever referenced by pointer.

use crate::client::ClientId;
use crate::error::TimerError;

/// One completion bit per slot in a `u32` mask.
pub const MAX_TIMERS_PER_CLIENT: usize = u32::BITS as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimerKind {
    #[default]
    Off,
    Periodic,
    AbsoluteOneshot,
    RelativeOneshot,
}

impl TimerKind {
    #[inline]
    pub fn is_active(self) -> bool {
        self != TimerKind::Off
    }
}

/// Flat arena index: `client * timers_per_client + slot`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct SlotIndex(u32);

impl SlotIndex {
    #[inline]
    fn as_usize(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Link {
    pub(crate) prev: Option<SlotIndex>,
    pub(crate) next: Option<SlotIndex>,
    pub(crate) queued: bool,
}

#[derive(Debug, Clone, Default)]
pub struct TimerSlot {
    pub(crate) kind: TimerKind,
    pub(crate) deadline_ns: u64,
    pub(crate) period_ns: u64,
    pub(crate) link: Link,
}

impl TimerSlot {
    pub fn kind(&self) -> TimerKind {
        self.kind
    }

    /// Absolute deadline; only meaningful while the slot is active.
    pub fn deadline_ns(&self) -> Option<u64> {
        self.kind.is_active().then_some(self.deadline_ns)
    }

    /// Recurrence interval; only meaningful for periodic slots.
    pub fn period_ns(&self) -> Option<u64> {
        (self.kind == TimerKind::Periodic).then_some(self.period_ns)
    }

    pub fn is_queued(&self) -> bool {
        self.link.queued
    }
}

/// Fixed dimensions of the slot arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capacity {
    pub client_count: usize,
    pub timers_per_client: usize,
}

impl Capacity {
    pub fn check_client(&self, client: ClientId) -> Result<(), TimerError> {
        if (client.index() as usize) < self.client_count {
            Ok(())
        } else {
            Err(TimerError::InvalidClient {
                client,
                client_count: self.client_count,
            })
        }
    }

    pub fn check_slot(&self, client: ClientId, slot: u32) -> Result<(), TimerError> {
        self.check_client(client)?;
        if (slot as usize) < self.timers_per_client {
            Ok(())
        } else {
            Err(TimerError::InvalidSlot {
                slot,
                timers_per_client: self.timers_per_client,
            })
        }
    }

    /// `None` if the product overflows `usize`.
    pub fn total_slots(&self) -> Option<usize> {
        self.client_count.checked_mul(self.timers_per_client)
    }
}

#[derive(Debug)]
pub struct SlotTable {
    capacity: Capacity,
    slots: Vec<TimerSlot>,
    completed: Vec<u32>,
}

impl SlotTable {
    /// # Panics
    ///
    /// Panics if `timers_per_client` is zero or wider than a completion mask, or if the arena
    /// would hold more than `u32::MAX` slots.
    pub fn new(capacity: Capacity) -> Self {
        assert!(
            (1..=MAX_TIMERS_PER_CLIENT).contains(&capacity.timers_per_client),
            "timers_per_client must be in 1..={MAX_TIMERS_PER_CLIENT}"
        );
        let total = match capacity.total_slots() {
            Some(total) if u32::try_from(total).is_ok() => total,
            _ => panic!(
                "slot arena of {} x {} entries exceeds u32 indexing",
                capacity.client_count, capacity.timers_per_client
            ),
        };
        Self {
            capacity,
            slots: vec![TimerSlot::default(); total],
            completed: vec![0; capacity.client_count],
        }
    }

    pub fn capacity(&self) -> Capacity {
        self.capacity
    }

    pub(crate) fn index(&self, client: ClientId, slot: u32) -> Result<SlotIndex, TimerError> {
        self.capacity.check_slot(client, slot)?;
        let flat = client.index() as usize * self.capacity.timers_per_client + slot as usize;
        Ok(SlotIndex(flat as u32))
    }

    pub(crate) fn owner(&self, idx: SlotIndex) -> (ClientId, u32) {
        let tpc = self.capacity.timers_per_client;
        let flat = idx.as_usize();
        (ClientId::new((flat / tpc) as u32), (flat % tpc) as u32)
    }

    #[inline]
    pub(crate) fn get(&self, idx: SlotIndex) -> &TimerSlot {
        &self.slots[idx.as_usize()]
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, idx: SlotIndex) -> &mut TimerSlot {
        &mut self.slots[idx.as_usize()]
    }

    pub fn slot(&self, client: ClientId, slot: u32) -> Result<&TimerSlot, TimerError> {
        let idx = self.index(client, slot)?;
        Ok(self.get(idx))
    }

    pub(crate) fn mark_completed(&mut self, idx: SlotIndex) {
        let (client, slot) = self.owner(idx);
        self.completed[client.index() as usize] |= 1u32 << slot;
    }

    /// Returns the client's completion bits without clearing them.
    pub fn completed(&self, client: ClientId) -> Result<u32, TimerError> {
        self.capacity.check_client(client)?;
        Ok(self.completed[client.index() as usize])
    }

    pub(crate) fn take_completed(&mut self, client: ClientId) -> Result<u32, TimerError> {
        self.capacity.check_client(client)?;
        Ok(std::mem::take(&mut self.completed[client.index() as usize]))
    }
}
