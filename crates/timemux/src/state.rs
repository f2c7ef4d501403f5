//! The multiplexer proper: slot table plus timeout queue.
//!
//! [`MultiplexerState`] is not synchronized and takes the current time as an argument, which
//! keeps every transition deterministic. [`TimeServer`](crate::TimeServer) wraps it in the
//! server lock and supplies `now` from the calibrated clock.

use crate::client::ClientId;
use crate::error::TimerError;
use crate::notify::Notifier;
use crate::queue::TimeoutQueue;
use crate::slot::{Capacity, SlotIndex, SlotTable, TimerKind, TimerSlot};

/// Snapshot of one queued timer, in queue order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArmedTimer {
    pub client: ClientId,
    pub slot: u32,
    pub kind: TimerKind,
    pub deadline_ns: u64,
}

#[derive(Debug)]
pub struct MultiplexerState {
    table: SlotTable,
    queue: TimeoutQueue,
}

impl MultiplexerState {
    /// Allocates every slot for `client_count` clients up front.
    ///
    /// # Panics
    ///
    /// Panics on dimensions that [`TimeServerConfig::validate`](crate::TimeServerConfig::validate)
    /// rejects: `timers_per_client` outside `1..=32`, or more than `u32::MAX` slots in total.
    pub fn init(client_count: usize, timers_per_client: usize) -> Self {
        Self {
            table: SlotTable::new(Capacity {
                client_count,
                timers_per_client,
            }),
            queue: TimeoutQueue::new(),
        }
    }

    pub fn capacity(&self) -> Capacity {
        self.table.capacity()
    }

    /// One-shot timer firing `ns` after `now_ns`. Returns the deadline.
    pub fn schedule_relative(
        &mut self,
        now_ns: u64,
        client: ClientId,
        slot: u32,
        ns: u64,
    ) -> Result<u64, TimerError> {
        let idx = self.table.index(client, slot)?;
        let deadline_ns = now_ns.saturating_add(ns);
        self.arm(idx, TimerKind::RelativeOneshot, deadline_ns, 0);
        Ok(deadline_ns)
    }

    /// One-shot timer firing at the absolute time `deadline_ns`.
    ///
    /// A deadline in the past fires on the next dispatch.
    pub fn schedule_absolute(
        &mut self,
        client: ClientId,
        slot: u32,
        deadline_ns: u64,
    ) -> Result<u64, TimerError> {
        let idx = self.table.index(client, slot)?;
        self.arm(idx, TimerKind::AbsoluteOneshot, deadline_ns, 0);
        Ok(deadline_ns)
    }

    /// Periodic timer first firing `period_ns` after `now_ns`. Returns the first deadline.
    pub fn schedule_periodic(
        &mut self,
        now_ns: u64,
        client: ClientId,
        slot: u32,
        period_ns: u64,
    ) -> Result<u64, TimerError> {
        let idx = self.table.index(client, slot)?;
        if period_ns == 0 {
            return Err(TimerError::ZeroPeriod);
        }
        let deadline_ns = now_ns.saturating_add(period_ns);
        self.arm(idx, TimerKind::Periodic, deadline_ns, period_ns);
        Ok(deadline_ns)
    }

    /// Disarms the slot. Stopping an idle slot is a no-op.
    ///
    /// Returns whether a pending firing was cancelled.
    pub fn stop(&mut self, client: ClientId, slot: u32) -> Result<bool, TimerError> {
        let idx = self.table.index(client, slot)?;
        if !self.table.get(idx).kind.is_active() {
            return Ok(false);
        }
        self.queue.remove(&mut self.table, idx);
        self.table.get_mut(idx).kind = TimerKind::Off;
        Ok(true)
    }

    /// Reads and clears the client's completion mask.
    pub fn poll_completed(&mut self, client: ClientId) -> Result<u32, TimerError> {
        self.table.take_completed(client)
    }

    /// Fires every timer due at `now_ns`, in deadline order.
    ///
    /// Periodic timers are re-queued exactly one period later, so a timer that fell several
    /// periods behind fires once per missed period within this pass. Returns the number of
    /// firings.
    pub fn dispatch<N>(&mut self, now_ns: u64, notifier: &N) -> usize
    where
        N: Notifier + ?Sized,
    {
        let mut fired = 0;
        while let Some(idx) = self.queue.pop_due(&mut self.table, now_ns) {
            let (client, slot) = self.table.owner(idx);
            notifier.notify(client);
            self.table.mark_completed(idx);
            fired += 1;

            let timer = self.table.get_mut(idx);
            tracing::trace!(
                %client,
                badge = client.badge(),
                slot,
                deadline_ns = timer.deadline_ns,
                now_ns,
                kind = ?timer.kind,
                "timer fired"
            );
            match timer.kind {
                TimerKind::Periodic => match timer.deadline_ns.checked_add(timer.period_ns) {
                    Some(next) => {
                        timer.deadline_ns = next;
                        self.queue.insert(&mut self.table, idx);
                    }
                    None => timer.kind = TimerKind::Off,
                },
                TimerKind::AbsoluteOneshot | TimerKind::RelativeOneshot => {
                    timer.kind = TimerKind::Off;
                }
                TimerKind::Off => unreachable!("queued timer slot is off"),
            }
        }
        fired
    }

    /// Whether the earliest queued deadline has been reached.
    pub fn is_due(&self, now_ns: u64) -> bool {
        self.queue.peek_due(&self.table, now_ns)
    }

    pub fn next_deadline_ns(&self) -> Option<u64> {
        self.queue
            .first()
            .map(|idx| self.table.get(idx).deadline_ns)
    }

    pub fn armed_count(&self) -> usize {
        self.queue.len()
    }

    pub fn slot(&self, client: ClientId, slot: u32) -> Result<&TimerSlot, TimerError> {
        self.table.slot(client, slot)
    }

    /// Completion bits accumulated so far, without clearing them.
    pub fn completed(&self, client: ClientId) -> Result<u32, TimerError> {
        self.table.completed(client)
    }

    /// Queued timers from earliest to latest deadline.
    pub fn armed(&self) -> impl Iterator<Item = ArmedTimer> + '_ {
        self.queue.iter(&self.table).map(|idx| {
            let (client, slot) = self.table.owner(idx);
            let timer = self.table.get(idx);
            ArmedTimer {
                client,
                slot,
                kind: timer.kind,
                deadline_ns: timer.deadline_ns,
            }
        })
    }

    fn arm(&mut self, idx: SlotIndex, kind: TimerKind, deadline_ns: u64, period_ns: u64) {
        if self.table.get(idx).kind.is_active() {
            self.queue.remove(&mut self.table, idx);
        }
        let timer = self.table.get_mut(idx);
        timer.kind = kind;
        timer.deadline_ns = deadline_ns;
        timer.period_ns = period_ns;
        self.queue.insert(&mut self.table, idx);
    }
}
