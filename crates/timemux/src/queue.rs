//! Deadline-ordered queue of armed slots.
//!
//! An intrusive doubly linked list threaded through [`TimerSlot`](crate::slot::TimerSlot)
//! links. Insertion scans for the first entry with a strictly later deadline, so entries with
//! equal deadlines stay in arrival order. Removal is O(1) given the slot index. The number of
//! armed slots is bounded by the arena size, which keeps the scan short.

use crate::slot::{SlotIndex, SlotTable};

#[derive(Debug, Default)]
pub struct TimeoutQueue {
    head: Option<SlotIndex>,
    tail: Option<SlotIndex>,
    len: usize,
}

impl TimeoutQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub(crate) fn first(&self) -> Option<SlotIndex> {
        self.head
    }

    /// Links `idx` after every entry whose deadline is `<=` its own.
    ///
    /// The slot must not already be queued.
    pub(crate) fn insert(&mut self, slots: &mut SlotTable, idx: SlotIndex) {
        debug_assert!(!slots.get(idx).link.queued, "slot inserted twice");
        let deadline = slots.get(idx).deadline_ns;

        // Appending is the common case for periodic re-arms.
        let (prev, next) = match self.tail {
            Some(tail) if slots.get(tail).deadline_ns <= deadline => (Some(tail), None),
            _ => {
                let mut prev = None;
                let mut next = self.head;
                while let Some(cur) = next {
                    if slots.get(cur).deadline_ns > deadline {
                        break;
                    }
                    prev = Some(cur);
                    next = slots.get(cur).link.next;
                }
                (prev, next)
            }
        };

        {
            let link = &mut slots.get_mut(idx).link;
            link.prev = prev;
            link.next = next;
            link.queued = true;
        }
        match prev {
            Some(p) => slots.get_mut(p).link.next = Some(idx),
            None => self.head = Some(idx),
        }
        match next {
            Some(n) => slots.get_mut(n).link.prev = Some(idx),
            None => self.tail = Some(idx),
        }
        self.len += 1;
    }

    /// Unlinks `idx`. The slot must currently be queued.
    pub(crate) fn remove(&mut self, slots: &mut SlotTable, idx: SlotIndex) {
        debug_assert!(slots.get(idx).link.queued, "removing unqueued slot");
        let link = std::mem::take(&mut slots.get_mut(idx).link);

        match link.prev {
            Some(p) => slots.get_mut(p).link.next = link.next,
            None => {
                debug_assert_eq!(self.head, Some(idx));
                self.head = link.next;
            }
        }
        match link.next {
            Some(n) => slots.get_mut(n).link.prev = link.prev,
            None => {
                debug_assert_eq!(self.tail, Some(idx));
                self.tail = link.prev;
            }
        }
        self.len -= 1;
    }

    /// Whether the earliest deadline has been reached at `now_ns`.
    pub fn peek_due(&self, slots: &SlotTable, now_ns: u64) -> bool {
        self.head
            .is_some_and(|head| slots.get(head).deadline_ns <= now_ns)
    }

    /// Unlinks and returns the head if it is due at `now_ns`.
    pub(crate) fn pop_due(&mut self, slots: &mut SlotTable, now_ns: u64) -> Option<SlotIndex> {
        if !self.peek_due(slots, now_ns) {
            return None;
        }
        let head = self.head?;
        self.remove(slots, head);
        Some(head)
    }

    pub(crate) fn iter<'a>(&self, slots: &'a SlotTable) -> impl Iterator<Item = SlotIndex> + 'a {
        let mut cur = self.head;
        std::iter::from_fn(move || {
            let idx = cur?;
            cur = slots.get(idx).link.next;
            Some(idx)
        })
    }
}
