use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// A free-running, monotonically increasing hardware cycle counter.
///
/// Implementations must be cheap and side-effect free; the value may wrap at an
/// implementation-defined width.
pub trait CycleCounter: Send + Sync {
    fn read(&self) -> u64;
}

impl<C: CycleCounter + ?Sized> CycleCounter for Arc<C> {
    #[inline]
    fn read(&self) -> u64 {
        (**self).read()
    }
}

/// Counter whose value is set explicitly by the caller.
///
/// Clones share the same underlying value, so a test can hand one clone to the time server
/// and keep another to advance time.
#[derive(Debug, Clone, Default)]
pub struct ManualCounter {
    cycles: Arc<AtomicU64>,
}

impl ManualCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(cycles: u64) -> Self {
        Self {
            cycles: Arc::new(AtomicU64::new(cycles)),
        }
    }

    pub fn set(&self, cycles: u64) {
        self.cycles.store(cycles, Ordering::SeqCst);
    }

    /// Advances the counter by `cycles`, wrapping like a hardware counter would.
    pub fn advance(&self, cycles: u64) {
        let mut cur = self.cycles.load(Ordering::SeqCst);
        loop {
            let next = cur.wrapping_add(cycles);
            match self
                .cycles
                .compare_exchange_weak(cur, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return,
                Err(actual) => cur = actual,
            }
        }
    }
}

impl CycleCounter for ManualCounter {
    #[inline]
    fn read(&self) -> u64 {
        self.cycles.load(Ordering::SeqCst)
    }
}

/// Host counter backed by [`Instant`], ticking once per elapsed nanosecond.
#[derive(Debug, Clone, Copy)]
pub struct InstantCounter {
    origin: Instant,
}

impl InstantCounter {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for InstantCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl CycleCounter for InstantCounter {
    fn read(&self) -> u64 {
        // u64 nanoseconds covers ~584 years of uptime.
        self.origin.elapsed().as_nanos() as u64
    }
}
