use std::num::NonZeroU64;

use crate::counter::CycleCounter;

pub const NS_PER_SEC: u64 = 1_000_000_000;

/// Computes `a * b / c` without losing the high bits of the intermediate product.
///
/// The result saturates at `u64::MAX` if the quotient does not fit.
#[inline]
pub fn mul_div_u64(a: u64, b: u64, c: NonZeroU64) -> u64 {
    let wide = (a as u128) * (b as u128) / (c.get() as u128);
    u64::try_from(wide).unwrap_or(u64::MAX)
}

/// Monotonic nanosecond clock over a calibrated cycle counter.
///
/// The frequency is fixed at construction; `now_ns` only reads the counter.
#[derive(Debug, Clone)]
pub struct MonotonicClock<C> {
    counter: C,
    freq_hz: NonZeroU64,
}

impl<C: CycleCounter> MonotonicClock<C> {
    pub fn new(counter: C, freq_hz: NonZeroU64) -> Self {
        Self { counter, freq_hz }
    }

    pub fn freq_hz(&self) -> u64 {
        self.freq_hz.get()
    }

    pub fn counter(&self) -> &C {
        &self.counter
    }

    /// Returns the current monotonic time, in nanoseconds.
    #[inline]
    pub fn now_ns(&self) -> u64 {
        self.cycles_to_ns(self.counter.read())
    }

    #[inline]
    pub fn cycles_to_ns(&self, cycles: u64) -> u64 {
        mul_div_u64(cycles, NS_PER_SEC, self.freq_hz)
    }

    /// Inverse of [`Self::cycles_to_ns`], rounding up so that reaching the returned cycle count
    /// always yields at least `ns`.
    pub fn ns_to_cycles_ceil(&self, ns: u64) -> u64 {
        let numer = (ns as u128) * (self.freq_hz.get() as u128);
        let denom = NS_PER_SEC as u128;
        u64::try_from((numer + denom - 1) / denom).unwrap_or(u64::MAX)
    }
}
