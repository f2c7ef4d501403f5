use std::num::NonZeroU64;

use thiserror::Error;

use crate::clock::{mul_div_u64, NS_PER_SEC};
use crate::counter::CycleCounter;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CalibrationError {
    #[error("calibration window must be non-zero")]
    ZeroWindow,

    #[error("cycle counter did not advance during the calibration window")]
    CounterStalled,

    #[error("measured counter frequency rounds to zero")]
    ZeroFrequency,

    #[error("reference timer failed: {0}")]
    Reference(String),
}

/// A timer with a known rate, used to measure the cycle counter.
pub trait ReferenceTimer {
    /// Blocks until at least `ns` nanoseconds of reference time have elapsed.
    fn busy_wait_ns(&mut self, ns: u64) -> Result<(), CalibrationError>;
}

impl<R: ReferenceTimer + ?Sized> ReferenceTimer for &mut R {
    fn busy_wait_ns(&mut self, ns: u64) -> Result<(), CalibrationError> {
        (**self).busy_wait_ns(ns)
    }
}

/// Measures the rate of `counter` over `window_ns` of reference time.
///
/// The counter may wrap at most once during the window.
pub fn calibrate_frequency<C, R>(
    counter: &C,
    reference: &mut R,
    window_ns: u64,
) -> Result<NonZeroU64, CalibrationError>
where
    C: CycleCounter + ?Sized,
    R: ReferenceTimer + ?Sized,
{
    let window = NonZeroU64::new(window_ns).ok_or(CalibrationError::ZeroWindow)?;

    let start = counter.read();
    reference.busy_wait_ns(window_ns)?;
    let end = counter.read();

    let elapsed = end.wrapping_sub(start);
    if elapsed == 0 {
        return Err(CalibrationError::CounterStalled);
    }

    let freq = mul_div_u64(elapsed, NS_PER_SEC, window);
    let freq = NonZeroU64::new(freq).ok_or(CalibrationError::ZeroFrequency)?;
    tracing::debug!(elapsed, window_ns, freq_hz = freq.get(), "counter calibrated");
    Ok(freq)
}
