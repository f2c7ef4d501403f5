use std::thread;
use std::time::{Duration, Instant};

use timemux::clock::{CalibrationError, ReferenceTimer};

/// Below this much remaining time the wait spins instead of sleeping.
const SPIN_THRESHOLD: Duration = Duration::from_micros(200);

/// Reference timer backed by the host's monotonic clock.
///
/// Sleeps for the bulk of the window and spins for the tail, so the overshoot stays well under
/// the scheduler's wakeup granularity.
#[derive(Debug, Default, Clone, Copy)]
pub struct SleepReference;

impl ReferenceTimer for SleepReference {
    fn busy_wait_ns(&mut self, ns: u64) -> Result<(), CalibrationError> {
        let start = Instant::now();
        let deadline = start
            .checked_add(Duration::from_nanos(ns))
            .ok_or_else(|| CalibrationError::Reference(format!("{ns}ns wait is out of range")))?;

        loop {
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            let remaining = deadline - now;
            if remaining > SPIN_THRESHOLD {
                thread::sleep(remaining - SPIN_THRESHOLD);
            } else {
                std::hint::spin_loop();
            }
        }
    }
}
