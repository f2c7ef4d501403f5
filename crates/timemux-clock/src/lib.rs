//! Monotonic time derived from a free-running cycle counter.
//!
//! The time server never trusts a nominal counter rate. At startup the counter is measured
//! against a reference timer ([`calibrate_frequency`]) and the resulting frequency is frozen
//! into a [`MonotonicClock`]. From then on `now_ns()` is a pure function of the raw counter,
//! so it can be called from both the request path and the interrupt path.
//!
//! Tests and simulations drive time deterministically through [`ManualCounter`].

#![forbid(unsafe_code)]

mod calibrate;
mod clock;
mod counter;

pub use calibrate::{calibrate_frequency, CalibrationError, ReferenceTimer};
pub use clock::{mul_div_u64, MonotonicClock, NS_PER_SEC};
pub use counter::{CycleCounter, InstantCounter, ManualCounter};
