//! Dispatch tick hardware for the time server.
//!
//! [`TickSource`] is the contract the dispatch loop needs from the interrupt hardware. The
//! provided implementation drives an 8254 PIT through a narrow [`PortIo`] window; the same PIT
//! doubles as the [`timemux_clock::ReferenceTimer`] used to calibrate the cycle counter.

#![forbid(unsafe_code)]

mod pit;
mod ports;
mod tick;

pub use pit::{Pit, PitMode, ReadBackStatus, PIT_INPUT_HZ, PIT_MAX_RELOAD};
pub use ports::{PitPortWindow, PortIo, PortIoError, PIT_CHANNEL0, PIT_COMMAND};
pub use tick::{IrqLine, PitTickSource, TickError, TickSource};
