//! Per-client timer multiplexing over one hardware tick.
//!
//! Each client owns a fixed set of timer slots that can be armed as relative one-shot,
//! absolute one-shot or periodic timeouts against a shared monotonic clock. All armed slots
//! across all clients sit in one deadline-ordered queue. A fixed-rate hardware tick calls
//! [`TimeServer::on_tick`], which fires every due slot, sets the slot's bit in the owning
//! client's completion mask, wakes the client through a [`Notifier`], and re-queues periodic
//! slots one period later.
//!
//! Clients only ever see their own slots and completion mask.

#![forbid(unsafe_code)]

mod client;
mod config;
mod error;
mod notify;
mod queue;
mod request;
mod server;
mod slot;
mod state;

#[cfg(test)]
mod tests;

pub use client::ClientId;
pub use config::{
    ConfigError, TimeServerConfig, DEFAULT_CALIBRATION_WINDOW_NS, DEFAULT_TICK_HZ,
    DEFAULT_TIMERS_PER_CLIENT,
};
pub use error::{FatalError, TimerError};
pub use notify::{BadgeNotifier, Notifier};
pub use request::{TimerReply, TimerRequest};
pub use server::{TickReport, TimeServer};
pub use slot::{Capacity, TimerKind, TimerSlot, MAX_TIMERS_PER_CLIENT};
pub use state::{ArmedTimer, MultiplexerState};

pub use timemux_clock as clock;
pub use timemux_pit as pit;
