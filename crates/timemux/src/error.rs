use thiserror::Error;
use timemux_clock::CalibrationError;
use timemux_pit::TickError;

use crate::client::ClientId;
use crate::config::ConfigError;

/// Request validation errors. Returned to the caller; no timer state is touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TimerError {
    #[error("invalid timer slot {slot} (client has {timers_per_client} slots)")]
    InvalidSlot { slot: u32, timers_per_client: usize },

    #[error("invalid client {client} (server has {client_count} clients)")]
    InvalidClient { client: ClientId, client_count: usize },

    #[error("badge {badge} does not name a client")]
    UnknownBadge { badge: u64 },

    #[error("periodic timer needs a non-zero period")]
    ZeroPeriod,
}

/// Conditions the time server cannot continue from.
#[derive(Debug, Error)]
pub enum FatalError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("counter calibration failed: {0}")]
    Calibration(#[from] CalibrationError),

    #[error("failed to acquire tick hardware: {0}")]
    HardwareAcquisition(#[source] TickError),

    #[error("tick interrupt handling failed: {0}")]
    TickHandling(#[source] TickError),

    #[error("interrupt acknowledge failed: {0}")]
    InterruptAcknowledge(#[source] TickError),

    #[error("time server lock poisoned")]
    LockPoisoned,
}
