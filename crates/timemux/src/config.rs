use thiserror::Error;
use timemux_clock::NS_PER_SEC;

use crate::slot::MAX_TIMERS_PER_CLIENT;

/// Dispatch rate of the tick interrupt.
pub const DEFAULT_TICK_HZ: u32 = 500;
pub const DEFAULT_TIMERS_PER_CLIENT: usize = 8;
pub const DEFAULT_CALIBRATION_WINDOW_NS: u64 = 10_000_000;

const ENV_CLIENT_COUNT: &str = "TIMEMUX_CLIENT_COUNT";
const ENV_TIMERS_PER_CLIENT: &str = "TIMEMUX_TIMERS_PER_CLIENT";
const ENV_TICK_HZ: &str = "TIMEMUX_TICK_HZ";
const ENV_CALIBRATION_MS: &str = "TIMEMUX_CALIBRATION_MS";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("missing required env var {0}")]
    MissingEnv(&'static str),

    #[error("invalid value {value:?} for env var {var}")]
    InvalidEnv { var: &'static str, value: String },

    #[error("at least one client is required")]
    NoClients,

    #[error("timers_per_client must be in 1..={max}, got {got}")]
    TimersPerClient { got: usize, max: usize },

    #[error("{client_count} clients with {timers_per_client} timers each exceed the slot arena limit of {max}")]
    TooManySlots {
        client_count: usize,
        timers_per_client: usize,
        max: u32,
    },

    #[error("tick rate must be in 1..={max} Hz, got {got}")]
    TickHz { got: u32, max: u64 },

    #[error("calibration window must be non-zero")]
    ZeroCalibrationWindow,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeServerConfig {
    pub client_count: usize,
    pub timers_per_client: usize,
    pub tick_hz: u32,
    pub calibration_window_ns: u64,
}

impl TimeServerConfig {
    pub fn new(client_count: usize, timers_per_client: usize) -> Self {
        Self {
            client_count,
            timers_per_client,
            tick_hz: DEFAULT_TICK_HZ,
            calibration_window_ns: DEFAULT_CALIBRATION_WINDOW_NS,
        }
    }

    pub fn with_tick_hz(mut self, tick_hz: u32) -> Self {
        self.tick_hz = tick_hz;
        self
    }

    pub fn with_calibration_window_ns(mut self, window_ns: u64) -> Self {
        self.calibration_window_ns = window_ns;
        self
    }

    /// Interval between dispatch ticks. Only meaningful for a validated config.
    pub fn tick_period_ns(&self) -> u64 {
        NS_PER_SEC / u64::from(self.tick_hz.max(1))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.client_count == 0 {
            return Err(ConfigError::NoClients);
        }
        if !(1..=MAX_TIMERS_PER_CLIENT).contains(&self.timers_per_client) {
            return Err(ConfigError::TimersPerClient {
                got: self.timers_per_client,
                max: MAX_TIMERS_PER_CLIENT,
            });
        }
        let arena_fits = self
            .client_count
            .checked_mul(self.timers_per_client)
            .is_some_and(|total| u32::try_from(total).is_ok());
        if !arena_fits {
            return Err(ConfigError::TooManySlots {
                client_count: self.client_count,
                timers_per_client: self.timers_per_client,
                max: u32::MAX,
            });
        }
        if self.tick_hz == 0 || u64::from(self.tick_hz) > NS_PER_SEC {
            return Err(ConfigError::TickHz {
                got: self.tick_hz,
                max: NS_PER_SEC,
            });
        }
        if self.calibration_window_ns == 0 {
            return Err(ConfigError::ZeroCalibrationWindow);
        }
        Ok(())
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Builds a config from `lookup`, which maps an env var name to its value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        let client_count = lookup(ENV_CLIENT_COUNT)
            .ok_or(ConfigError::MissingEnv(ENV_CLIENT_COUNT))
            .and_then(|raw| parse(ENV_CLIENT_COUNT, &raw))?;
        let timers_per_client = lookup(ENV_TIMERS_PER_CLIENT)
            .map(|raw| parse(ENV_TIMERS_PER_CLIENT, &raw))
            .transpose()?
            .unwrap_or(DEFAULT_TIMERS_PER_CLIENT);
        let tick_hz = lookup(ENV_TICK_HZ)
            .map(|raw| parse(ENV_TICK_HZ, &raw))
            .transpose()?
            .unwrap_or(DEFAULT_TICK_HZ);
        let calibration_window_ns = lookup(ENV_CALIBRATION_MS)
            .map(|raw| parse::<u64>(ENV_CALIBRATION_MS, &raw))
            .transpose()?
            .map(|ms| ms.saturating_mul(1_000_000))
            .unwrap_or(DEFAULT_CALIBRATION_WINDOW_NS);

        let cfg = Self {
            client_count,
            timers_per_client,
            tick_hz,
            calibration_window_ns,
        };
        cfg.validate()?;
        Ok(cfg)
    }
}

fn parse<T: std::str::FromStr>(var: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        var,
        value: raw.to_owned(),
    })
}
