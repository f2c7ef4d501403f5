//! Runs the time server as an ordinary host process.
//!
//! [`InstantCounter`] stands in for the hardware cycle counter, a [`ThreadTicker`] thread for
//! the tick interrupt and a [`CondvarNotifier`] for client notifications. [`Host::start`] wires
//! them together and spawns the [`Dispatcher`].

#![forbid(unsafe_code)]

mod dispatch;
mod notifier;
mod reference;
mod ticker;

use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use timemux::clock::InstantCounter;
use timemux::{ClientId, FatalError, TimeServer, TimeServerConfig, TimerError};

pub use dispatch::Dispatcher;
pub use notifier::CondvarNotifier;
pub use reference::SleepReference;
pub use ticker::{ThreadTicker, TickReceiver};

pub type HostTimeServer = TimeServer<InstantCounter, ThreadTicker, CondvarNotifier>;

#[derive(Debug, Error)]
pub enum HostError {
    #[error(transparent)]
    Fatal(#[from] FatalError),

    #[error(transparent)]
    Timer(#[from] TimerError),

    #[error("failed to spawn dispatch thread")]
    Spawn(#[source] std::io::Error),
}

/// A running server plus the threads that drive it.
pub struct Host {
    server: Arc<HostTimeServer>,
    notifier: CondvarNotifier,
    dispatcher: Dispatcher,
}

impl Host {
    /// Calibrates the host counter, starts the tick thread and begins dispatching.
    pub fn start(config: &TimeServerConfig) -> Result<Self, HostError> {
        let (ticker, ticks) = ThreadTicker::new();
        let notifier = CondvarNotifier::new(config.client_count);
        let server = Arc::new(TimeServer::start(
            config,
            InstantCounter::new(),
            ticker,
            notifier.clone(),
        )?);
        let dispatcher = Dispatcher::spawn(Arc::clone(&server), ticks).map_err(HostError::Spawn)?;
        Ok(Self {
            server,
            notifier,
            dispatcher,
        })
    }

    pub fn server(&self) -> &Arc<HostTimeServer> {
        &self.server
    }

    pub fn notifier(&self) -> &CondvarNotifier {
        &self.notifier
    }

    /// Stops dispatching and returns the number of ticks handled.
    pub fn shutdown(self) -> Result<u64, HostError> {
        Ok(self.dispatcher.shutdown()?)
    }
}

/// Timers armed by [`self_check`].
#[derive(Debug, Clone, Copy)]
pub struct SelfCheckPlan {
    pub client: ClientId,
    pub period_ns: u64,
    pub oneshot_ns: u64,
    pub timeout: Duration,
}

impl SelfCheckPlan {
    /// A periodic timer every five ticks and a one-shot after twenty.
    pub fn for_tick_period(client: ClientId, tick_period_ns: u64) -> Self {
        Self {
            client,
            period_ns: tick_period_ns.saturating_mul(5),
            oneshot_ns: tick_period_ns.saturating_mul(20),
            timeout: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelfCheckReport {
    pub periodic_fired: bool,
    pub oneshot_fired: bool,
    pub notifications: u64,
    pub elapsed_ns: u64,
}

impl SelfCheckReport {
    pub fn passed(&self) -> bool {
        self.periodic_fired && self.oneshot_fired
    }
}

/// Arms a periodic timer in slot 0 and a one-shot in slot 1, waits for the one-shot, then
/// stops both.
pub fn self_check(host: &Host, plan: SelfCheckPlan) -> Result<SelfCheckReport, HostError> {
    let server = host.server();
    let client = plan.client;
    // Both slots are checked before either is armed, so a rejection leaves nothing behind.
    let capacity = server.capacity();
    capacity.check_slot(client, 0)?;
    capacity.check_slot(client, 1)?;

    let started_ns = server.current_time(client);

    server.schedule_periodic(client, 0, plan.period_ns)?;
    server.schedule_relative(client, 1, plan.oneshot_ns)?;

    let give_up = Instant::now() + plan.timeout;
    let mut seen = 0u32;
    let mut notifications = 0u64;
    while seen & 0b10 == 0 && Instant::now() < give_up {
        notifications += host.notifier().wait(client, Duration::from_millis(20));
        seen |= server.poll_completed(client)?;
    }

    server.stop(client, 0)?;
    server.stop(client, 1)?;

    let report = SelfCheckReport {
        periodic_fired: seen & 0b01 != 0,
        oneshot_fired: seen & 0b10 != 0,
        notifications,
        elapsed_ns: server.current_time(client).saturating_sub(started_ns),
    };
    tracing::debug!(?report, "self-check finished");
    Ok(report)
}
