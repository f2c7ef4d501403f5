use std::sync::{Mutex, MutexGuard};

use timemux_clock::{calibrate_frequency, CycleCounter, MonotonicClock, ReferenceTimer};
use timemux_pit::TickSource;

use crate::client::ClientId;
use crate::config::TimeServerConfig;
use crate::error::{FatalError, TimerError};
use crate::notify::Notifier;
use crate::request::{TimerReply, TimerRequest};
use crate::slot::Capacity;
use crate::state::MultiplexerState;

/// Result of one dispatch pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub now_ns: u64,
    pub fired: usize,
}

struct Inner<T> {
    state: MultiplexerState,
    tick: T,
}

/// The time server: one [`MultiplexerState`] and the tick hardware behind a single lock.
///
/// Request handlers and [`TimeServer::on_tick`] may be called concurrently from different
/// threads; each call holds the lock for its whole body. The clock itself is immutable after
/// startup and is read without the lock.
pub struct TimeServer<C, T, N> {
    clock: MonotonicClock<C>,
    capacity: Capacity,
    tick_period_ns: u64,
    notifier: N,
    inner: Mutex<Inner<T>>,
}

impl<C, T, N> TimeServer<C, T, N>
where
    C: CycleCounter,
    T: TickSource,
    N: Notifier,
{
    /// Calibrates `counter` against the tick hardware, then brings the server up.
    pub fn start(
        config: &TimeServerConfig,
        counter: C,
        mut tick: T,
        notifier: N,
    ) -> Result<Self, FatalError>
    where
        T: ReferenceTimer,
    {
        config.validate()?;
        let freq = calibrate_frequency(&counter, &mut tick, config.calibration_window_ns)?;
        Self::with_clock(config, MonotonicClock::new(counter, freq), tick, notifier)
    }

    /// Brings the server up with an already calibrated clock.
    ///
    /// Allocates every slot, clears any pending tick interrupt, then starts the tick hardware
    /// at the configured rate.
    pub fn with_clock(
        config: &TimeServerConfig,
        clock: MonotonicClock<C>,
        mut tick: T,
        notifier: N,
    ) -> Result<Self, FatalError> {
        config.validate()?;
        let state = MultiplexerState::init(config.client_count, config.timers_per_client);
        let tick_period_ns = config.tick_period_ns();

        tick.acknowledge().map_err(FatalError::InterruptAcknowledge)?;
        tick.start().map_err(FatalError::HardwareAcquisition)?;
        tick.set_period_ns(tick_period_ns)
            .map_err(FatalError::HardwareAcquisition)?;

        tracing::info!(
            freq_hz = clock.freq_hz(),
            tick_hz = config.tick_hz,
            clients = config.client_count,
            timers_per_client = config.timers_per_client,
            "time server started"
        );

        Ok(Self {
            clock,
            capacity: state.capacity(),
            tick_period_ns,
            notifier,
            inner: Mutex::new(Inner { state, tick }),
        })
    }

    pub fn capacity(&self) -> Capacity {
        self.capacity
    }

    pub fn tick_period_ns(&self) -> u64 {
        self.tick_period_ns
    }

    pub fn clock(&self) -> &MonotonicClock<C> {
        &self.clock
    }

    pub fn counter_frequency_hz(&self) -> u64 {
        self.clock.freq_hz()
    }

    /// Current monotonic time. The client only scopes the call.
    pub fn current_time(&self, _client: ClientId) -> u64 {
        self.clock.now_ns()
    }

    pub fn schedule_relative(&self, client: ClientId, slot: u32, ns: u64) -> Result<(), TimerError> {
        self.check_slot(client, slot, "schedule_relative")?;
        let mut inner = self.lock();
        let now_ns = self.clock.now_ns();
        let deadline_ns = inner.state.schedule_relative(now_ns, client, slot, ns)?;
        tracing::debug!(%client, slot, now_ns, deadline_ns, "relative timer armed");
        Ok(())
    }

    pub fn schedule_absolute(
        &self,
        client: ClientId,
        slot: u32,
        deadline_ns: u64,
    ) -> Result<(), TimerError> {
        self.check_slot(client, slot, "schedule_absolute")?;
        let mut inner = self.lock();
        inner.state.schedule_absolute(client, slot, deadline_ns)?;
        tracing::debug!(%client, slot, deadline_ns, "absolute timer armed");
        Ok(())
    }

    pub fn schedule_periodic(
        &self,
        client: ClientId,
        slot: u32,
        period_ns: u64,
    ) -> Result<(), TimerError> {
        self.check_slot(client, slot, "schedule_periodic")?;
        let mut inner = self.lock();
        let now_ns = self.clock.now_ns();
        let deadline_ns = inner
            .state
            .schedule_periodic(now_ns, client, slot, period_ns)
            .map_err(|err| {
                tracing::warn!(%client, slot, period_ns, "schedule_periodic rejected: {err}");
                err
            })?;
        tracing::debug!(%client, slot, period_ns, deadline_ns, "periodic timer armed");
        Ok(())
    }

    pub fn stop(&self, client: ClientId, slot: u32) -> Result<(), TimerError> {
        self.check_slot(client, slot, "stop")?;
        let mut inner = self.lock();
        if inner.state.stop(client, slot)? {
            tracing::debug!(%client, slot, "timer stopped");
        }
        Ok(())
    }

    /// Reads and clears the client's completion mask.
    pub fn poll_completed(&self, client: ClientId) -> Result<u32, TimerError> {
        if let Err(err) = self.capacity.check_client(client) {
            tracing::warn!("poll_completed rejected: {err}");
            return Err(err);
        }
        self.lock().state.poll_completed(client)
    }

    /// Dispatches a transport message to the matching handler.
    pub fn handle(&self, client: ClientId, request: TimerRequest) -> Result<TimerReply, TimerError> {
        match request {
            TimerRequest::ScheduleRelative { slot, ns } => {
                self.schedule_relative(client, slot, ns).map(|()| TimerReply::Done)
            }
            TimerRequest::ScheduleAbsolute { slot, deadline_ns } => self
                .schedule_absolute(client, slot, deadline_ns)
                .map(|()| TimerReply::Done),
            TimerRequest::SchedulePeriodic { slot, period_ns } => self
                .schedule_periodic(client, slot, period_ns)
                .map(|()| TimerReply::Done),
            TimerRequest::Stop { slot } => self.stop(client, slot).map(|()| TimerReply::Done),
            TimerRequest::PollCompleted => self.poll_completed(client).map(TimerReply::Completed),
            TimerRequest::CurrentTime => Ok(TimerReply::Time(self.current_time(client))),
            TimerRequest::CounterFrequency => {
                Ok(TimerReply::Frequency(self.counter_frequency_hz()))
            }
        }
    }

    /// Like [`handle`](Self::handle), for a transport that identifies the caller by badge.
    pub fn handle_badged(&self, badge: u64, request: TimerRequest) -> Result<TimerReply, TimerError> {
        let Some(client) = ClientId::from_badge(badge) else {
            tracing::warn!(badge, "request rejected: unknown badge");
            return Err(TimerError::UnknownBadge { badge });
        };
        if let Err(err) = self.capacity.check_client(client) {
            tracing::warn!(badge, "request rejected: {err}");
            return Err(err);
        }
        self.handle(client, request)
    }

    /// Interrupt entry point: fires every due timer, then services and acknowledges the tick.
    ///
    /// Any error is fatal to the server.
    pub fn on_tick(&self) -> Result<TickReport, FatalError> {
        let mut guard = self.lock();
        let Inner { state, tick } = &mut *guard;

        let now_ns = self.clock.now_ns();
        let fired = state.dispatch(now_ns, &self.notifier);

        tick.handle_irq().map_err(|err| {
            tracing::error!("tick handling failed: {err}");
            FatalError::TickHandling(err)
        })?;
        tick.acknowledge().map_err(|err| {
            tracing::error!("interrupt acknowledge failed: {err}");
            FatalError::InterruptAcknowledge(err)
        })?;

        Ok(TickReport { now_ns, fired })
    }

    /// Runs `f` against the multiplexer state under the server lock.
    pub fn inspect<R>(&self, f: impl FnOnce(&MultiplexerState) -> R) -> R {
        f(&self.lock().state)
    }

    fn check_slot(&self, client: ClientId, slot: u32, op: &'static str) -> Result<(), TimerError> {
        self.capacity.check_slot(client, slot).map_err(|err| {
            tracing::warn!(op, "request rejected: {err}");
            err
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(_) => {
                tracing::error!("{}", FatalError::LockPoisoned);
                std::process::abort();
            }
        }
    }
}
