#![allow(dead_code)]

use std::num::NonZeroU64;
use std::sync::{Arc, Mutex};

use timemux::clock::{
    CalibrationError, ManualCounter, MonotonicClock, ReferenceTimer, NS_PER_SEC,
};
use timemux::pit::{TickError, TickSource};
use timemux::{ClientId, Notifier, TimeServer, TimeServerConfig};

/// Tick source that records what the server asked of it.
#[derive(Debug, Default, Clone)]
pub struct ManualTick {
    pub log: Arc<Mutex<TickLog>>,
    /// Counter advanced while busy-waiting, for calibration tests.
    pub counter: Option<(ManualCounter, u64)>,
}

#[derive(Debug, Default)]
pub struct TickLog {
    pub started: bool,
    pub period_ns: Option<u64>,
    pub irqs: u64,
    pub acks: u64,
    pub fail_start: bool,
    pub fail_ack: bool,
}

impl TickSource for ManualTick {
    fn start(&mut self) -> Result<(), TickError> {
        let mut log = self.log.lock().unwrap();
        if log.fail_start {
            return Err(TickError::Unavailable("no PIT".into()));
        }
        log.started = true;
        Ok(())
    }

    fn set_period_ns(&mut self, period_ns: u64) -> Result<(), TickError> {
        self.log.lock().unwrap().period_ns = Some(period_ns);
        Ok(())
    }

    fn handle_irq(&mut self) -> Result<(), TickError> {
        self.log.lock().unwrap().irqs += 1;
        Ok(())
    }

    fn acknowledge(&mut self) -> Result<(), TickError> {
        let mut log = self.log.lock().unwrap();
        if log.fail_ack {
            return Err(TickError::Acknowledge("irq cap revoked".into()));
        }
        log.acks += 1;
        Ok(())
    }
}

impl ReferenceTimer for ManualTick {
    fn busy_wait_ns(&mut self, ns: u64) -> Result<(), CalibrationError> {
        match &self.counter {
            Some((counter, hz)) => {
                counter.advance((ns as u128 * *hz as u128 / NS_PER_SEC as u128) as u64);
                Ok(())
            }
            None => Ok(()),
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct RecordingNotifier(pub Arc<Mutex<Vec<ClientId>>>);

impl RecordingNotifier {
    pub fn take(&self) -> Vec<ClientId> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, client: ClientId) {
        self.0.lock().unwrap().push(client);
    }
}

pub type TestServer = TimeServer<ManualCounter, ManualTick, RecordingNotifier>;

pub struct Harness {
    pub server: TestServer,
    /// Counting at 1 GHz, so one cycle is one nanosecond.
    pub counter: ManualCounter,
    pub tick: ManualTick,
    pub notes: RecordingNotifier,
}

impl Harness {
    pub fn new(client_count: usize, timers_per_client: usize) -> Self {
        let counter = ManualCounter::new();
        let tick = ManualTick::default();
        let notes = RecordingNotifier::default();
        let clock = MonotonicClock::new(counter.clone(), NonZeroU64::new(NS_PER_SEC).unwrap());
        let server = TimeServer::with_clock(
            &TimeServerConfig::new(client_count, timers_per_client),
            clock,
            tick.clone(),
            notes.clone(),
        )
        .unwrap();
        Self {
            server,
            counter,
            tick,
            notes,
        }
    }

    /// Moves the clock to `now_ns` and delivers one tick.
    pub fn tick_at(&self, now_ns: u64) -> usize {
        self.counter.set(now_ns);
        let report = self.server.on_tick().unwrap();
        assert_eq!(report.now_ns, now_ns);
        report.fired
    }
}
