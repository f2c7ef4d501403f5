use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use timemux::clock::{CalibrationError, ReferenceTimer};
use timemux::pit::{TickError, TickSource};

use crate::reference::SleepReference;

#[derive(Debug, Default)]
struct Shared {
    period_ns: AtomicU64,
    /// Set when a tick is delivered, cleared by acknowledge. Ticks raised while set are
    /// coalesced, like a level-triggered interrupt line.
    pending: AtomicBool,
    stop: AtomicBool,
    delivered: AtomicU64,
    coalesced: AtomicU64,
}

/// [`TickSource`] driven by a background thread.
///
/// Each tick is a message on the paired [`TickReceiver`]. The thread is spawned once the
/// source is both started and has a period, and is stopped and joined on drop.
#[derive(Debug)]
pub struct ThreadTicker {
    shared: Arc<Shared>,
    tx: Option<SyncSender<()>>,
    thread: Option<JoinHandle<()>>,
    running: bool,
    reference: SleepReference,
}

/// Receiving end of a [`ThreadTicker`].
#[derive(Debug)]
pub struct TickReceiver {
    rx: Receiver<()>,
}

impl TickReceiver {
    /// Waits for the next tick. `Disconnected` means the ticker has gone away.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<(), RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

impl ThreadTicker {
    pub fn new() -> (Self, TickReceiver) {
        let (tx, rx) = mpsc::sync_channel(1);
        let ticker = Self {
            shared: Arc::default(),
            tx: Some(tx),
            thread: None,
            running: false,
            reference: SleepReference,
        };
        (ticker, TickReceiver { rx })
    }

    pub fn is_running(&self) -> bool {
        self.thread.is_some()
    }

    pub fn ticks_delivered(&self) -> u64 {
        self.shared.delivered.load(Ordering::Relaxed)
    }

    /// Ticks dropped because the previous one had not been acknowledged yet.
    pub fn ticks_coalesced(&self) -> u64 {
        self.shared.coalesced.load(Ordering::Relaxed)
    }

    fn spawn_if_ready(&mut self) -> Result<(), TickError> {
        if !self.running || self.thread.is_some() {
            return Ok(());
        }
        if self.shared.period_ns.load(Ordering::Acquire) == 0 {
            return Ok(());
        }
        let Some(tx) = self.tx.take() else {
            return Err(TickError::Unavailable("tick channel already consumed".into()));
        };
        let shared = Arc::clone(&self.shared);
        let thread = thread::Builder::new()
            .name("timemux-tick".into())
            .spawn(move || run_ticker(&shared, &tx))
            .map_err(|err| TickError::Unavailable(format!("failed to spawn tick thread: {err}")))?;
        self.thread = Some(thread);
        Ok(())
    }
}

fn run_ticker(shared: &Shared, tx: &SyncSender<()>) {
    let mut next = Instant::now();
    while !shared.stop.load(Ordering::Acquire) {
        let period = Duration::from_nanos(shared.period_ns.load(Ordering::Acquire));
        next += period;
        let now = Instant::now();
        if next > now {
            thread::sleep(next - now);
        } else {
            // Fell behind by more than a period; resynchronize instead of bursting.
            next = now;
        }

        if shared.pending.swap(true, Ordering::AcqRel) {
            shared.coalesced.fetch_add(1, Ordering::Relaxed);
            continue;
        }
        if tx.send(()).is_err() {
            tracing::debug!("tick receiver dropped, stopping tick thread");
            return;
        }
        shared.delivered.fetch_add(1, Ordering::Relaxed);
    }
}

impl TickSource for ThreadTicker {
    fn start(&mut self) -> Result<(), TickError> {
        self.running = true;
        self.spawn_if_ready()
    }

    fn set_period_ns(&mut self, period_ns: u64) -> Result<(), TickError> {
        if period_ns == 0 {
            return Err(TickError::ZeroPeriod);
        }
        self.shared.period_ns.store(period_ns, Ordering::Release);
        self.spawn_if_ready()
    }

    fn acknowledge(&mut self) -> Result<(), TickError> {
        self.shared.pending.store(false, Ordering::Release);
        Ok(())
    }
}

impl ReferenceTimer for ThreadTicker {
    fn busy_wait_ns(&mut self, ns: u64) -> Result<(), CalibrationError> {
        if self.is_running() {
            return Err(CalibrationError::Reference(
                "tick thread is already running".into(),
            ));
        }
        self.reference.busy_wait_ns(ns)
    }
}

impl Drop for ThreadTicker {
    fn drop(&mut self) {
        self.shared.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("tick thread panicked");
            }
        }
    }
}
