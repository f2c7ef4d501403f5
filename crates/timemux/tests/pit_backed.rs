//! Full server over a PIT tick source with simulated port I/O.

mod common;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use common::RecordingNotifier;
use timemux::clock::ManualCounter;
use timemux::pit::{
    IrqLine, Pit, PitPortWindow, PitTickSource, PortIo, PortIoError, ReadBackStatus, TickError,
    PIT_CHANNEL0, PIT_COMMAND, PIT_INPUT_HZ,
};
use timemux::{ClientId, TimeServer, TimeServerConfig};

/// Counter rate in this simulation: exactly 1000 counter cycles per PIT input tick.
const COUNTER_HZ: u64 = PIT_INPUT_HZ * 1000;

/// Channel 0 model: a one-shot countdown completes as soon as its status is read back,
/// advancing the cycle counter by the programmed duration.
struct SimulatedPit {
    counter: ManualCounter,
    mode: u8,
    reload_bytes: Vec<u8>,
    pending: Option<u8>,
    commands: Arc<Mutex<Vec<u8>>>,
}

impl SimulatedPit {
    fn new(counter: ManualCounter) -> Self {
        Self {
            counter,
            mode: 0,
            reload_bytes: Vec::new(),
            pending: None,
            commands: Arc::default(),
        }
    }

    fn reload(&self) -> u64 {
        match self.reload_bytes[..] {
            [lo, hi] => match u16::from_le_bytes([lo, hi]) {
                0 => 65_536,
                n => n as u64,
            },
            _ => 0,
        }
    }
}

impl PortIo for SimulatedPit {
    fn port_in(&mut self, port: u16, _width: usize) -> Result<u32, PortIoError> {
        assert_eq!(port, PIT_CHANNEL0);
        self.pending
            .take()
            .map(u32::from)
            .ok_or_else(|| PortIoError::Backend("nothing latched".into()))
    }

    fn port_out(&mut self, port: u16, _width: usize, value: u32) -> Result<(), PortIoError> {
        let value = value as u8;
        match port {
            PIT_COMMAND if value >> 6 == 0b11 => {
                if self.mode == 0 {
                    self.counter.advance(self.reload() * (COUNTER_HZ / PIT_INPUT_HZ));
                }
                self.pending = Some(ReadBackStatus::OUTPUT.bits());
            }
            // Counter latch; the count itself is not modelled.
            PIT_COMMAND if value & 0x30 == 0 => self.pending = Some(0),
            PIT_COMMAND => {
                self.commands.lock().unwrap().push(value);
                self.mode = (value >> 1) & 0b111;
                self.reload_bytes.clear();
            }
            PIT_CHANNEL0 => self.reload_bytes.push(value),
            _ => unreachable!("port window lets through only the PIT ports"),
        }
        Ok(())
    }
}

#[derive(Clone, Default)]
struct CountingIrq(Arc<AtomicU32>);

impl IrqLine for CountingIrq {
    fn acknowledge(&mut self) -> Result<(), TickError> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[test]
fn calibrates_then_dispatches_from_pit_ticks() {
    let counter = ManualCounter::new();
    let irq = CountingIrq::default();
    let tick = PitTickSource::new(
        Pit::new(PitPortWindow::new(SimulatedPit::new(counter.clone()))),
        irq.clone(),
    );
    let notes = RecordingNotifier::default();

    let server = TimeServer::start(
        &TimeServerConfig::new(1, 2),
        counter.clone(),
        tick,
        notes.clone(),
    )
    .unwrap();

    // 10 ms rounds up to a whole number of PIT input ticks, so the estimate runs slightly high.
    let freq = server.counter_frequency_hz();
    assert!(freq >= COUNTER_HZ && freq - COUNTER_HZ < COUNTER_HZ / 1000, "{freq}");

    server.inspect(|state| assert_eq!(state.armed_count(), 0));
    assert_eq!(irq.0.load(Ordering::SeqCst), 1);

    let c0 = ClientId::new(0);
    server.schedule_relative(c0, 1, 3_000_000).unwrap();
    let mut fired = 0;
    for _ in 0..4 {
        counter.advance(freq / 500);
        fired += server.on_tick().unwrap().fired;
    }
    assert_eq!(fired, 1);
    assert_eq!(notes.take(), vec![c0]);
    assert_eq!(server.poll_completed(c0).unwrap(), 0b10);
    assert_eq!(irq.0.load(Ordering::SeqCst), 5);
}

#[test]
fn pit_runs_as_rate_generator_after_start() {
    let counter = ManualCounter::new();
    let ports = SimulatedPit::new(counter.clone());
    let commands = Arc::clone(&ports.commands);
    let tick = PitTickSource::new(Pit::new(ports), CountingIrq::default());
    let server = TimeServer::start(
        &TimeServerConfig::new(1, 1).with_tick_hz(1000),
        counter,
        tick,
        RecordingNotifier::default(),
    )
    .unwrap();
    assert_eq!(server.tick_period_ns(), 1_000_000);

    // One one-shot countdown for calibration, then the rate generator.
    assert_eq!(*commands.lock().unwrap(), vec![0x30, 0x34]);
}
