//! 8254 programmable interval timer, channel 0.

use bitflags::bitflags;
use timemux_clock::{CalibrationError, ReferenceTimer, NS_PER_SEC};

use crate::ports::{PortIo, PortIoError, PIT_CHANNEL0, PIT_COMMAND};

pub const PIT_INPUT_HZ: u64 = 1_193_182;

/// A reload value of 0 is interpreted by the hardware as 65536.
pub const PIT_MAX_RELOAD: u64 = 65_536;

const ACCESS_LOBYTE_HIBYTE: u8 = 0b11 << 4;
const CMD_LATCH_CHANNEL0: u8 = 0x00;
const CMD_READ_BACK: u8 = 0b11 << 6;
// Read-back bits are active low: bit 5 clear latches the count, bit 4 clear latches status.
const READ_BACK_NO_COUNT: u8 = 1 << 5;
const READ_BACK_CHANNEL0: u8 = 1 << 1;

const DEFAULT_MAX_STATUS_POLLS: u32 = 10_000_000;

bitflags! {
    /// Channel status byte returned by the read-back command.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ReadBackStatus: u8 {
        const OUTPUT = 1 << 7;
        const NULL_COUNT = 1 << 6;
        const ACCESS_HIGH = 1 << 5;
        const ACCESS_LOW = 1 << 4;
        const MODE = 0b111 << 1;
        const BCD = 1 << 0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PitMode {
    InterruptOnTerminalCount = 0,
    RateGenerator = 2,
    SquareWaveGenerator = 3,
}

#[derive(Debug)]
pub struct Pit<P> {
    io: P,
    mode: Option<PitMode>,
    reload: u64,
    max_status_polls: u32,
}

impl<P: PortIo> Pit<P> {
    pub fn new(io: P) -> Self {
        Self {
            io,
            mode: None,
            reload: 0,
            max_status_polls: DEFAULT_MAX_STATUS_POLLS,
        }
    }

    /// Bounds how long [`ReferenceTimer::busy_wait_ns`] spins on the output pin per chunk.
    pub fn with_max_status_polls(mut self, polls: u32) -> Self {
        self.max_status_polls = polls.max(1);
        self
    }

    pub fn io(&self) -> &P {
        &self.io
    }

    pub fn mode(&self) -> Option<PitMode> {
        self.mode
    }

    /// Last programmed reload value, in PIT input ticks.
    pub fn reload(&self) -> u64 {
        self.reload
    }

    pub fn ticks_from_ns_ceil(ns: u64) -> u64 {
        let numer = (ns as u128) * (PIT_INPUT_HZ as u128);
        let denom = NS_PER_SEC as u128;
        u64::try_from((numer + denom - 1) / denom).unwrap_or(u64::MAX)
    }

    pub fn ns_from_ticks(ticks: u64) -> u64 {
        ((ticks as u128) * (NS_PER_SEC as u128) / (PIT_INPUT_HZ as u128)) as u64
    }

    /// Reload value closest to `period_ns`, clamped to what the counter can hold.
    pub fn reload_for_period_ns(period_ns: u64) -> u64 {
        let numer = (period_ns as u128) * (PIT_INPUT_HZ as u128);
        let denom = NS_PER_SEC as u128;
        let nearest = (numer + denom / 2) / denom;
        (nearest.min(PIT_MAX_RELOAD as u128) as u64).max(1)
    }

    /// Writes a mode command followed by the 16-bit reload value.
    pub fn program(&mut self, mode: PitMode, reload: u64) -> Result<(), PortIoError> {
        let reload = reload.clamp(1, PIT_MAX_RELOAD);
        let encoded = if reload == PIT_MAX_RELOAD {
            0u16
        } else {
            reload as u16
        };
        let [lo, hi] = encoded.to_le_bytes();

        self.io
            .port_out(PIT_COMMAND, 1, (ACCESS_LOBYTE_HIBYTE | ((mode as u8) << 1)) as u32)?;
        self.io.port_out(PIT_CHANNEL0, 1, lo as u32)?;
        self.io.port_out(PIT_CHANNEL0, 1, hi as u32)?;

        self.mode = Some(mode);
        self.reload = reload;
        Ok(())
    }

    /// Programs a periodic rate and returns the period actually achieved, in nanoseconds.
    pub fn program_periodic_ns(&mut self, period_ns: u64) -> Result<u64, PortIoError> {
        let reload = Self::reload_for_period_ns(period_ns);
        self.program(PitMode::RateGenerator, reload)?;
        Ok(Self::ns_from_ticks(reload))
    }

    /// Latches and reads the current channel 0 count.
    pub fn read_count(&mut self) -> Result<u16, PortIoError> {
        self.io.port_out(PIT_COMMAND, 1, CMD_LATCH_CHANNEL0 as u32)?;
        let lo = self.io.port_in(PIT_CHANNEL0, 1)? as u8;
        let hi = self.io.port_in(PIT_CHANNEL0, 1)? as u8;
        Ok(u16::from_le_bytes([lo, hi]))
    }

    pub fn read_status(&mut self) -> Result<ReadBackStatus, PortIoError> {
        self.io.port_out(
            PIT_COMMAND,
            1,
            (CMD_READ_BACK | READ_BACK_NO_COUNT | READ_BACK_CHANNEL0) as u32,
        )?;
        let raw = self.io.port_in(PIT_CHANNEL0, 1)? as u8;
        Ok(ReadBackStatus::from_bits_retain(raw))
    }

    fn wait_for_output(&mut self) -> Result<(), CalibrationError> {
        for _ in 0..self.max_status_polls {
            let status = self.read_status().map_err(reference_error)?;
            if status.contains(ReadBackStatus::OUTPUT) && !status.contains(ReadBackStatus::NULL_COUNT)
            {
                return Ok(());
            }
            std::hint::spin_loop();
        }
        Err(CalibrationError::Reference(
            "PIT output never reached terminal count".into(),
        ))
    }
}

fn reference_error(err: PortIoError) -> CalibrationError {
    CalibrationError::Reference(err.to_string())
}

impl<P: PortIo> ReferenceTimer for Pit<P> {
    /// Counts `ns` down in one-shot chunks of at most one full reload each.
    fn busy_wait_ns(&mut self, ns: u64) -> Result<(), CalibrationError> {
        let mut remaining = Self::ticks_from_ns_ceil(ns);
        while remaining > 0 {
            let chunk = remaining.min(PIT_MAX_RELOAD - 1);
            self.program(PitMode::InterruptOnTerminalCount, chunk)
                .map_err(reference_error)?;
            self.wait_for_output()?;
            remaining -= chunk;
        }
        Ok(())
    }
}
