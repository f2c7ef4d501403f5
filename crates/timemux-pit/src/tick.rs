use thiserror::Error;
use timemux_clock::{CalibrationError, ReferenceTimer};

use crate::pit::Pit;
use crate::ports::{PortIo, PortIoError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TickError {
    #[error(transparent)]
    Port(#[from] PortIoError),

    #[error("tick period must be non-zero")]
    ZeroPeriod,

    #[error("interrupt acknowledge failed: {0}")]
    Acknowledge(String),

    #[error("tick hardware unavailable: {0}")]
    Unavailable(String),
}

/// The fixed-rate interrupt source that drives dispatch.
pub trait TickSource: Send {
    fn start(&mut self) -> Result<(), TickError>;

    fn set_period_ns(&mut self, period_ns: u64) -> Result<(), TickError>;

    /// Device-side handling of a delivered tick, before the interrupt is acknowledged.
    fn handle_irq(&mut self) -> Result<(), TickError> {
        Ok(())
    }

    fn acknowledge(&mut self) -> Result<(), TickError>;
}

/// The interrupt line (or capability) a tick source is delivered on.
pub trait IrqLine: Send {
    fn acknowledge(&mut self) -> Result<(), TickError>;
}

/// [`TickSource`] backed by PIT channel 0 in rate generator mode.
#[derive(Debug)]
pub struct PitTickSource<P, L> {
    pit: Pit<P>,
    irq: L,
    period_ns: Option<u64>,
    running: bool,
    irqs_handled: u64,
}

impl<P: PortIo, L: IrqLine> PitTickSource<P, L> {
    pub fn new(pit: Pit<P>, irq: L) -> Self {
        Self {
            pit,
            irq,
            period_ns: None,
            running: false,
            irqs_handled: 0,
        }
    }

    pub fn pit(&self) -> &Pit<P> {
        &self.pit
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn irqs_handled(&self) -> u64 {
        self.irqs_handled
    }

    fn reprogram(&mut self) -> Result<(), TickError> {
        if let (true, Some(period_ns)) = (self.running, self.period_ns) {
            let actual_ns = self.pit.program_periodic_ns(period_ns)?;
            tracing::debug!(period_ns, actual_ns, "PIT periodic tick programmed");
        }
        Ok(())
    }
}

impl<P: PortIo, L: IrqLine> TickSource for PitTickSource<P, L> {
    fn start(&mut self) -> Result<(), TickError> {
        self.running = true;
        self.reprogram()
    }

    fn set_period_ns(&mut self, period_ns: u64) -> Result<(), TickError> {
        if period_ns == 0 {
            return Err(TickError::ZeroPeriod);
        }
        self.period_ns = Some(period_ns);
        self.reprogram()
    }

    fn handle_irq(&mut self) -> Result<(), TickError> {
        // Rate generator mode reloads by itself; nothing to rearm.
        self.irqs_handled += 1;
        Ok(())
    }

    fn acknowledge(&mut self) -> Result<(), TickError> {
        self.irq.acknowledge()
    }
}

impl<P: PortIo, L: IrqLine> ReferenceTimer for PitTickSource<P, L> {
    fn busy_wait_ns(&mut self, ns: u64) -> Result<(), CalibrationError> {
        if self.running {
            return Err(CalibrationError::Reference(
                "PIT is already generating ticks".into(),
            ));
        }
        self.pit.busy_wait_ns(ns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pit::tests::FakePitPorts;
    use crate::pit::PitMode;
    use crate::ports::{PIT_CHANNEL0, PIT_COMMAND};

    #[derive(Default)]
    struct CountingIrq {
        acks: u32,
        fail: bool,
    }

    impl IrqLine for CountingIrq {
        fn acknowledge(&mut self) -> Result<(), TickError> {
            if self.fail {
                return Err(TickError::Acknowledge("irq handler revoked".into()));
            }
            self.acks += 1;
            Ok(())
        }
    }

    fn source() -> PitTickSource<FakePitPorts, CountingIrq> {
        PitTickSource::new(Pit::new(FakePitPorts::default()), CountingIrq::default())
    }

    #[test]
    fn period_is_programmed_once_running() {
        let mut tick = source();
        tick.start().unwrap();
        assert!(tick.pit().io().writes.is_empty());

        tick.set_period_ns(2_000_000).unwrap();
        assert_eq!(tick.pit().mode(), Some(PitMode::RateGenerator));
        assert_eq!(tick.pit().reload(), 2386);
        assert_eq!(
            tick.pit().io().writes,
            vec![(PIT_COMMAND, 0x34), (PIT_CHANNEL0, 0x52), (PIT_CHANNEL0, 0x09)]
        );
    }

    #[test]
    fn period_set_before_start_is_applied_on_start() {
        let mut tick = source();
        tick.set_period_ns(10_000_000).unwrap();
        assert!(tick.pit().mode().is_none());
        tick.start().unwrap();
        assert_eq!(tick.pit().mode(), Some(PitMode::RateGenerator));
    }

    #[test]
    fn zero_period_is_rejected() {
        let mut tick = source();
        assert_eq!(tick.set_period_ns(0), Err(TickError::ZeroPeriod));
    }

    #[test]
    fn irq_handling_and_acknowledge() {
        let mut tick = source();
        tick.handle_irq().unwrap();
        tick.acknowledge().unwrap();
        tick.acknowledge().unwrap();
        assert_eq!(tick.irqs_handled(), 1);
        assert_eq!(tick.irq.acks, 2);

        tick.irq.fail = true;
        assert!(matches!(tick.acknowledge(), Err(TickError::Acknowledge(_))));
    }

    #[test]
    fn calibration_is_refused_while_ticking() {
        let mut tick = source();
        tick.start().unwrap();
        assert!(tick.busy_wait_ns(1_000).is_err());
    }
}
