use thiserror::Error;

pub const PIT_CHANNEL0: u16 = 0x40;
pub const PIT_COMMAND: u16 = 0x43;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PortIoError {
    #[error("port {port:#x} is not accessible")]
    UnsupportedPort { port: u16 },

    #[error("unsupported {width}-byte access to port {port:#x}")]
    UnsupportedWidth { port: u16, width: usize },

    #[error("port backend failed: {0}")]
    Backend(String),
}

/// Raw I/O port access. `width` is the access size in bytes.
pub trait PortIo: Send {
    fn port_in(&mut self, port: u16, width: usize) -> Result<u32, PortIoError>;
    fn port_out(&mut self, port: u16, width: usize, value: u32) -> Result<(), PortIoError>;
}

/// Restricts a port backend to the PIT channel 0 data port and the command port, with
/// single-byte accesses only.
#[derive(Debug)]
pub struct PitPortWindow<B> {
    backend: B,
}

impl<B: PortIo> PitPortWindow<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn into_inner(self) -> B {
        self.backend
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn check(port: u16, width: usize) -> Result<(), PortIoError> {
        if port != PIT_CHANNEL0 && port != PIT_COMMAND {
            return Err(PortIoError::UnsupportedPort { port });
        }
        if width != 1 {
            return Err(PortIoError::UnsupportedWidth { port, width });
        }
        Ok(())
    }
}

impl<B: PortIo> PortIo for PitPortWindow<B> {
    fn port_in(&mut self, port: u16, width: usize) -> Result<u32, PortIoError> {
        Self::check(port, width)?;
        self.backend.port_in(port, width)
    }

    fn port_out(&mut self, port: u16, width: usize, value: u32) -> Result<(), PortIoError> {
        Self::check(port, width)?;
        self.backend.port_out(port, width, value & 0xff)
    }
}
