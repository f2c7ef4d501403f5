use std::fmt;

/// Index of a client in `[0, client_count)`.
///
/// The transport identifies clients by badge; badge 0 is never handed out, so badge `n` maps
/// to client `n - 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u32);

impl ClientId {
    #[inline]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    #[inline]
    pub const fn index(self) -> u32 {
        self.0
    }

    pub fn from_badge(badge: u64) -> Option<Self> {
        let index = badge.checked_sub(1)?;
        u32::try_from(index).ok().map(Self)
    }

    #[inline]
    pub const fn badge(self) -> u64 {
        self.0 as u64 + 1
    }
}

impl From<u32> for ClientId {
    fn from(index: u32) -> Self {
        Self(index)
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn badge_round_trip() {
        assert_eq!(ClientId::from_badge(0), None);
        assert_eq!(ClientId::from_badge(1), Some(ClientId::new(0)));
        assert_eq!(ClientId::new(6).badge(), 7);
        assert_eq!(ClientId::from_badge(u64::MAX), None);
    }
}
