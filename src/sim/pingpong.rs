//! Source/destination role tracking for the two field buffers.

/// One of the two fixed buffer slots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Front,
    Back,
}

impl Slot {
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Slot::Front => 0,
            Slot::Back => 1,
        }
    }

    #[inline]
    pub fn other(self) -> Slot {
        match self {
            Slot::Front => Slot::Back,
            Slot::Back => Slot::Front,
        }
    }
}

/// Two-state machine: which slot is read by the next dispatch.
/// The destination is always the other slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingPong {
    source: Slot,
    dispatches: u64,
}

impl PingPong {
    /// Start with the front buffer as source
    pub fn new() -> Self {
        Self {
            source: Slot::Front,
            dispatches: 0,
        }
    }

    #[inline]
    pub fn source(&self) -> Slot {
        self.source
    }

    #[cfg(test)]
    pub fn destination(&self) -> Slot {
        self.source.other()
    }

    /// Slot holding the most recent state: the source of the next dispatch
    #[inline]
    pub fn latest(&self) -> Slot {
        self.source
    }

    /// Dispatches completed since creation or the last reset
    pub fn dispatches(&self) -> u64 {
        self.dispatches
    }

    /// Record a finished dispatch; the written buffer becomes the source
    #[inline]
    pub fn advance(&mut self) {
        self.source = self.source.other();
        self.dispatches += 1;
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for PingPong {
    fn default() -> Self {
        Self::new()
    }
}
