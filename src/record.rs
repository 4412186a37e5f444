//! Interaction time records that drive the buffer's notion of "now".

use serde::{Deserialize, Serialize};

/// Nominal spacing between bunch crossings, in ns.
pub const BUNCH_SPACING_NS: u64 = 25;

/// Number of bunch-crossing slots in one orbit.
pub const BUNCHES_PER_ORBIT: u64 = 3564;

/// Anything carrying an absolute event time in the buffer's time units.
pub trait TimeRecord: Clone {
    /// Absolute time of the record in ns.
    fn time_ns(&self) -> u64;
}

/// Collision record: orbit and bunch crossing plus the absolute time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionRecord {
    /// Orbit counter.
    pub orbit: u32,
    /// Bunch crossing within the orbit.
    pub bc: u16,
    /// Absolute time in ns.
    pub time_ns: u64,
}

impl InteractionRecord {
    /// Derive orbit and bunch crossing from an absolute time.
    #[must_use]
    pub fn from_time_ns(time_ns: u64) -> Self {
        let crossing = time_ns / BUNCH_SPACING_NS;
        Self {
            orbit: u32::try_from(crossing / BUNCHES_PER_ORBIT).unwrap_or(u32::MAX),
            // Always below BUNCHES_PER_ORBIT.
            bc: (crossing % BUNCHES_PER_ORBIT) as u16,
            time_ns,
        }
    }
}

impl TimeRecord for InteractionRecord {
    fn time_ns(&self) -> u64 {
        self.time_ns
    }
}

impl TimeRecord for u64 {
    fn time_ns(&self) -> u64 {
        *self
    }
}
