//! Core types for circuit representation.

use std::fmt;

/// Index of an unknown in the MNA solution vector.
/// Unknown 0 is always ground and never appears in the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Unknown(pub usize);

impl Unknown {
    /// The ground node (always index 0).
    pub const GROUND: Unknown = Unknown(0);

    /// Check if this is the ground node.
    pub fn is_ground(&self) -> bool {
        self.0 == 0
    }

    /// Raw index into the solution vector.
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for Unknown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ground() {
            write!(f, "GND")
        } else {
            write!(f, "X{}", self.0)
        }
    }
}

/// What an unknown measures.
/// Voltages and currents use different absolute convergence tolerances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnknownKind {
    /// Node voltage (external or internal node)
    Voltage,
    /// Branch current (voltage sources, inductors, VCVS)
    Current,
}
