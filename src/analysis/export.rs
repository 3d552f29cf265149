//! Views handed to export callbacks.

use num_complex::Complex64;

use crate::error::Result;
use crate::solver::Simulation;

/// Counters reported by every analysis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnalysisStats {
    /// Export points delivered.
    pub points: usize,
    /// Sweep points skipped after failing to converge.
    pub skipped: usize,
    /// Accepted transient steps.
    pub accepted: usize,
    /// Rejected transient steps (truncation error or convergence).
    pub rejected: usize,
    /// Newton iterations over the whole run.
    pub iterations: usize,
    /// Whether the export callback stopped the run early.
    pub cancelled: bool,
}

/// A completed real solve point.
pub struct RealPoint<'a> {
    sim: &'a Simulation,
    time: Option<f64>,
    sweep: Option<f64>,
}

impl<'a> RealPoint<'a> {
    pub(crate) fn new(sim: &'a Simulation, time: Option<f64>, sweep: Option<f64>) -> Self {
        Self { sim, time, sweep }
    }

    /// Simulated time, for transient points.
    pub fn time(&self) -> Option<f64> {
        self.time
    }

    /// Swept source value, for DC sweep points.
    pub fn sweep_value(&self) -> Option<f64> {
        self.sweep
    }

    /// Raw solution indexed by unknown (slot 0 is ground).
    pub fn solution(&self) -> &[f64] {
        &self.sim.state().solution
    }

    /// Voltage of a node.
    pub fn voltage(&self, node: &str) -> Result<f64> {
        self.sim.voltage(node)
    }

    /// Voltage between two nodes.
    pub fn voltage_between(&self, pos: &str, neg: &str) -> Result<f64> {
        Ok(self.sim.voltage(pos)? - self.sim.voltage(neg)?)
    }

    /// Named property of an entity, e.g. `("R1", "i")`.
    pub fn property(&self, entity: &str, property: &str) -> Result<f64> {
        self.sim.property(entity, property)
    }

    /// The bound simulation, for lookups not covered above.
    pub fn simulation(&self) -> &Simulation {
        self.sim
    }
}

/// A completed frequency point.
pub struct ComplexPoint<'a> {
    sim: &'a Simulation,
    frequency: f64,
}

impl<'a> ComplexPoint<'a> {
    pub(crate) fn new(sim: &'a Simulation, frequency: f64) -> Self {
        Self { sim, frequency }
    }

    /// Frequency in hertz.
    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    /// Raw phasor solution indexed by unknown.
    pub fn solution(&self) -> &[Complex64] {
        self.sim.frequency_solution().unwrap_or(&[])
    }

    /// Phasor voltage of a node.
    pub fn voltage(&self, node: &str) -> Result<Complex64> {
        self.sim.frequency_voltage(node)
    }

    /// Phasor voltage between two nodes.
    pub fn voltage_between(&self, pos: &str, neg: &str) -> Result<Complex64> {
        Ok(self.sim.frequency_voltage(pos)? - self.sim.frequency_voltage(neg)?)
    }

    /// Named complex property of an entity.
    pub fn property(&self, entity: &str, property: &str) -> Result<Complex64> {
        self.sim.frequency_property(entity, property)
    }
}
