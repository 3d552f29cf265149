//! DC operating point.

use std::ops::ControlFlow;

use super::export::{AnalysisStats, RealPoint};
use crate::circuit::Circuit;
use crate::config::SimulationConfig;
use crate::error::Result;
use crate::solver::{AnalysisMode, InitMode, Simulation};

/// Operating point analysis: one DC solve, one export.
#[derive(Debug, Clone, Default)]
pub struct OperatingPoint {
    config: SimulationConfig,
}

impl OperatingPoint {
    /// Create the analysis with the given configuration.
    pub fn new(config: SimulationConfig) -> Self {
        Self { config }
    }

    /// Solve and call `export` with the result.
    pub fn run<F>(&self, circuit: &Circuit, mut export: F) -> Result<AnalysisStats>
    where
        F: FnMut(&RealPoint<'_>) -> ControlFlow<()>,
    {
        let mut sim = Simulation::setup(circuit, self.config.clone())?;
        let result = Self::execute(&mut sim, &mut export);
        sim.unsetup();
        result
    }

    fn execute<F>(sim: &mut Simulation, export: &mut F) -> Result<AnalysisStats>
    where
        F: FnMut(&RealPoint<'_>) -> ControlFlow<()>,
    {
        sim.temperature()?;
        sim.set_mode(AnalysisMode::Dc);
        sim.reset_solution();
        sim.operating_point("operating point", InitMode::Junction)?;

        let mut stats = AnalysisStats {
            points: 1,
            ..AnalysisStats::default()
        };
        stats.cancelled = export(&RealPoint::new(sim, None, None)).is_break();
        stats.iterations = sim.iterations();
        Ok(stats)
    }
}
