//! DC sweep of an independent source.

use std::ops::ControlFlow;

use super::export::{AnalysisStats, RealPoint};
use crate::circuit::Circuit;
use crate::config::SimulationConfig;
use crate::error::{NodalError, Result};
use crate::solver::{AnalysisMode, InitMode, Simulation};

/// DC sweep parameters.
#[derive(Debug, Clone)]
pub struct DcSweep {
    /// Name of the source to sweep.
    pub source: String,
    /// Start value.
    pub start: f64,
    /// Stop value.
    pub stop: f64,
    /// Step size; negative for a descending sweep.
    pub step: f64,
    /// Skip points that fail to converge instead of aborting.
    pub skip_failed: bool,
    config: SimulationConfig,
}

impl DcSweep {
    /// Sweep `source` from `start` to `stop` in increments of `step`.
    pub fn new(source: impl Into<String>, start: f64, stop: f64, step: f64) -> Self {
        Self {
            source: source.into(),
            start,
            stop,
            step,
            skip_failed: false,
            config: SimulationConfig::default(),
        }
    }

    /// Use the given simulation configuration.
    pub fn with_config(mut self, config: SimulationConfig) -> Self {
        self.config = config;
        self
    }

    /// Skip points that fail to converge.
    pub fn with_skip_failed(mut self, skip: bool) -> Self {
        self.skip_failed = skip;
        self
    }

    /// Sweep values, start and stop included.
    pub fn values(&self) -> Result<Vec<f64>> {
        let span = self.stop - self.start;
        if !(self.step.is_finite() && self.step != 0.0) || !span.is_finite() {
            return Err(NodalError::invalid_simulation_param(format!(
                "DC sweep step must be finite and nonzero, got {}",
                self.step
            )));
        }
        let intervals = span / self.step;
        if intervals < -1e-9 {
            return Err(NodalError::invalid_simulation_param(format!(
                "DC sweep step {} does not move from {} toward {}",
                self.step, self.start, self.stop
            )));
        }
        let count = (intervals + 1e-9).floor() as usize + 1;
        Ok((0..count)
            .map(|k| self.start + k as f64 * self.step)
            .collect())
    }

    /// Run the sweep, exporting every converged point.
    pub fn run<F>(&self, circuit: &Circuit, mut export: F) -> Result<AnalysisStats>
    where
        F: FnMut(&RealPoint<'_>) -> ControlFlow<()>,
    {
        let values = self.values()?;
        let mut sim = Simulation::setup(circuit, self.config.clone())?;
        let result = self.execute(&mut sim, &values, &mut export);
        sim.unsetup();
        result
    }

    fn execute<F>(
        &self,
        sim: &mut Simulation,
        values: &[f64],
        export: &mut F,
    ) -> Result<AnalysisStats>
    where
        F: FnMut(&RealPoint<'_>) -> ControlFlow<()>,
    {
        sim.temperature()?;
        sim.set_mode(AnalysisMode::Dc);
        sim.reset_solution();

        let mut stats = AnalysisStats::default();
        let mut init = InitMode::Junction;
        for &value in values {
            sim.set_dc_value(&self.source, value)?;
            let point = format!("{} = {}", self.source, value);
            match sim.operating_point(&point, init) {
                Ok(_) => init = InitMode::Float,
                Err(err) if self.skip_failed && err.is_point_failure() => {
                    log::warn!("skipping sweep point: {}", err);
                    stats.skipped += 1;
                    sim.reset_solution();
                    init = InitMode::Junction;
                    continue;
                }
                Err(err) => return Err(err),
            }

            stats.points += 1;
            if export(&RealPoint::new(sim, None, Some(value))).is_break() {
                stats.cancelled = true;
                break;
            }
        }

        stats.iterations = sim.iterations();
        log::debug!(
            "DC sweep of {}: {} points, {} skipped, {} iterations",
            self.source,
            stats.points,
            stats.skipped,
            stats.iterations
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Resistor, VoltageSource};
    use approx::assert_relative_eq;

    #[test]
    fn test_sweep_values_include_stop() {
        let sweep = DcSweep::new("V1", -1.0, 1.0, 0.01);
        let values = sweep.values().unwrap();
        assert_eq!(values.len(), 201);
        assert_relative_eq!(*values.last().unwrap(), 1.0, epsilon = 1e-12);

        let descending = DcSweep::new("V1", 1.0, 0.0, -0.25).values().unwrap();
        assert_eq!(descending, vec![1.0, 0.75, 0.5, 0.25, 0.0]);
    }

    #[test]
    fn test_wrong_direction_rejected() {
        assert!(matches!(
            DcSweep::new("V1", 0.0, 1.0, -0.1).values(),
            Err(NodalError::InvalidSimulationParam { .. })
        ));
        assert!(DcSweep::new("V1", 0.0, 1.0, 0.0).values().is_err());
    }

    #[test]
    fn test_cancel_stops_sweep() {
        let mut circuit = Circuit::new();
        circuit.add(VoltageSource::new("V1", "a", "0", 0.0)).unwrap();
        circuit.add(Resistor::new("R1", "a", "0", 1e3)).unwrap();

        let mut seen = Vec::new();
        let stats = DcSweep::new("V1", 0.0, 5.0, 1.0)
            .run(&circuit, |point| {
                seen.push(point.voltage("a").unwrap());
                if seen.len() == 3 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            })
            .unwrap();

        assert!(stats.cancelled);
        assert_eq!(stats.points, 3);
        assert_relative_eq!(seen[2], 2.0, epsilon = 1e-9);
    }
}
