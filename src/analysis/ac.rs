//! AC small-signal frequency-domain analysis.

use std::ops::ControlFlow;

use super::export::{AnalysisStats, ComplexPoint};
use crate::circuit::Circuit;
use crate::config::SimulationConfig;
use crate::error::{NodalError, Result};
use crate::solver::{AnalysisMode, InitMode, Simulation};

/// AC sweep type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AcSweep {
    /// Linear frequency spacing, `points` in total.
    Linear { points: usize, start: f64, stop: f64 },
    /// Logarithmic spacing, points per decade.
    Decade {
        points_per_decade: usize,
        start: f64,
        stop: f64,
    },
    /// Logarithmic spacing, points per octave.
    Octave {
        points_per_octave: usize,
        start: f64,
        stop: f64,
    },
}

impl AcSweep {
    fn validate(&self) -> Result<()> {
        let (points, start, stop, logarithmic) = match *self {
            AcSweep::Linear { points, start, stop } => (points, start, stop, false),
            AcSweep::Decade {
                points_per_decade,
                start,
                stop,
            } => (points_per_decade, start, stop, true),
            AcSweep::Octave {
                points_per_octave,
                start,
                stop,
            } => (points_per_octave, start, stop, true),
        };
        if points == 0 {
            return Err(NodalError::invalid_simulation_param(
                "AC sweep needs at least one point",
            ));
        }
        if !(start.is_finite() && stop.is_finite()) || start < 0.0 || stop < start {
            return Err(NodalError::invalid_simulation_param(format!(
                "AC sweep range {} .. {} is invalid",
                start, stop
            )));
        }
        if logarithmic && start <= 0.0 {
            return Err(NodalError::invalid_simulation_param(
                "logarithmic AC sweeps must start above 0 Hz",
            ));
        }
        Ok(())
    }

    /// Generate frequency points.
    pub fn frequencies(&self) -> Vec<f64> {
        match *self {
            AcSweep::Linear { points, start, stop } => {
                if points <= 1 {
                    return vec![start];
                }
                let step = (stop - start) / (points as f64 - 1.0);
                (0..points).map(|i| start + step * i as f64).collect()
            }
            AcSweep::Decade {
                points_per_decade,
                start,
                stop,
            } => logarithmic(10.0, points_per_decade, start, stop),
            AcSweep::Octave {
                points_per_octave,
                start,
                stop,
            } => logarithmic(2.0, points_per_octave, start, stop),
        }
    }
}

fn logarithmic(base: f64, per_interval: usize, start: f64, stop: f64) -> Vec<f64> {
    if per_interval == 0 || start <= 0.0 {
        return Vec::new();
    }
    let intervals = (stop / start).ln() / base.ln();
    let total_points = (per_interval as f64 * intervals).ceil().max(0.0) as usize + 1;
    (0..total_points)
        .map(|i| start * base.powf(i as f64 / per_interval as f64))
        .filter(|&f| f <= stop * 1.001)
        .collect()
}

/// AC analysis: operating point, then one complex solve per frequency.
#[derive(Debug, Clone)]
pub struct Ac {
    sweep: AcSweep,
    config: SimulationConfig,
}

impl Ac {
    /// Create the analysis for a sweep.
    pub fn new(sweep: AcSweep) -> Self {
        Self {
            sweep,
            config: SimulationConfig::default(),
        }
    }

    /// Use the given simulation configuration.
    pub fn with_config(mut self, config: SimulationConfig) -> Self {
        self.config = config;
        self
    }

    /// Run the sweep, exporting every frequency point.
    pub fn run<F>(&self, circuit: &Circuit, mut export: F) -> Result<AnalysisStats>
    where
        F: FnMut(&ComplexPoint<'_>) -> ControlFlow<()>,
    {
        self.sweep.validate()?;
        let mut sim = Simulation::setup(circuit, self.config.clone())?;
        let result = self.execute(&mut sim, &mut export);
        sim.unsetup();
        result
    }

    fn execute<F>(&self, sim: &mut Simulation, export: &mut F) -> Result<AnalysisStats>
    where
        F: FnMut(&ComplexPoint<'_>) -> ControlFlow<()>,
    {
        sim.temperature()?;
        sim.set_mode(AnalysisMode::Dc);
        sim.reset_solution();
        sim.operating_point("AC operating point", InitMode::Junction)?;
        sim.prepare_frequency()?;

        let mut stats = AnalysisStats::default();
        for frequency in self.sweep.frequencies() {
            sim.solve_frequency(frequency)?;
            stats.points += 1;
            if export(&ComplexPoint::new(sim, frequency)).is_break() {
                stats.cancelled = true;
                break;
            }
        }
        stats.iterations = sim.iterations();
        log::debug!("AC sweep: {} frequency points", stats.points);
        Ok(stats)
    }
}
