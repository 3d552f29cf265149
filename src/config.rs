//! Simulation configuration.

use std::collections::HashMap;

use crate::error::{NodalError, Result};
use crate::solver::IntegrationMethod;
use crate::REFERENCE_TEMPERATURE;

/// Configuration shared by every analysis.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Relative convergence tolerance.
    pub reltol: f64,
    /// Absolute current tolerance (amperes).
    pub abstol: f64,
    /// Absolute voltage tolerance (volts).
    pub vntol: f64,
    /// Absolute charge tolerance (coulombs), used by truncation error control.
    pub chgtol: f64,
    /// Minimum conductance added across junctions and, during gmin stepping,
    /// from every node to ground.
    pub gmin: f64,
    /// Newton iteration budget for operating points.
    pub dc_max_iterations: usize,
    /// Newton iteration budget per transient timepoint.
    pub tran_max_iterations: usize,
    /// Number of decades gmin stepping starts above `gmin`. Zero disables it.
    pub gmin_steps: usize,
    /// Number of source stepping increments. Zero disables it.
    pub source_steps: usize,
    /// Smallest pivot magnitude accepted by factorization.
    pub pivot_abs_tol: f64,
    /// Smallest fraction of the column maximum accepted as a pivot.
    pub pivot_rel_tol: f64,
    /// Circuit temperature (kelvin).
    pub temperature: f64,
    /// Temperature at which model parameters were measured (kelvin).
    pub nominal_temperature: f64,
    /// Initial guesses for node voltages, by node name.
    pub initial_conditions: HashMap<String, f64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            reltol: 1e-3,
            abstol: 1e-12,
            vntol: 1e-6,
            chgtol: 1e-14,
            gmin: 1e-12,
            dc_max_iterations: 100,
            tran_max_iterations: 10,
            gmin_steps: 10,
            source_steps: 10,
            pivot_abs_tol: 1e-13,
            pivot_rel_tol: 1e-3,
            temperature: REFERENCE_TEMPERATURE,
            nominal_temperature: REFERENCE_TEMPERATURE,
            initial_conditions: HashMap::new(),
        }
    }
}

impl SimulationConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the relative tolerance.
    pub fn with_reltol(mut self, reltol: f64) -> Self {
        self.reltol = reltol;
        self
    }

    /// Set the absolute current tolerance.
    pub fn with_abstol(mut self, abstol: f64) -> Self {
        self.abstol = abstol;
        self
    }

    /// Set the absolute voltage tolerance.
    pub fn with_vntol(mut self, vntol: f64) -> Self {
        self.vntol = vntol;
        self
    }

    /// Set the absolute charge tolerance.
    pub fn with_chgtol(mut self, chgtol: f64) -> Self {
        self.chgtol = chgtol;
        self
    }

    /// Set the minimum conductance.
    pub fn with_gmin(mut self, gmin: f64) -> Self {
        self.gmin = gmin;
        self
    }

    /// Set the operating-point iteration budget.
    pub fn with_dc_max_iterations(mut self, iterations: usize) -> Self {
        self.dc_max_iterations = iterations;
        self
    }

    /// Set the per-timepoint iteration budget.
    pub fn with_tran_max_iterations(mut self, iterations: usize) -> Self {
        self.tran_max_iterations = iterations;
        self
    }

    /// Set the number of gmin stepping decades (0 disables gmin stepping).
    pub fn with_gmin_steps(mut self, steps: usize) -> Self {
        self.gmin_steps = steps;
        self
    }

    /// Set the number of source stepping increments (0 disables it).
    pub fn with_source_steps(mut self, steps: usize) -> Self {
        self.source_steps = steps;
        self
    }

    /// Set the pivot thresholds.
    pub fn with_pivot_tolerances(mut self, abs_tol: f64, rel_tol: f64) -> Self {
        self.pivot_abs_tol = abs_tol;
        self.pivot_rel_tol = rel_tol;
        self
    }

    /// Set the circuit temperature (kelvin).
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the nominal temperature (kelvin).
    pub fn with_nominal_temperature(mut self, temperature: f64) -> Self {
        self.nominal_temperature = temperature;
        self
    }

    /// Add an initial guess for a node voltage.
    pub fn with_initial_condition(mut self, node: impl Into<String>, voltage: f64) -> Self {
        self.initial_conditions.insert(node.into(), voltage);
        self
    }

    /// Check that every tolerance and budget is usable.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("reltol", self.reltol),
            ("abstol", self.abstol),
            ("vntol", self.vntol),
            ("chgtol", self.chgtol),
            ("pivot_abs_tol", self.pivot_abs_tol),
            ("pivot_rel_tol", self.pivot_rel_tol),
            ("temperature", self.temperature),
            ("nominal_temperature", self.nominal_temperature),
        ];
        for (name, value) in positive {
            if !(value > 0.0 && value.is_finite()) {
                return Err(NodalError::invalid_simulation_param(format!(
                    "{} must be positive and finite, got {}",
                    name, value
                )));
            }
        }
        if !(self.gmin >= 0.0 && self.gmin.is_finite()) {
            return Err(NodalError::invalid_simulation_param(format!(
                "gmin must be non-negative, got {}",
                self.gmin
            )));
        }
        if self.pivot_rel_tol > 1.0 {
            return Err(NodalError::invalid_simulation_param(
                "pivot_rel_tol must not exceed 1",
            ));
        }
        if self.dc_max_iterations == 0 || self.tran_max_iterations == 0 {
            return Err(NodalError::invalid_simulation_param(
                "iteration budgets must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Transient analysis parameters.
#[derive(Debug, Clone)]
pub struct TransientConfig {
    /// Output step; also caps the default maximum step.
    pub step: f64,
    /// Simulation end time.
    pub final_time: f64,
    /// Largest allowed timestep. Defaults to `min(step, final_time / 50)`.
    pub max_step: Option<f64>,
    /// Timestep floor. Defaults to `1e-9 * max_step`.
    pub min_step: Option<f64>,
    /// First timestep. Defaults to `min(final_time / 100, step) / 10`.
    pub initial_step: Option<f64>,
    /// Integration formula.
    pub method: IntegrationMethod,
    /// Highest integration order (1 or 2).
    pub max_order: usize,
    /// Truncation error overestimation factor.
    pub trtol: f64,
    /// Extra times the integrator must land on.
    pub breakpoints: Vec<f64>,
}

impl TransientConfig {
    /// Create a configuration from the output step and end time.
    pub fn new(step: f64, final_time: f64) -> Self {
        Self {
            step,
            final_time,
            max_step: None,
            min_step: None,
            initial_step: None,
            method: IntegrationMethod::default(),
            max_order: 2,
            trtol: 7.0,
            breakpoints: Vec::new(),
        }
    }

    /// Set the maximum timestep.
    pub fn with_max_step(mut self, max_step: f64) -> Self {
        self.max_step = Some(max_step);
        self
    }

    /// Set the timestep floor.
    pub fn with_min_step(mut self, min_step: f64) -> Self {
        self.min_step = Some(min_step);
        self
    }

    /// Set the first timestep.
    pub fn with_initial_step(mut self, initial_step: f64) -> Self {
        self.initial_step = Some(initial_step);
        self
    }

    /// Set the integration method.
    pub fn with_method(mut self, method: IntegrationMethod) -> Self {
        self.method = method;
        self
    }

    /// Set the maximum integration order.
    pub fn with_max_order(mut self, max_order: usize) -> Self {
        self.max_order = max_order;
        self
    }

    /// Set the truncation error factor.
    pub fn with_trtol(mut self, trtol: f64) -> Self {
        self.trtol = trtol;
        self
    }

    /// Add a time the integrator must land on.
    pub fn with_breakpoint(mut self, time: f64) -> Self {
        self.breakpoints.push(time);
        self
    }

    /// Effective maximum timestep.
    pub fn max_step(&self) -> f64 {
        self.max_step
            .unwrap_or_else(|| self.step.min(self.final_time / 50.0))
    }

    /// Effective timestep floor.
    pub fn min_step(&self) -> f64 {
        self.min_step.unwrap_or_else(|| 1e-9 * self.max_step())
    }

    /// Effective first timestep.
    pub fn initial_step(&self) -> f64 {
        self.initial_step
            .unwrap_or_else(|| (self.final_time / 100.0).min(self.step) / 10.0)
            .min(self.max_step())
    }

    /// Check the parameters before a run.
    pub fn validate(&self) -> Result<()> {
        if !(self.step > 0.0 && self.step.is_finite()) {
            return Err(NodalError::invalid_simulation_param(format!(
                "transient step must be positive, got {}",
                self.step
            )));
        }
        if !(self.final_time > 0.0 && self.final_time.is_finite()) {
            return Err(NodalError::invalid_simulation_param(format!(
                "final time must be positive, got {}",
                self.final_time
            )));
        }
        if !(1..=2).contains(&self.max_order) {
            return Err(NodalError::invalid_simulation_param(format!(
                "max_order must be 1 or 2, got {}",
                self.max_order
            )));
        }
        if !(self.trtol > 0.0) {
            return Err(NodalError::invalid_simulation_param(
                "trtol must be positive",
            ));
        }
        let (min_step, max_step) = (self.min_step(), self.max_step());
        if !(max_step > 0.0) || !(min_step > 0.0) || min_step >= max_step {
            return Err(NodalError::invalid_simulation_param(format!(
                "timestep bounds are inconsistent (min {:e}, max {:e})",
                min_step, max_step
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_default_config_is_valid() {
        SimulationConfig::default().validate().unwrap();
    }

    #[test]
    fn test_rejects_zero_budget() {
        let config = SimulationConfig::new().with_dc_max_iterations(0);
        assert!(matches!(
            config.validate(),
            Err(NodalError::InvalidSimulationParam { .. })
        ));
    }

    #[test]
    fn test_transient_defaults() {
        let config = TransientConfig::new(1e-5, 1e-3);
        assert_relative_eq!(config.max_step(), 1e-5);
        assert_relative_eq!(config.initial_step(), 1e-6);
        assert_relative_eq!(config.min_step(), 1e-14);
        config.validate().unwrap();
    }

    #[test]
    fn test_transient_rejects_bad_order() {
        let config = TransientConfig::new(1e-5, 1e-3).with_max_order(3);
        assert!(config.validate().is_err());
    }
}
