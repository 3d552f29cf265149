//! Newton-Raphson iteration and convergence aids.

use super::simulation::Simulation;
use super::state::InitMode;
use super::FALLBACK_GMIN;
use crate::error::{NodalError, Result};

impl Simulation {
    /// Run up to `max_iterations` Newton passes from the current solution.
    ///
    /// Returns the number of passes on convergence and `None` when the
    /// budget runs out or the iterate stops being finite. A singular matrix
    /// is an error, since no amount of iterating fixes it.
    pub fn iterate(&mut self, max_iterations: usize) -> Result<Option<usize>> {
        for iteration in 1..=max_iterations {
            self.state.iteration += 1;
            self.load()?;
            self.system.factor()?;
            self.system.solve(&mut self.scratch)?;
            self.iterations += 1;

            if self.scratch.iter().any(|x| !x.is_finite()) {
                log::trace!("iterate {} is not finite", iteration);
                return Ok(None);
            }

            std::mem::swap(&mut self.state.old_solution, &mut self.state.solution);
            self.state.solution.copy_from_slice(&self.scratch);

            // Junctions were pinned, so the first solve says nothing about convergence
            if self.state.init == InitMode::Junction {
                self.state.init = InitMode::Float;
                continue;
            }

            // States written by the first load belong to the previous iterate
            if iteration > 1 && self.solution_converged() && self.is_convergent() {
                log::trace!("converged after {} iterations", iteration);
                return Ok(Some(iteration));
            }
        }
        Ok(None)
    }

    /// Whether every unknown moved by less than its tolerance in the last pass.
    fn solution_converged(&self) -> bool {
        let reltol = self.config.reltol;
        self.state
            .solution
            .iter()
            .zip(self.state.old_solution.iter())
            .zip(self.tolerances.iter())
            .skip(1)
            .all(|((&new, &old), &tol)| {
                (new - old).abs() <= reltol * new.abs().max(old.abs()) + tol
            })
    }

    /// Solve an operating point, falling back to gmin and source stepping.
    ///
    /// `init` is [`InitMode::Junction`] for a fresh point and
    /// [`InitMode::Float`] to continue from the current solution. `point`
    /// names the point in the error when every strategy fails.
    pub fn operating_point(&mut self, point: &str, init: InitMode) -> Result<usize> {
        let max_iterations = self.config.dc_max_iterations;
        self.diagonal_gmin = 0.0;
        self.state.init = init;

        if let Some(iterations) = self.iterate(max_iterations)? {
            log::debug!("{}: converged in {} iterations", point, iterations);
            return Ok(iterations);
        }

        if self.config.gmin_steps > 0 {
            log::warn!("{}: direct Newton failed, starting gmin stepping", point);
            if let Some(iterations) = self.gmin_stepping(max_iterations)? {
                log::debug!("{}: gmin stepping converged", point);
                return Ok(iterations);
            }
        }

        if self.config.source_steps > 0 {
            log::warn!("{}: starting source stepping", point);
            let result = self.source_stepping(max_iterations);
            self.state.source_factor = 1.0;
            if let Some(iterations) = result? {
                log::debug!("{}: source stepping converged", point);
                return Ok(iterations);
            }
        }

        Err(NodalError::no_convergence(point))
    }

    /// Add a conductance from every node to ground, raising it a decade at a
    /// time until Newton converges, then relax it back to zero.
    fn gmin_stepping(&mut self, max_iterations: usize) -> Result<Option<usize>> {
        let base = if self.config.gmin > 0.0 {
            self.config.gmin
        } else {
            FALLBACK_GMIN
        };
        let decades = self.config.gmin_steps as i32;
        let mut total = 0;

        let mut reached = None;
        for decade in 0..=decades {
            self.diagonal_gmin = base * 10f64.powi(decade);
            self.state.init = InitMode::Junction;
            if let Some(iterations) = self.iterate(max_iterations)? {
                total += iterations;
                reached = Some(decade);
                break;
            }
        }
        let Some(mut decade) = reached else {
            self.diagonal_gmin = 0.0;
            return Ok(None);
        };
        log::trace!("gmin stepping: converged with gmin = {:e}", self.diagonal_gmin);

        while decade > 0 {
            decade -= 1;
            self.diagonal_gmin = base * 10f64.powi(decade);
            self.state.init = InitMode::Float;
            match self.iterate(max_iterations)? {
                Some(iterations) => total += iterations,
                None => {
                    self.diagonal_gmin = 0.0;
                    return Ok(None);
                }
            }
        }

        self.diagonal_gmin = 0.0;
        self.state.init = InitMode::Float;
        Ok(self.iterate(max_iterations)?.map(|iterations| total + iterations))
    }

    /// Ramp every independent source from zero to its full value.
    fn source_stepping(&mut self, max_iterations: usize) -> Result<Option<usize>> {
        let steps = self.config.source_steps;
        let mut total = 0;
        self.reset_solution();
        self.state.init = InitMode::Junction;

        for step in 1..=steps {
            self.state.source_factor = step as f64 / steps as f64;
            match self.iterate(max_iterations)? {
                Some(iterations) => total += iterations,
                None => {
                    log::trace!(
                        "source stepping failed at factor {}",
                        self.state.source_factor
                    );
                    return Ok(None);
                }
            }
            self.state.init = InitMode::Float;
        }
        Ok(Some(total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::Circuit;
    use crate::components::{CurrentSource, Diode, DiodeParams, Resistor, VoltageSource};
    use crate::config::SimulationConfig;
    use approx::assert_relative_eq;

    #[test]
    fn test_linear_circuit_converges_in_two_passes() {
        let mut circuit = Circuit::new();
        circuit.add(CurrentSource::new("I1", "0", "a", 1e-3)).unwrap();
        circuit.add(Resistor::new("R1", "a", "0", 1e3)).unwrap();
        let mut sim = Simulation::setup(&circuit, SimulationConfig::default()).unwrap();

        let iterations = sim.operating_point("op", InitMode::Junction).unwrap();
        assert_eq!(iterations, 2);
        assert_relative_eq!(sim.voltage("a").unwrap(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_diode_forward_drop() {
        let mut circuit = Circuit::new();
        circuit.add(VoltageSource::new("V1", "in", "0", 5.0)).unwrap();
        circuit.add(Resistor::new("R1", "in", "a", 1e3)).unwrap();
        circuit
            .add(Diode::new("D1", "a", "0", DiodeParams::default()))
            .unwrap();
        let mut sim = Simulation::setup(&circuit, SimulationConfig::default()).unwrap();
        sim.temperature().unwrap();
        sim.operating_point("op", InitMode::Junction).unwrap();

        let vd = sim.voltage("a").unwrap();
        assert!(vd > 0.6 && vd < 0.8, "forward drop {}", vd);
        let id = sim.property("D1", "id").unwrap();
        assert_relative_eq!(id, (5.0 - vd) / 1e3, max_relative = 1e-2);
    }

    #[test]
    fn test_exhausted_budget_reports_point() {
        let mut circuit = Circuit::new();
        circuit.add(VoltageSource::new("V1", "a", "0", 0.8)).unwrap();
        circuit
            .add(Diode::new("D1", "a", "0", DiodeParams::default()))
            .unwrap();
        let config = SimulationConfig::default()
            .with_dc_max_iterations(1)
            .with_gmin_steps(0)
            .with_source_steps(0);
        let mut sim = Simulation::setup(&circuit, config).unwrap();
        match sim.operating_point("v1 = 0.8", InitMode::Junction) {
            Err(NodalError::NoConvergence { point }) => assert_eq!(point, "v1 = 0.8"),
            other => panic!("expected NoConvergence, got {:?}", other),
        }
    }

    /// Diode clamp fed through `r` from `v`.
    fn clamp(v: f64, r: f64) -> Circuit {
        let mut circuit = Circuit::new();
        circuit.add(VoltageSource::new("V1", "in", "0", v)).unwrap();
        circuit.add(Resistor::new("R1", "in", "a", r)).unwrap();
        circuit
            .add(Diode::new("D1", "a", "0", DiodeParams::default()))
            .unwrap();
        circuit
    }

    fn solve(circuit: &Circuit, config: SimulationConfig) -> (Result<usize>, Simulation) {
        let mut sim = Simulation::setup(circuit, config).unwrap();
        sim.temperature().unwrap();
        let result = sim.operating_point("op", InitMode::Junction);
        (result, sim)
    }

    #[test]
    fn test_gmin_stepping_rescues_weak_drive() {
        // Direct Newton needs 9 passes here
        let circuit = clamp(5.0, 100e3);
        let (direct, _) = solve(
            &circuit,
            SimulationConfig::default()
                .with_dc_max_iterations(7)
                .with_gmin_steps(0)
                .with_source_steps(0),
        );
        assert!(matches!(direct, Err(NodalError::NoConvergence { .. })));

        let (stepped, sim) = solve(
            &circuit,
            SimulationConfig::default()
                .with_dc_max_iterations(7)
                .with_gmin_steps(10)
                .with_source_steps(0),
        );
        assert!(stepped.is_ok(), "gmin stepping failed: {:?}", stepped);
        assert_relative_eq!(sim.voltage("a").unwrap(), 0.574477, max_relative = 1e-4);
        assert_eq!(sim.diagonal_gmin, 0.0);
    }

    #[test]
    fn test_source_stepping_rescues_low_bias() {
        // Direct Newton needs 10 passes here
        let circuit = clamp(0.5, 1e3);
        let (direct, _) = solve(
            &circuit,
            SimulationConfig::default()
                .with_dc_max_iterations(9)
                .with_gmin_steps(0)
                .with_source_steps(0),
        );
        assert!(matches!(direct, Err(NodalError::NoConvergence { .. })));

        let (stepped, sim) = solve(
            &circuit,
            SimulationConfig::default()
                .with_dc_max_iterations(9)
                .with_gmin_steps(0)
                .with_source_steps(10),
        );
        assert!(stepped.is_ok(), "source stepping failed: {:?}", stepped);
        assert_relative_eq!(sim.voltage("a").unwrap(), 0.497724, max_relative = 1e-4);
        assert_eq!(sim.state().source_factor, 1.0);
    }

    #[test]
    fn test_source_stepping_restores_sources() {
        let config = SimulationConfig::default()
            .with_dc_max_iterations(2)
            .with_gmin_steps(0);
        let (result, sim) = solve(&clamp(5.0, 1e3), config);
        assert!(matches!(result, Err(NodalError::NoConvergence { .. })));
        assert_eq!(sim.state().source_factor, 1.0);
    }
}
