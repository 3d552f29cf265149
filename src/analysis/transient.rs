//! Transient analysis with truncation error control.
//!
//! Each step solves the circuit at `time + delta` with the companion models
//! of the current integration order. A step that fails to converge is cut
//! in half; a converged step is accepted only when the truncation error of
//! every integrated state allows a step at least 0.9 times the attempted
//! one. Breakpoints are landed on exactly and restart integration at
//! first order.

use std::collections::VecDeque;
use std::ops::ControlFlow;

use super::export::{AnalysisStats, RealPoint};
use crate::circuit::Circuit;
use crate::config::{SimulationConfig, TransientConfig};
use crate::error::{NodalError, Result};
use crate::solver::{AnalysisMode, InitMode, Simulation, TimeDomain, TruncationTolerances};

/// Largest growth of the timestep between accepted steps.
const MAX_GROWTH: f64 = 2.0;

/// Fraction of the attempted step the truncation estimate must allow.
const ACCEPT_RATIO: f64 = 0.9;

/// Gain the second-order estimate must show before the order is raised.
const ORDER_RAISE_GAIN: f64 = 1.05;

/// Fraction of the gap to the next breakpoint used as the first step after one.
const BREAKPOINT_STEP_FRACTION: f64 = 0.1;

/// Pending breakpoints in increasing order.
#[derive(Debug)]
struct Breakpoints {
    times: VecDeque<f64>,
}

impl Breakpoints {
    /// Sort and merge breakpoints closer than `resolution`.
    fn new(mut times: Vec<f64>, resolution: f64) -> Self {
        times.retain(|t| t.is_finite());
        times.sort_by(f64::total_cmp);
        let mut merged: VecDeque<f64> = VecDeque::with_capacity(times.len());
        for time in times {
            match merged.back_mut() {
                // Keep the later time so the final time survives merging
                Some(last) if time - *last < resolution => *last = time,
                _ => merged.push_back(time),
            }
        }
        Self { times: merged }
    }

    /// Drop breakpoints at or before `time`.
    fn discard_through(&mut self, time: f64, resolution: f64) {
        while self
            .times
            .front()
            .is_some_and(|&t| t <= time + 0.5 * resolution)
        {
            self.times.pop_front();
        }
    }

    fn next(&self) -> Option<f64> {
        self.times.front().copied()
    }
}

/// Transient analysis.
#[derive(Debug, Clone)]
pub struct Transient {
    params: TransientConfig,
    config: SimulationConfig,
}

impl Transient {
    /// Create the analysis.
    pub fn new(params: TransientConfig) -> Self {
        Self {
            params,
            config: SimulationConfig::default(),
        }
    }

    /// Use the given simulation configuration.
    pub fn with_config(mut self, config: SimulationConfig) -> Self {
        self.config = config;
        self
    }

    /// Transient parameters.
    pub fn params(&self) -> &TransientConfig {
        &self.params
    }

    /// Run from the operating point to the final time, exporting time zero
    /// and every accepted step.
    pub fn run<F>(&self, circuit: &Circuit, mut export: F) -> Result<AnalysisStats>
    where
        F: FnMut(&RealPoint<'_>) -> ControlFlow<()>,
    {
        self.params.validate()?;
        let mut sim = Simulation::setup(circuit, self.config.clone())?;
        let result = self.execute(&mut sim, &mut export);
        sim.unsetup();
        result
    }

    fn execute<F>(&self, sim: &mut Simulation, export: &mut F) -> Result<AnalysisStats>
    where
        F: FnMut(&RealPoint<'_>) -> ControlFlow<()>,
    {
        let params = &self.params;
        let final_time = params.final_time;
        let max_step = params.max_step();
        let min_step = params.min_step();
        let max_iterations = self.config.tran_max_iterations;

        sim.temperature()?;
        sim.set_mode(AnalysisMode::TransientOp);
        sim.set_time(0.0);
        sim.reset_solution();
        sim.operating_point("transient operating point", InitMode::Junction)?;

        let tolerances = TruncationTolerances {
            trtol: params.trtol,
            reltol: self.config.reltol,
            abstol: self.config.abstol,
            chgtol: self.config.chgtol,
        };
        sim.attach_time_domain(TimeDomain::new(params.method, params.max_order, tolerances));

        let mut times = sim.breakpoints(final_time);
        times.extend(
            params
                .breakpoints
                .iter()
                .copied()
                .filter(|&t| t > 0.0 && t <= final_time),
        );
        times.push(final_time);
        let mut breakpoints = Breakpoints::new(times, min_step);
        log::debug!(
            "transient to {:e}s: {} breakpoints, steps in [{:e}, {:e}]",
            final_time,
            breakpoints.times.len(),
            min_step,
            max_step
        );

        // Time zero counts as a breakpoint
        let mut delta = params.initial_step();
        if let Some(next) = breakpoints.next() {
            delta = delta.min(BREAKPOINT_STEP_FRACTION * next);
        }
        sim.initialize_states(delta)?;
        sim.set_mode(AnalysisMode::Transient);

        let mut stats = AnalysisStats {
            points: 1,
            ..AnalysisStats::default()
        };
        if export(&RealPoint::new(sim, Some(0.0), None)).is_break() {
            stats.cancelled = true;
            stats.iterations = sim.iterations();
            return Ok(stats);
        }

        let mut time = 0.0;
        let mut accepted_solution = sim.state().solution.clone();
        // Accepted steps since integration last restarted at first order
        let mut steps_at_order = 0usize;

        while time < final_time {
            let mut target = time + delta;
            let mut landing = None;
            if let Some(next) = breakpoints.next() {
                if target >= next - min_step {
                    target = next;
                    delta = next - time;
                    landing = Some(next);
                }
            }

            sim.begin_step(delta)?;
            sim.set_time(target);
            sim.set_init(InitMode::Float);

            if sim.iterate(max_iterations)?.is_none() {
                stats.rejected += 1;
                sim.restore_solution(&accepted_solution);
                delta *= 0.5;
                sim.set_order(1)?;
                steps_at_order = 0;
                log::warn!(
                    "no convergence at t = {:e}s; cutting step to {:e}s",
                    target,
                    delta
                );
                if delta < min_step {
                    return Err(NodalError::TimestepTooSmall { time, step: delta });
                }
                continue;
            }

            let order = sim.order();
            let mut new_delta = sim.truncate().min(MAX_GROWTH * delta);
            if new_delta <= ACCEPT_RATIO * delta {
                stats.rejected += 1;
                sim.restore_solution(&accepted_solution);
                log::trace!(
                    "step {:e}s at t = {:e}s rejected by truncation error, retrying with {:e}s",
                    delta,
                    time,
                    new_delta
                );
                delta = new_delta;
                if delta < min_step {
                    return Err(NodalError::TimestepTooSmall { time, step: delta });
                }
                continue;
            }

            // Raise to second order when it allows a noticeably larger step
            let mut next_order = order;
            if order == 1 && sim.max_order() > 1 && steps_at_order >= 2 {
                sim.set_order(2)?;
                let raised = sim.truncate().min(MAX_GROWTH * delta);
                sim.set_order(1)?;
                if raised > ORDER_RAISE_GAIN * new_delta {
                    next_order = 2;
                    new_delta = raised;
                }
            }

            sim.accept()?;
            time = target;
            accepted_solution.copy_from_slice(&sim.state().solution);
            stats.accepted += 1;
            stats.points += 1;
            steps_at_order += 1;

            if export(&RealPoint::new(sim, Some(time), None)).is_break() {
                stats.cancelled = true;
                break;
            }

            new_delta = new_delta.min(max_step);
            if let Some(at) = landing {
                log::debug!("landed on breakpoint t = {:e}s", at);
                breakpoints.discard_through(at, min_step);
                next_order = 1;
                steps_at_order = 0;
                if let Some(next) = breakpoints.next() {
                    new_delta = new_delta.min(BREAKPOINT_STEP_FRACTION * (next - time));
                }
            }
            if next_order != order {
                log::trace!("integration order {} -> {} at t = {:e}s", order, next_order, time);
            }
            sim.set_order(next_order)?;
            delta = new_delta;
        }

        stats.iterations = sim.iterations();
        log::debug!(
            "transient done: {} accepted, {} rejected, {} iterations",
            stats.accepted,
            stats.rejected,
            stats.iterations
        );
        Ok(stats)
    }
}
