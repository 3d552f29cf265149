//! Behavior lifecycle shared by every device.
//!
//! A behavior is one device's contribution to a simulation. Its life runs:
//!
//! ```text
//! create -> setup(siblings) -> connect(pins) -> allocate(system)
//!        -> { temperature | load | is_convergent | truncate | load_frequency }*
//!        -> unsetup
//! ```
//!
//! `allocate` binds every matrix handle the behavior will ever write, so
//! `load` only accumulates through handles it already owns. A behavior
//! advertises which optional phases it takes part in through its
//! [`Capabilities`]; the simulation builds one ordered list per phase at
//! setup and never asks a behavior about its type afterwards.

use std::fmt::Debug;

use num_complex::Complex64;

use crate::circuit::{Unknown, Unknowns};
use crate::config::SimulationConfig;
use crate::error::{NodalError, Result};
use crate::solver::{ComplexState, RealState, SparseSystem, StatePool, TimeDomain};

/// Phases a behavior takes part in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    /// Recomputes temperature-dependent parameters.
    pub temperature: bool,
    /// Stamps the real system.
    pub load: bool,
    /// Has its own convergence check beyond solution deltas.
    pub convergence: bool,
    /// Owns integrated states.
    pub transient: bool,
    /// Stamps the complex system.
    pub frequency: bool,
}

/// Branch current and inductance of an inductor, for coupling devices.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InductorPort {
    pub branch: Unknown,
    pub inductance: f64,
}

/// Sibling lookup available while a behavior is set up.
///
/// Behaviors are set up in load order, so every dependency of the
/// requester has already been set up and connected.
pub struct SetupContext<'a> {
    requester: &'a str,
    before: &'a [Box<dyn Behavior>],
    after: &'a [Box<dyn Behavior>],
    config: &'a SimulationConfig,
}

impl<'a> SetupContext<'a> {
    pub(crate) fn new(
        requester: &'a str,
        before: &'a [Box<dyn Behavior>],
        after: &'a [Box<dyn Behavior>],
        config: &'a SimulationConfig,
    ) -> Self {
        Self {
            requester,
            before,
            after,
            config,
        }
    }

    /// Simulation configuration.
    pub fn config(&self) -> &SimulationConfig {
        self.config
    }

    /// Find the behavior of another entity.
    pub fn sibling(&self, name: &str) -> Result<&dyn Behavior> {
        self.before
            .iter()
            .chain(self.after.iter())
            .find(|b| b.name() == name)
            .map(|b| b.as_ref())
            .ok_or_else(|| NodalError::MissingEntity {
                name: self.requester.to_string(),
                referenced: name.to_string(),
            })
    }
}

/// Everything a real load pass may touch.
pub struct LoadContext<'a> {
    pub system: &'a mut SparseSystem<f64>,
    pub state: &'a RealState,
    /// Integration state; present only during transient runs.
    pub time: Option<&'a mut TimeDomain>,
}

/// Everything a frequency load pass may touch.
pub struct FrequencyContext<'a> {
    pub system: &'a mut SparseSystem<Complex64>,
    pub state: &'a ComplexState,
}

/// Read-only view for property export.
pub struct ExportContext<'a> {
    pub state: &'a RealState,
    pub time: Option<&'a TimeDomain>,
}

/// One device's participation in a simulation.
pub trait Behavior: Debug {
    /// Name of the entity this behavior belongs to.
    fn name(&self) -> &str;

    /// Phases this behavior takes part in.
    fn capabilities(&self) -> Capabilities;

    /// Resolve references to other entities.
    fn setup(&mut self, _context: &SetupContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Bind pins to unknowns and create any extra unknowns.
    fn connect(&mut self, pins: &[Unknown], unknowns: &mut Unknowns) -> Result<()>;

    /// Request every matrix and RHS handle of the real system.
    fn allocate(&mut self, system: &mut SparseSystem<f64>) -> Result<()>;

    /// Release every handle.
    fn unsetup(&mut self);

    /// Recompute temperature-dependent quantities.
    fn temperature(&mut self, _state: &RealState) -> Result<()> {
        Ok(())
    }

    /// Stamp the real system for the current iterate.
    ///
    /// Calling this twice with the same state stamps the same values.
    fn load(&mut self, context: &mut LoadContext<'_>) -> Result<()>;

    /// Device-level convergence check after a load pass.
    fn is_convergent(&self, _state: &RealState) -> bool {
        true
    }

    /// Allocate integrated states.
    fn create_states(&mut self, _pool: &mut StatePool) {}

    /// Seed integrated states from the operating point.
    fn initialize_states(&self, _state: &RealState, _pool: &mut StatePool) {}

    /// Largest step allowed by this behavior's truncation error.
    fn truncate(&self, _time: &TimeDomain) -> f64 {
        f64::INFINITY
    }

    /// Times in `(0, final_time]` the integrator must land on.
    fn breakpoints(&self, _final_time: f64) -> Vec<f64> {
        Vec::new()
    }

    /// Request every handle of the complex system.
    fn allocate_frequency(&mut self, _system: &mut SparseSystem<Complex64>) -> Result<()> {
        Ok(())
    }

    /// Capture small-signal parameters at the operating point.
    fn init_frequency(&mut self, _state: &RealState) {}

    /// Stamp the complex system for the current frequency.
    fn load_frequency(&mut self, _context: &mut FrequencyContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Real-valued named property.
    fn property(&self, name: &str, context: &ExportContext<'_>) -> Option<f64>;

    /// Complex-valued named property.
    fn frequency_property(&self, _name: &str, _state: &ComplexState) -> Option<Complex64> {
        None
    }

    /// Coupling port, for inductors.
    fn inductor_port(&self) -> Option<InductorPort> {
        None
    }

    /// Override the DC value of an independent source. Returns false for
    /// behaviors that cannot be swept.
    fn set_dc_value(&mut self, _value: f64) -> bool {
        false
    }
}

/// Fail with `PinMismatch` unless exactly `expected` pins are given.
pub fn check_pins(name: &str, expected: usize, pins: &[Unknown]) -> Result<()> {
    if pins.len() != expected {
        return Err(NodalError::pin_mismatch(name, expected, pins.len()));
    }
    Ok(())
}

/// Unwrap handles that `allocate` should have bound.
pub fn bound<T: Copy>(handles: &Option<T>, name: &str) -> Result<T> {
    handles.ok_or_else(|| {
        NodalError::invalid_state(format!(
            "'{}' was loaded before its equations were allocated",
            name
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_pins() {
        assert!(check_pins("R1", 2, &[Unknown(1), Unknown(2)]).is_ok());
        match check_pins("R1", 2, &[Unknown(1)]) {
            Err(NodalError::PinMismatch {
                name,
                expected,
                given,
            }) => {
                assert_eq!(name, "R1");
                assert_eq!(expected, 2);
                assert_eq!(given, 1);
            }
            other => panic!("expected PinMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_bound_reports_invalid_state() {
        let handles: Option<usize> = None;
        assert!(matches!(
            bound(&handles, "C1"),
            Err(NodalError::InvalidState { .. })
        ));
        assert_eq!(bound(&Some(3usize), "C1").unwrap(), 3);
    }
}
