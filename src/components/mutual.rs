//! Magnetic coupling between two inductors.
//!
//! The coupling adds `M * di2/dt` to the branch equation of the first
//! inductor and `M * di1/dt` to the second, with M = k * sqrt(L1 * L2).
//! Each cross term is integrated as its own state, so the inductors are not
//! modified and the coupling loads after them.

use num_complex::Complex64;

use crate::behavior::{
    bound, check_pins, Behavior, Capabilities, ExportContext, FrequencyContext, LoadContext,
    SetupContext,
};
use crate::circuit::{Unknown, Unknowns};
use crate::error::{NodalError, Result};
use crate::solver::sparse::{MatrixElement, RhsElement};
use crate::solver::{AnalysisMode, RealState, SparseSystem, StateId, StatePool};

/// Mutual inductance between two named inductors.
#[derive(Debug, Clone)]
pub struct MutualInductance {
    pub name: String,
    pub inductor1: String,
    pub inductor2: String,
    /// Coupling coefficient k.
    pub coupling: f64,
}

impl MutualInductance {
    /// Couple two inductors with coefficient `coupling`.
    pub fn new(
        name: impl Into<String>,
        inductor1: impl Into<String>,
        inductor2: impl Into<String>,
        coupling: f64,
    ) -> Self {
        Self {
            name: name.into(),
            inductor1: inductor1.into(),
            inductor2: inductor2.into(),
            coupling,
        }
    }

    pub(crate) fn behavior(&self) -> MutualInductanceBehavior {
        MutualInductanceBehavior {
            def: self.clone(),
            branch1: Unknown::GROUND,
            branch2: Unknown::GROUND,
            mutual: 0.0,
            states: None,
            handles: None,
            ac_handles: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Coupling {
    /// (branch1, branch2) and (branch2, branch1)
    e12: MatrixElement,
    e21: MatrixElement,
    rhs1: RhsElement,
    rhs2: RhsElement,
}

#[derive(Debug)]
pub struct MutualInductanceBehavior {
    def: MutualInductance,
    branch1: Unknown,
    branch2: Unknown,
    mutual: f64,
    /// Flux linked into inductor 1 by i2, and into inductor 2 by i1.
    states: Option<(StateId, StateId)>,
    handles: Option<Coupling>,
    ac_handles: Option<(MatrixElement, MatrixElement)>,
}

impl Behavior for MutualInductanceBehavior {
    fn name(&self) -> &str {
        &self.def.name
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            load: true,
            transient: true,
            frequency: true,
            ..Capabilities::default()
        }
    }

    fn setup(&mut self, context: &SetupContext<'_>) -> Result<()> {
        if !(self.def.coupling.is_finite() && self.def.coupling.abs() <= 1.0) {
            return Err(NodalError::invalid_parameter(
                &self.def.name,
                "k",
                format!("coupling must lie in [-1, 1], got {}", self.def.coupling),
            ));
        }

        let mut ports = Vec::with_capacity(2);
        for inductor in [&self.def.inductor1, &self.def.inductor2] {
            let port = context.sibling(inductor)?.inductor_port().ok_or_else(|| {
                NodalError::UnresolvedBehavior {
                    name: self.def.name.clone(),
                    referenced: inductor.clone(),
                    expected: "a connected inductor",
                }
            })?;
            ports.push(port);
        }

        self.branch1 = ports[0].branch;
        self.branch2 = ports[1].branch;
        self.mutual = self.def.coupling * (ports[0].inductance * ports[1].inductance).sqrt();
        Ok(())
    }

    fn connect(&mut self, pins: &[Unknown], _unknowns: &mut Unknowns) -> Result<()> {
        check_pins(&self.def.name, 0, pins)
    }

    fn allocate(&mut self, system: &mut SparseSystem<f64>) -> Result<()> {
        let (b1, b2) = (self.branch1.index(), self.branch2.index());
        self.handles = Some(Coupling {
            e12: system.matrix_element(b1, b2)?,
            e21: system.matrix_element(b2, b1)?,
            rhs1: system.rhs_element(b1)?,
            rhs2: system.rhs_element(b2)?,
        });
        Ok(())
    }

    fn unsetup(&mut self) {
        self.handles = None;
        self.ac_handles = None;
        self.states = None;
    }

    fn load(&mut self, context: &mut LoadContext<'_>) -> Result<()> {
        let handles = bound(&self.handles, &self.def.name)?;
        if context.state.mode != AnalysisMode::Transient {
            return Ok(());
        }
        let (time, (s12, s21)) = match (context.time.as_deref_mut(), self.states) {
            (Some(time), Some(states)) => (time, states),
            _ => return Ok(()),
        };

        let i1 = context.state.value(self.branch1.index());
        let i2 = context.state.value(self.branch2.index());

        time.pool_mut().set_value(s12, self.mutual * i2);
        let c12 = time.integrate(s12, self.mutual);
        time.pool_mut().set_value(s21, self.mutual * i1);
        let c21 = time.integrate(s21, self.mutual);

        context.system.sub(handles.e12, c12.geq);
        context.system.sub(handles.e21, c21.geq);
        context
            .system
            .add_rhs(handles.rhs1, c12.current - c12.geq * i2);
        context
            .system
            .add_rhs(handles.rhs2, c21.current - c21.geq * i1);
        Ok(())
    }

    fn create_states(&mut self, pool: &mut StatePool) {
        self.states = Some((pool.allocate(), pool.allocate()));
    }

    fn initialize_states(&self, state: &RealState, pool: &mut StatePool) {
        if let Some((s12, s21)) = self.states {
            pool.set_value(s12, self.mutual * state.value(self.branch2.index()));
            pool.set_value(s21, self.mutual * state.value(self.branch1.index()));
        }
    }

    fn allocate_frequency(&mut self, system: &mut SparseSystem<Complex64>) -> Result<()> {
        let (b1, b2) = (self.branch1.index(), self.branch2.index());
        self.ac_handles = Some((system.matrix_element(b1, b2)?, system.matrix_element(b2, b1)?));
        Ok(())
    }

    fn load_frequency(&mut self, context: &mut FrequencyContext<'_>) -> Result<()> {
        let (e12, e21) = bound(&self.ac_handles, &self.def.name)?;
        let value = context.state.laplace() * self.mutual;
        context.system.sub(e12, value);
        context.system.sub(e21, value);
        Ok(())
    }

    fn property(&self, name: &str, _context: &ExportContext<'_>) -> Option<f64> {
        match name {
            "k" => Some(self.def.coupling),
            "m" => Some(self.mutual),
            _ => None,
        }
    }
}
