//! MNA (Modified Nodal Analysis) solver.
//!
//! This module provides the numerical engine for circuit simulation.
//!
//! ## Modified Nodal Analysis
//!
//! MNA assembles a system of equations Ax = z where:
//! - x contains node voltages and branch currents
//! - A is the conductance/coefficient matrix
//! - z is the source vector
//!
//! The matrix structure is:
//! ```text
//! [ G   B ] [ v ]   [ i ]
//! [ C   D ] [ j ] = [ e ]
//! ```
//!
//! where:
//! - G is the conductance matrix (node equations)
//! - B, C connect voltage sources and inductors to nodes
//! - D holds inductor and coupling impedances, 0 for ideal voltage sources
//! - v is the vector of node voltages
//! - j is the vector of branch currents
//! - i is the sum of current sources into each node
//! - e is the vector of voltage source values
//!
//! Nonlinear devices are linearized around the current iterate and the
//! system is re-stamped and re-solved until the iterates settle (see
//! [`Simulation::iterate`]). Reactive devices are turned into companion
//! conductances by the integration formula of [`TimeDomain`].

mod integration;
pub mod mna;
mod newton;
mod simulation;
pub mod sparse;
mod state;

pub use integration::{
    Integrated, IntegrationMethod, StateId, StatePool, TimeDomain, TruncationTolerances, HISTORY,
};
pub use simulation::Simulation;
pub use sparse::{MatrixElement, PivotConfig, RhsElement, Scalar, SparseSystem};
pub use state::{AnalysisMode, ComplexState, InitMode, RealState};

/// Gmin used by gmin stepping when the configured junction gmin is zero.
pub const FALLBACK_GMIN: f64 = 1e-12;
