//! # Nodal Core
//!
//! A SPICE-style analog circuit simulation engine.
//!
//! This library provides:
//! - A sparse linear system with stable element handles and Markowitz pivoting
//! - A uniform behavior lifecycle through which devices bind to and stamp the system
//! - Newton-Raphson iteration with gmin and source stepping
//! - Adaptive-step transient integration with truncation error control and breakpoints
//! - AC small-signal analysis linearized at the operating point
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`circuit`] - Circuit container, unknown registry, and validation
//! - [`components`] - Component models (resistors, capacitors, diodes, etc.)
//! - [`behavior`] - The lifecycle contract every device implements
//! - [`solver`] - Sparse MNA assembly, Newton iteration, and integration
//! - [`analysis`] - Operating point, DC sweep, transient, and AC analyses
//! - [`config`] - Tolerances, budgets, and transient parameters
//!
//! ## Usage
//!
//! ```no_run
//! use std::ops::ControlFlow;
//!
//! use nodal_core::analysis::OperatingPoint;
//! use nodal_core::components::{Resistor, VoltageSource};
//! use nodal_core::Circuit;
//!
//! let mut circuit = Circuit::new();
//! circuit.add(VoltageSource::new("V1", "in", "0", 10.0))?;
//! circuit.add(Resistor::new("R1", "in", "out", 10e3))?;
//! circuit.add(Resistor::new("R2", "out", "0", 10e3))?;
//!
//! OperatingPoint::default().run(&circuit, |point| {
//!     println!("v(out) = {}", point.voltage("out").unwrap_or(f64::NAN));
//!     ControlFlow::Continue(())
//! })?;
//! # Ok::<(), nodal_core::NodalError>(())
//! ```
//!
//! ## Circuit Simulation Method
//!
//! The simulator uses Modified Nodal Analysis (MNA) to solve circuit equations.
//! For each solve point:
//!
//! 1. Clear the system and let every behavior stamp its contribution
//! 2. Factor and solve Ax = z for node voltages and branch currents
//! 3. For nonlinear elements, repeat until the iterates converge
//!
//! Reactive elements (C, L) are discretized using backward Euler,
//! trapezoidal, or second-order Gear formulas with a variable timestep.

pub mod analysis;
pub mod behavior;
pub mod circuit;
pub mod components;
pub mod config;
pub mod error;
pub mod solver;

// Re-export main types for convenience
pub use circuit::Circuit;
pub use config::{SimulationConfig, TransientConfig};
pub use error::{NodalError, Result};
pub use solver::Simulation;

/// Boltzmann constant (J/K)
pub const BOLTZMANN: f64 = 1.380_649e-23;

/// Elementary charge (C)
pub const CHARGE: f64 = 1.602_176_634e-19;

/// Default circuit and nominal temperature (K), 27 degrees Celsius
pub const REFERENCE_TEMPERATURE: f64 = 300.15;
