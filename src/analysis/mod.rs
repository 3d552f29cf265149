//! Analyses driving a bound [`Simulation`](crate::solver::Simulation).
//!
//! Every analysis binds a fresh behavior set, runs the temperature pass,
//! calls its export callback once per completed solve point, and releases
//! the behaviors at the end. Returning [`ControlFlow::Break`] from the
//! callback stops the run at that point boundary.
//!
//! [`ControlFlow::Break`]: std::ops::ControlFlow::Break

mod ac;
mod dc;
mod export;
mod op;
mod transient;

pub use ac::{Ac, AcSweep};
pub use dc::DcSweep;
pub use export::{AnalysisStats, ComplexPoint, RealPoint};
pub use op::OperatingPoint;
pub use transient::Transient;
