//! Circuit graph representation and validation.
//!
//! This module provides the representation of a circuit before simulation.
//! The [`Circuit`] struct holds all components in order, and [`Unknowns`]
//! owns the index space that binding assigns to nodes, branch currents, and
//! internal nodes.

mod graph;
mod nodes;
mod types;
mod validate;

pub use graph::Circuit;
pub use nodes::{is_ground_name, Unknowns};
pub use types::*;
pub use validate::{load_order, validate_circuit};
