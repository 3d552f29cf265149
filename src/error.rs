//! Error types for the Nodal circuit simulator.
//!
//! This module provides a unified error type [`NodalError`] that covers
//! structural problems found while binding a circuit, failures of the sparse
//! linear system, and numerical failures during analysis.

use thiserror::Error;

/// Result type alias using [`NodalError`].
pub type Result<T> = std::result::Result<T, NodalError>;

/// Unified error type for all Nodal operations.
#[derive(Error, Debug)]
pub enum NodalError {
    // ============ Structural Errors ============
    /// A device was connected with the wrong number of pins
    #[error("Pin count mismatch for '{name}': {expected} pins expected, {given} given")]
    PinMismatch {
        name: String,
        expected: usize,
        given: usize,
    },

    /// A device references an entity that is not in the circuit
    #[error("'{name}' references '{referenced}', which is not in the circuit")]
    MissingEntity { name: String, referenced: String },

    /// A referenced entity exists but cannot provide what is needed
    #[error("'{name}' requires '{referenced}' to be {expected}")]
    UnresolvedBehavior {
        name: String,
        referenced: String,
        expected: &'static str,
    },

    /// Entities depend on each other in a loop
    #[error("Dependency cycle involving '{name}'")]
    DependencyCycle { name: String },

    /// Duplicate entity name
    #[error("Duplicate entity name '{name}'")]
    DuplicateEntity { name: String },

    /// Node not found in circuit
    #[error("Node '{node}' not found in circuit")]
    NodeNotFound { node: String },

    /// Entity does not export the requested property
    #[error("'{entity}' has no property '{property}'")]
    UnknownProperty { entity: String, property: String },

    /// Invalid parameter value
    #[error("Invalid parameter '{param}' for '{entity}': {message}")]
    InvalidParameter {
        entity: String,
        param: String,
        message: String,
    },

    /// Invalid circuit topology
    #[error("Invalid circuit topology: {message}")]
    InvalidTopology { message: String },

    // ============ Linear System Errors ============
    /// No usable pivot remains; the system is rank deficient
    #[error("Singular matrix at row {row}, column {col} - circuit may have a floating node or a voltage loop")]
    Singular { row: usize, col: usize },

    /// Operation called out of order (e.g. solve before factor)
    #[error("Invalid state: {message}")]
    InvalidState { message: String },

    /// New matrix structure requested after the structure was frozen
    #[error("Matrix structure is frozen; element ({row}, {col}) cannot be added")]
    StructureFrozen { row: usize, col: usize },

    // ============ Simulation Errors ============
    /// Newton-Raphson and every convergence aid failed
    #[error("No convergence at {point}")]
    NoConvergence { point: String },

    /// Transient step shrank below the configured floor
    #[error("Timestep too small at t = {time:.6e}s (step {step:.3e}s)")]
    TimestepTooSmall { time: f64, step: f64 },

    /// Invalid simulation parameter
    #[error("Invalid simulation parameter: {message}")]
    InvalidSimulationParam { message: String },
}

impl NodalError {
    /// Create a pin mismatch error
    pub fn pin_mismatch(name: impl Into<String>, expected: usize, given: usize) -> Self {
        Self::PinMismatch {
            name: name.into(),
            expected,
            given,
        }
    }

    /// Create an invalid state error
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter(
        entity: impl Into<String>,
        param: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidParameter {
            entity: entity.into(),
            param: param.into(),
            message: message.into(),
        }
    }

    /// Create an invalid simulation parameter error
    pub fn invalid_simulation_param(message: impl Into<String>) -> Self {
        Self::InvalidSimulationParam {
            message: message.into(),
        }
    }

    /// Create a no-convergence error
    pub fn no_convergence(point: impl Into<String>) -> Self {
        Self::NoConvergence {
            point: point.into(),
        }
    }

    /// Whether this error only invalidates the current solve point.
    ///
    /// DC sweeps may skip such points; every other error aborts the analysis.
    pub fn is_point_failure(&self) -> bool {
        matches!(self, Self::NoConvergence { .. })
    }
}
