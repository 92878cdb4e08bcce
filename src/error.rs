//! This module defines the single, unified error type for the entire reduction
//! core. It uses the `thiserror` crate to provide ergonomic, context-aware
//! error handling.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DrpError {
    // =========================================================================
    // === High-Level, Semantic Errors (the reduction-contract taxonomy)
    // =========================================================================
    /// A persisted product could not be loaded: I/O shape mismatch, bad magic,
    /// truncation, or inconsistent metadata. The caller never observes a
    /// partially populated container.
    #[error("Malformed product: {0}")]
    MalformedProduct(String),

    /// An input container failed a primitive's precondition. Raised before any
    /// mutation occurs.
    #[error("Input validation failed for primitive '{primitive}': {reason}")]
    PrimitiveValidation { primitive: String, reason: String },

    /// A primitive's internal processing failed. Wraps the underlying
    /// numeric or I/O failure.
    #[error("Primitive '{primitive}' failed: {source}")]
    PrimitiveExecution {
        primitive: String,
        #[source]
        source: Box<DrpError>,
    },

    /// A step depends on a binding that was never produced (typically the
    /// output of a failed optional step).
    #[error("Missing binding '{0}' in execution context")]
    MissingBinding(String),

    /// The calibration registry found no matching frame within constraints.
    #[error("No matching calibration found: {0}")]
    CalibrationNotFound(String),

    /// Malformed recipe or configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal logic error (this is a bug).
    #[error("Internal logic error (this is a bug): {0}")]
    Internal(String),

    // =========================================================================
    // === External Error Wrappers (Using #[from] for automatic conversion)
    // =========================================================================
    /// An error originating from the underlying I/O subsystem.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An error from the Serde JSON library, typically during recipe/metadata
    /// serialization.
    #[error("Serde JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    /// An error from a safe byte-casting operation failing.
    #[error("Byte slice casting error: {0}")]
    PodCast(String), // Manual `From` impl; bytemuck::PodCastError doesn't impl Error.
}

// =============================================================================
// === Manual `From` Implementations ===
// =============================================================================

impl From<bytemuck::PodCastError> for DrpError {
    fn from(err: bytemuck::PodCastError) -> Self {
        DrpError::PodCast(err.to_string())
    }
}

impl DrpError {
    /// Wraps any non-validation failure as a `PrimitiveExecution` error for
    /// the named primitive. Validation and binding errors keep their identity,
    /// so the abort policy can tell the taxonomy apart.
    pub fn into_execution_failure(self, primitive: &str) -> DrpError {
        match self {
            DrpError::PrimitiveValidation { .. }
            | DrpError::MissingBinding(_)
            | DrpError::PrimitiveExecution { .. } => self,
            other => DrpError::PrimitiveExecution {
                primitive: primitive.to_string(),
                source: Box::new(other),
            },
        }
    }
}
