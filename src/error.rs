//! Validation errors for the speed calculator.
//!
//! The parameter calculator never fails, so this is the only error type.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpeedInputError {
    #[error("Missing value for {field}")]
    Missing { field: &'static str },
    #[error("Invalid number for {field}: '{value}'")]
    InvalidNumber { field: &'static str, value: String },
    #[error("{field} must not be negative (got {value})")]
    Negative { field: &'static str, value: String },
    #[error("Quantization bits must be greater than zero")]
    ZeroQuantBits,
}

impl SpeedInputError {
    /// Name of the offending form field, if any.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            Self::Missing { field }
            | Self::InvalidNumber { field, .. }
            | Self::Negative { field, .. } => Some(*field),
            Self::ZeroQuantBits => Some("quant_bits"),
        }
    }
}
