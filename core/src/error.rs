use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WlanError {
    #[error("Invalid rate index {0} (expected 0..=7)")]
    InvalidRate(u8),

    #[error("Invalid payload length {0} (expected 1..=4095)")]
    InvalidLength(usize),

    #[error("Payload too short: expected {expected} bytes, got {actual}")]
    PayloadTooShort { expected: usize, actual: usize },

    #[error("Frame generator used before a frame was assembled")]
    NotAssembled,

    #[error("Unknown SIGNAL rate code {0:#06b}")]
    InvalidRateCode(u8),

    #[error("Invalid input size: expected {expected}, got {actual}")]
    InvalidInputSize { expected: usize, actual: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, WlanError>;
