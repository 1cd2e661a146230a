use thiserror::Error;

/// Unified error type for every library component (C1-C7).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CwError {
    #[error("invalid character for morse: '{0}'")]
    InvalidCharacter(char),

    #[error("invalid representation: '{0}'")]
    InvalidRepresentation(String),

    #[error("invalid parameter '{name}': {value} (must be in {range})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        range: &'static str,
    },

    #[error("cannot set receive speed directly while adaptive mode is enabled")]
    AdaptiveConflict,

    #[error("operation invalid for current receiver state")]
    OutOfOrder,

    #[error("representation buffer is full")]
    BufferFull,

    #[error("tone queue is full")]
    QueueFull,

    #[error("representation does not correspond to any known character")]
    Unrecognizable,

    #[error("audio sink error: {0}")]
    SinkError(String),

    #[error("generator is not running")]
    NotRunning,

    #[error("Farnsworth character speed {0} must be greater than overall speed {1}")]
    InvalidFarnsworth(u32, u32),
}

pub type CwResult<T> = Result<T, CwError>;
