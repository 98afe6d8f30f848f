/// Convenience result type used across Cadence.
pub type CadenceResult<T> = Result<T, CadenceError>;

/// Top-level error taxonomy used by the core APIs.
///
/// Most degenerate inputs in this crate are deliberately *not* errors:
/// structural graph failures return `false`, missing keyframes return
/// `None`, and illegal timeline configuration is a guarded no-op. Errors
/// are reserved for record loading and validation entry points.
#[derive(thiserror::Error, Debug)]
pub enum CadenceError {
    /// Invalid user-provided or document data.
    #[error("validation error: {0}")]
    Validation(String),

    /// Errors while editing or evaluating a keyframe channel.
    #[error("channel error: {0}")]
    Channel(String),

    /// Errors in timeline orchestration state.
    #[error("timeline error: {0}")]
    Timeline(String),

    /// Errors when loading or saving channel records.
    #[error("record error: {0}")]
    Record(String),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CadenceError {
    /// Build a [`CadenceError::Validation`] value.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`CadenceError::Channel`] value.
    pub fn channel(msg: impl Into<String>) -> Self {
        Self::Channel(msg.into())
    }

    /// Build a [`CadenceError::Timeline`] value.
    pub fn timeline(msg: impl Into<String>) -> Self {
        Self::Timeline(msg.into())
    }

    /// Build a [`CadenceError::Record`] value.
    pub fn record(msg: impl Into<String>) -> Self {
        Self::Record(msg.into())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
