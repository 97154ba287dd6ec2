use thiserror::Error;

/// Failure reported for a dispatched frame.
///
/// Delivered to listeners by reference and forwarded over channels, so it
/// carries rendered messages rather than source errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DetectionError {
    #[error("detector failed: {0}")]
    Backend(String),
    #[error("detector dropped the task without reporting a result")]
    Abandoned,
    #[error("detector backend lock poisoned")]
    Poisoned,
}

impl DetectionError {
    /// Wrap a backend error, keeping its context chain in the message.
    pub fn backend(err: anyhow::Error) -> Self {
        DetectionError::Backend(format!("{:#}", err))
    }
}
