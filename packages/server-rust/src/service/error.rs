use crate::resolution::ResolutionError;

/// Errors returned by the inbound message pipeline to the hosting transport.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("tenant resolution failed: {0}")]
    Resolution(#[from] ResolutionError),
    #[error("handler failed: {0}")]
    Handler(#[from] anyhow::Error),
}

impl PipelineError {
    /// Label used in logs and metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Resolution(_) => "resolution",
            Self::Handler(_) => "handler",
        }
    }
}
