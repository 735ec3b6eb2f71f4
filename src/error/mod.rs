use thiserror::Error;
use tracing::error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by dataset operations. None of them are retried or undone.
#[derive(Debug, Error)]
pub enum Error {
    #[error("storage fault during {step}: {source}")]
    StorageFault {
        step: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),
    #[error("read of [{start}, {start}+{count}) exceeds extent {extent}")]
    OutOfRange { start: u64, count: u64, extent: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    StorageFault,
    ShapeMismatch,
    OutOfRange,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::StorageFault { .. } => ErrorKind::StorageFault,
            Error::ShapeMismatch(_) => ErrorKind::ShapeMismatch,
            Error::OutOfRange { .. } => ErrorKind::OutOfRange,
        }
    }

    pub(crate) fn shape(reason: impl Into<String>) -> Self {
        Error::ShapeMismatch(reason.into())
    }
}

/// Turns a failed backend call into a `StorageFault` naming the step that
/// failed. The fault is logged here, before it reaches the caller.
pub(crate) trait Step<T> {
    fn step(self, step: &str) -> Result<T>;
}

impl<T> Step<T> for anyhow::Result<T> {
    fn step(self, step: &str) -> Result<T> {
        self.map_err(|err| {
            error!(step, error = %err, "storage call failed");
            Error::StorageFault {
                step: step.to_owned(),
                source: err.into(),
            }
        })
    }
}
