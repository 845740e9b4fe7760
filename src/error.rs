use std::path::PathBuf;
use thiserror::Error;

/// Failures of a single injection run.
///
/// A run either completes and commits its ledger entry, or fails with one of
/// these variants and leaves neither a ledger entry nor half-mirrored output.
#[derive(Debug, Error)]
pub enum InjectionError {
    #[error("Unknown fault type: {0:?}")]
    UnknownFaultKind(String),

    #[error("Percentage must be in 1..=100, got {0}")]
    InvalidPercentage(u32),

    #[error("{fault} at {percentage}% maps to a 0x0 structuring element (use at least 5%)")]
    DegenerateKernel { fault: String, percentage: u32 },

    #[error("I/O failure on {}: {source}", .path.display())]
    IOFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Image failure on {}: {source}", .path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("No images found in {}", .0.display())]
    EmptyCatalog(PathBuf),

    #[error(
        "{}: You can only two repeated fi process in same fi output folder. \
         Please use different 'FI Image Folder'.",
        .0.display()
    )]
    LedgerExhausted(PathBuf),

    #[error("Malformed ledger log {}: {reason}", .path.display())]
    LedgerFormat { path: PathBuf, reason: String },

    #[error("Worker pool failure: {0}")]
    WorkerPool(String),
}

impl InjectionError {
    /// Wrap an `std::io::Error` together with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        InjectionError::IOFailure {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, InjectionError>;
