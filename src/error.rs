use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("System clock unavailable")]
    ClockUnavailable,

    #[error("Permission denied writing {}", path.display())]
    PermissionDenied { path: PathBuf },

    #[error("Disk full writing {}", path.display())]
    DiskFull { path: PathBuf },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("No interactive elements extracted from page {page_id}")]
    ExtractionEmpty { page_id: u32 },

    #[error("Element cannot be located: {0}")]
    UnextractableElement(String),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to connect to Chrome: {0}")]
    ConnectionFailed(String),

    #[error("Failed to launch Chrome: {0}")]
    LaunchFailed(String),

    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    #[error("No page available")]
    NoPage,

    #[error("CDP error: {0}")]
    CdpError(#[from] chromiumoxide::error::CdpError),

    #[error("Script execution failed: {0}")]
    Script(String),

    #[error("Other error: {0}")]
    Other(String),
}

impl CaptureError {
    /// Classify a filesystem error against the path that was being written.
    pub fn from_io(path: impl AsRef<Path>, source: io::Error) -> Self {
        let path = path.as_ref().to_path_buf();
        match source.kind() {
            io::ErrorKind::PermissionDenied => CaptureError::PermissionDenied { path },
            io::ErrorKind::StorageFull => CaptureError::DiskFull { path },
            _ => CaptureError::Io { path, source },
        }
    }

    /// Run-level failures stop the run; per-page and per-element ones are
    /// logged and the run carries on.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CaptureError::ClockUnavailable
                | CaptureError::PermissionDenied { .. }
                | CaptureError::DiskFull { .. }
                | CaptureError::Io { .. }
                | CaptureError::ConnectionFailed(_)
                | CaptureError::LaunchFailed(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, CaptureError>;
