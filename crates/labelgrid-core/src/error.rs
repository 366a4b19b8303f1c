use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LabelGridError {
    #[error("Document not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to parse PDF: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Placement failed: page {page} does not exist (document has {page_count} pages)")]
    Placement { page: usize, page_count: usize },

    #[error("PDF operation failed: {0}")]
    OperationError(String),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl LabelGridError {
    /// Wrap an I/O error with the path it happened on
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LabelGridError::Io {
            path: path.into(),
            source,
        }
    }

    /// Map a read failure, turning a missing file into `NotFound`
    pub(crate) fn from_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            LabelGridError::NotFound(path)
        } else {
            LabelGridError::Io { path, source }
        }
    }
}

pub type Result<T> = std::result::Result<T, LabelGridError>;
