use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RotbackError>;

#[derive(Debug, Error)]
pub enum RotbackError {
    #[error("store not available at '{}': missing or not a directory", .0.display())]
    StoreUnavailable(PathBuf),

    #[error("naming conflict: '{}' already exists", .0.display())]
    NamingConflict(PathBuf),

    #[error("I/O error at '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("store is locked by another process (lock: {})", .0.display())]
    Locked(PathBuf),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("transfer failed: {0}")]
    Transfer(String),

    #[error("operation interrupted")]
    Interrupted,

    #[error("I/O error: {0}")]
    Unscoped(#[from] std::io::Error),
}

impl RotbackError {
    /// Attach the offending path to an I/O error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RotbackError::Io {
            path: path.into(),
            source,
        }
    }

    /// The path this error is about, if it names one.
    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            RotbackError::StoreUnavailable(p)
            | RotbackError::NamingConflict(p)
            | RotbackError::Locked(p) => Some(p),
            RotbackError::Io { path, .. } => Some(path),
            _ => None,
        }
    }
}

/// Extension for tagging `std::io::Result` values with a path.
pub(crate) trait IoResultExt<T> {
    fn at(self, path: &std::path::Path) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn at(self, path: &std::path::Path) -> Result<T> {
        self.map_err(|e| RotbackError::io(path, e))
    }
}
