use std::path::PathBuf;
use thiserror::Error;

pub type VarannoResult<T> = std::result::Result<T, VarannoError>;

#[derive(Debug, Error)]
pub enum VarannoError {
    #[error("{0}")]
    Message(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("Configuration error: {message}")]
    Config { message: String },
    #[error(
        "Tabix index not found for {}: expected {}. Create it using 'tabix -p vcf {}' (or the matching preset)",
        source_path.display(),
        index_path.display(),
        source_path.display()
    )]
    MissingIndex {
        index_path: PathBuf,
        source_path: PathBuf,
    },
    #[error("Corrupt index {}: {message}", path.display())]
    IndexCorrupt { path: PathBuf, message: String },
    #[error("Chromosome {chromosome} not found in index of {}", path.display())]
    ChromosomeNotFound { chromosome: String, path: PathBuf },
    #[error("Malformed record in {}: {message}", path.display())]
    MalformedRecord { path: PathBuf, message: String },
    #[error("Channel receiver closed unexpectedly in {thread} thread")]
    ReceiverClosed { thread: &'static str },
    #[error("Invalid gzip header: {}", path.display())]
    InvalidGzipHeader { path: PathBuf },
}

impl VarannoError {
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

#[macro_export]
macro_rules! varanno_error {
    ($($arg:tt)*) => {
        $crate::error::VarannoError::message(format!($($arg)*))
    };
}

#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::error::VarannoError::config(format!($($arg)*))
    };
}
