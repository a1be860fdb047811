//! Storage errors

use mapscript_core::MapScriptError;
use thiserror::Error;

/// Variable storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },
}

impl From<StorageError> for MapScriptError {
    fn from(err: StorageError) -> Self {
        MapScriptError::Storage(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;
