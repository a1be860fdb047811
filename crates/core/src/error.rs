//! Core error types for MapScript

#[derive(thiserror::Error, Debug)]
pub enum MapScriptError {
    #[error("Script error: {0}")]
    Script(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

pub type Result<T> = std::result::Result<T, MapScriptError>;
