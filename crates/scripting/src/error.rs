//! Error types for the scripting crate

use mapscript_core::{ActorId, MapScriptError, UnitId};
use std::fmt;

/// Compilation failure with source location
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} (line {line}, column {column})\n{excerpt}")]
pub struct CompileError {
    pub message: String,
    /// Byte offset into the source
    pub offset: usize,
    /// 1-based
    pub line: usize,
    /// 1-based, in characters
    pub column: usize,
    /// The offending source line with a caret under the column
    pub excerpt: String,
}

impl CompileError {
    /// Build an error pointing at `offset` in `source`
    pub fn at(source: &str, offset: usize, message: impl Into<String>) -> Self {
        let offset = offset.min(source.len());
        let offset = (0..=offset).rev().find(|&i| source.is_char_boundary(i)).unwrap_or(0);

        let line_start = source[..offset].rfind('\n').map_or(0, |i| i + 1);
        let line_end = source[offset..].find('\n').map_or(source.len(), |i| offset + i);
        let line = source[..offset].matches('\n').count() + 1;
        let column = source[line_start..offset].chars().count() + 1;

        let text = source[line_start..line_end].trim_end_matches('\r');
        let excerpt = format!("{}\n{}^", text, " ".repeat(column - 1));

        Self {
            message: message.into(),
            offset,
            line,
            column,
            excerpt,
        }
    }
}

/// Which runaway budget ran out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunawayKind {
    Opcodes,
    Jumps,
}

impl fmt::Display for RunawayKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunawayKind::Opcodes => f.write_str("opcode"),
            RunawayKind::Jumps => f.write_str("jump"),
        }
    }
}

/// Script-specific error types
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    /// Source rejected by the compiler
    #[error("Compile error: {0}")]
    Compile(#[from] CompileError),

    /// A run burst exhausted one of its budgets
    #[error("Runaway script: {0} budget exhausted")]
    Runaway(RunawayKind),

    /// Function invocation on something that is not a native
    #[error("Not callable: {0}")]
    NotCallable(String),

    #[error("Stack underflow")]
    StackUnderflow,

    #[error("Stack overflow")]
    StackOverflow,

    #[error("Call depth limit reached")]
    CallDepth,

    /// Fewer arguments than the native's signature requires
    #[error("'{func}' is missing argument {index}")]
    MissingArgument { func: String, index: usize },

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Unknown unit: {0}")]
    UnknownUnit(UnitId),

    /// The actor is already parked in another script
    #[error("{0} is busy with another script")]
    ActorBusy(ActorId),

    /// No parked state to deliver an answer to
    #[error("{0} has no waiting script")]
    NoState(ActorId),

    /// Other fatal runtime condition
    #[error("Runtime error: {0}")]
    Runtime(String),
}

impl From<ScriptError> for MapScriptError {
    fn from(err: ScriptError) -> Self {
        MapScriptError::Script(err.to_string())
    }
}

/// Result type for scripting operations
pub type Result<T> = std::result::Result<T, ScriptError>;
