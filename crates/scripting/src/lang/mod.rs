//! The script language: lexer, single-pass compiler, bytecode and VM

pub mod bytecode;
pub(crate) mod compiler;
mod expr;
pub mod lexer;
mod stmt;
pub mod value;
pub mod vm;

pub use bytecode::{OpCode, ScriptCode};
pub use value::{Data, MAX_ARRAY_SLOTS};
pub use vm::Vm;
