//! # MapScript Scripting Engine
//!
//! Compiles NPC scripts to bytecode and runs them on a stack VM embedded in
//! a map server.
//!
//! ## Features
//! - Single-pass compiler with labels, user functions and structured control flow
//! - Re-entrant stack VM with runaway protection
//! - Eight variable scopes, from call-local to global-persistent
//! - Dialog natives that park the script until the player answers
//! - `sleep`/`sleep2` through host timers
//!
//! ## Embedding
//!
//! The server implements [`Host`] and drives a [`ScriptEngine`]:
//!
//! ```ignore
//! let mut engine = ScriptEngine::new(ScriptConfig::default());
//! let unit = engine.compile("Kafra", source)?;
//! match engine.run(&mut host, unit, 0, actor, npc)? {
//!     RunOutcome::AwaitingInput(_) => { /* later: engine.deliver(&mut host, actor, answer) */ }
//!     RunOutcome::Sleeping { .. } => { /* the host timer calls engine.wake(...) */ }
//!     _ => {}
//! }
//! ```

pub mod builtins;
pub mod context;
pub mod engine;
pub mod error;
pub mod interner;
pub mod lang;
pub mod state;
pub mod timer;
pub mod vars;

#[cfg(test)]
pub(crate) mod testing;

pub use builtins::{NativeFn, NativeTable, Signature, MENU_CANCEL};
pub use context::{ActorInfo, Answer, Host, HostAction, InputKind, ItemRef, Param};
pub use engine::{RunOutcome, ScriptEngine};
pub use error::{CompileError, Result, RunawayKind, ScriptError};
pub use lang::{ScriptCode, Vm};
pub use state::{ExecutionState, RunState, StateSnapshot, Suspend};
pub use timer::TimerQueue;
