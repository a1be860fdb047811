//! Execution state
//!
//! One suspended-or-running script invocation. A state owns its whole
//! evaluation stack and call-local variables, so parking it (for input or
//! a timer) needs nothing more than moving the box somewhere.

use crate::context::InputKind;
use crate::lang::bytecode::ScriptCode;
use crate::lang::value::Data;
use crate::vars::RegDb;
use mapscript_core::{ActorId, EntityId, StateId, Tick, UnitId};
use mapscript_storage::RegValue;
use serde::{Deserialize, Serialize};
use std::rc::Rc;

/// Run state of an execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Running,
    /// Re-invoke the current native on resume (input or sleep)
    RerunLine,
    /// A native moved `pos`
    Goto,
    /// `return` inside a user function
    Returning,
    Ended,
}

/// Why a state is parked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Suspend {
    AwaitingInput(InputKind),
    Sleep { wake_at: Tick },
}

/// Evaluation stack plus the call-local dictionaries of every frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptStack {
    pub(crate) data: Vec<Data>,
    /// Base of the current frame
    pub(crate) defsp: usize,
    /// Index 0 is the top-level scope
    pub(crate) scopes: Vec<RegDb>,
}

impl ScriptStack {
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            defsp: 0,
            scopes: vec![RegDb::new()],
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Current user-function nesting
    pub fn call_depth(&self) -> usize {
        self.scopes.len() - 1
    }

    /// Remove `start..end`, shifting the rest down and fixing the frame base
    pub(crate) fn pop_range(&mut self, start: usize, end: usize) -> usize {
        let end = end.min(self.data.len());
        if start >= end {
            return 0;
        }
        self.data.drain(start..end);
        let delta = end - start;
        shift_index(&mut self.defsp, start, end, delta);
        delta
    }
}

impl Default for ScriptStack {
    fn default() -> Self {
        Self::new()
    }
}

/// Adjust a stack index after `start..end` was removed
pub(crate) fn shift_index(index: &mut usize, start: usize, end: usize, delta: usize) {
    if *index >= end {
        *index -= delta;
    } else if *index > start {
        *index = start;
    }
}

/// One script invocation
///
/// # Purpose
/// Holds everything needed to continue a script: the code unit and offset,
/// the stack, the attached actor and the owning entity. The engine moves
/// states between its parked table and host timers; nothing else keeps a
/// reference to them.
#[derive(Debug)]
pub struct ExecutionState {
    pub(crate) id: StateId,
    pub(crate) actor: ActorId,
    pub(crate) owner: EntityId,
    pub(crate) unit: Rc<ScriptCode>,
    pub(crate) pos: usize,
    pub(crate) stack: ScriptStack,
    /// Window of the native being run: callee cell
    pub(crate) start: usize,
    /// Window of the native being run: one past the last argument
    pub(crate) end: usize,
    pub(crate) run: RunState,
    pub(crate) suspend: Option<Suspend>,
    /// Requested sleep; non-zero until the sleeping native is re-run
    pub(crate) sleep_ms: u64,
    /// Stack index of the reference the next binary operator keeps
    pub(crate) op2ref: Option<usize>,
    pub(crate) dialog_open: bool,
    pub(crate) result: Option<RegValue>,
}

impl ExecutionState {
    pub(crate) fn new(id: StateId, unit: Rc<ScriptCode>, pos: usize, actor: ActorId, owner: EntityId) -> Self {
        Self {
            id,
            actor,
            owner,
            unit,
            pos,
            stack: ScriptStack::new(),
            start: 0,
            end: 0,
            run: RunState::Running,
            suspend: None,
            sleep_ms: 0,
            op2ref: None,
            dialog_open: false,
            result: None,
        }
    }

    pub fn id(&self) -> StateId {
        self.id
    }

    pub fn actor(&self) -> ActorId {
        self.actor
    }

    pub fn owner(&self) -> EntityId {
        self.owner
    }

    pub fn unit_id(&self) -> UnitId {
        self.unit.id()
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn run_state(&self) -> RunState {
        self.run
    }

    pub fn suspend(&self) -> Option<Suspend> {
        self.suspend
    }

    pub fn stack(&self) -> &ScriptStack {
        &self.stack
    }

    pub fn dialog_open(&self) -> bool {
        self.dialog_open
    }

    /// Serializable copy of the whole state
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            id: self.id,
            actor: self.actor,
            owner: self.owner,
            unit: self.unit.id(),
            pos: self.pos,
            stack: self.stack.clone(),
            start: self.start,
            end: self.end,
            run: self.run,
            suspend: self.suspend,
            sleep_ms: self.sleep_ms,
            op2ref: self.op2ref,
            dialog_open: self.dialog_open,
        }
    }

    /// Snapshot rendered as pretty JSON, for logs and debugging
    pub fn snapshot_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.snapshot())
    }

    pub(crate) fn from_snapshot(snapshot: StateSnapshot, unit: Rc<ScriptCode>) -> Self {
        Self {
            id: snapshot.id,
            actor: snapshot.actor,
            owner: snapshot.owner,
            unit,
            pos: snapshot.pos,
            stack: snapshot.stack,
            start: snapshot.start,
            end: snapshot.end,
            run: snapshot.run,
            suspend: snapshot.suspend,
            sleep_ms: snapshot.sleep_ms,
            op2ref: snapshot.op2ref,
            dialog_open: snapshot.dialog_open,
            result: None,
        }
    }
}

/// Plain-data form of an [`ExecutionState`]; code is referenced by unit id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub id: StateId,
    pub actor: ActorId,
    pub owner: EntityId,
    pub unit: UnitId,
    pub pos: usize,
    pub stack: ScriptStack,
    pub start: usize,
    pub end: usize,
    pub run: RunState,
    pub suspend: Option<Suspend>,
    pub sleep_ms: u64,
    /// Pending compound-assignment operand, see [`ExecutionState`]
    #[serde(default)]
    pub op2ref: Option<usize>,
    pub dialog_open: bool,
}
