//! Test support: an in-memory host and compile/run shortcuts

use crate::context::{ActorInfo, Host, HostAction, InputKind, Param};
use crate::engine::{RunOutcome, ScriptEngine};
use crate::error::{Result, ScriptError};
use crate::lang::bytecode::{read_cstr, read_varint, OpCode};
use crate::state::ExecutionState;
use crate::timer::TimerQueue;
use mapscript_core::{AccountId, ActorId, EntityId, MapPosition, Tick, TimerId};
use mapscript_storage::RegValue;
use std::collections::HashMap;

/// Actor attached by [`run_source`]
pub const TEST_ACTOR: ActorId = ActorId::new(1);

/// Host that records what scripts asked for
#[derive(Default)]
pub struct MockHost {
    now: Tick,
    actors: HashMap<ActorId, ActorInfo>,
    attributes: HashMap<(ActorId, Param), i64>,
    entities: HashMap<EntityId, MapPosition>,
    texts: Vec<(ActorId, String)>,
    timers: TimerQueue<Box<ExecutionState>>,
    pub last_menu: Vec<String>,
    pub inputs: Vec<InputKind>,
    pub ended_dialogs: usize,
    /// `Debug` rendering of every action performed
    pub actions: Vec<String>,
    /// Value `perform` returns
    pub action_result: i64,
}

impl MockHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_actor(&mut self, actor: ActorId, name: &str) {
        self.actors.insert(
            actor,
            ActorInfo {
                name: name.to_string(),
                account: AccountId::new(actor.get() + 1000),
                position: MapPosition::new("prontera", 150, 150),
            },
        );
    }

    pub fn set_account(&mut self, actor: ActorId, account: AccountId) {
        if let Some(info) = self.actors.get_mut(&actor) {
            info.account = account;
        }
    }

    pub fn set_actor_position(&mut self, actor: ActorId, position: MapPosition) {
        if let Some(info) = self.actors.get_mut(&actor) {
            info.position = position;
        }
    }

    pub fn set_entity_position(&mut self, entity: EntityId, position: MapPosition) {
        self.entities.insert(entity, position);
    }

    pub fn set_attribute(&mut self, actor: ActorId, param: Param, value: i64) {
        self.attributes.insert((actor, param), value);
    }

    pub fn attribute(&self, actor: ActorId, param: Param) -> i64 {
        self.attributes.get(&(actor, param)).copied().unwrap_or(0)
    }

    /// Dialog text shown to an actor, in order
    pub fn texts(&self, actor: ActorId) -> Vec<String> {
        self.texts
            .iter()
            .filter(|(to, _)| *to == actor)
            .map(|(_, text)| text.clone())
            .collect()
    }

    pub fn advance(&mut self, ms: u64) {
        self.now = self.now.after(ms);
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    /// Pull due states out without waking them
    pub fn take_due(&mut self) -> Vec<Box<ExecutionState>> {
        std::iter::from_fn(|| self.timers.pop_due(self.now).map(|(_, state)| state)).collect()
    }

    /// Wake every due state in deadline order
    pub fn fire_due(&mut self, engine: &mut ScriptEngine) -> Vec<Result<RunOutcome>> {
        let mut outcomes = Vec::new();
        while let Some((_, state)) = self.timers.pop_due(self.now) {
            outcomes.push(engine.wake(self, state));
        }
        outcomes
    }
}

impl Host for MockHost {
    fn now(&self) -> Tick {
        self.now
    }

    fn actor(&self, actor: ActorId) -> Option<ActorInfo> {
        self.actors.get(&actor).cloned()
    }

    fn entity_position(&self, entity: EntityId) -> Option<MapPosition> {
        self.entities.get(&entity).cloned()
    }

    fn show_text(&mut self, actor: ActorId, _owner: EntityId, text: &str) {
        self.texts.push((actor, text.to_string()));
    }

    fn show_next(&mut self, _actor: ActorId, _owner: EntityId) {}

    fn show_close(&mut self, _actor: ActorId, _owner: EntityId) {}

    fn open_menu(&mut self, _actor: ActorId, _owner: EntityId, options: &[String]) {
        self.last_menu = options.to_vec();
    }

    fn open_input(&mut self, _actor: ActorId, _owner: EntityId, kind: InputKind) {
        self.inputs.push(kind);
    }

    fn end_dialog(&mut self, _actor: ActorId, _owner: EntityId) {
        self.ended_dialogs += 1;
    }

    fn read_attribute(&self, actor: ActorId, param: Param) -> i64 {
        self.attribute(actor, param)
    }

    fn write_attribute(&mut self, actor: ActorId, param: Param, value: i64) -> bool {
        self.set_attribute(actor, param, value);
        true
    }

    fn perform(&mut self, _actor: ActorId, _owner: EntityId, action: HostAction<'_>) -> i64 {
        self.actions.push(format!("{:?}", action));
        self.action_result
    }

    fn schedule_timer(&mut self, wake_at: Tick, state: Box<ExecutionState>) -> TimerId {
        self.timers.schedule(wake_at, state)
    }

    fn cancel_timer(&mut self, timer: TimerId) -> Option<Box<ExecutionState>> {
        self.timers.cancel(timer)
    }
}

/// Opcodes of a compiled script, operands skipped
pub fn compile_ops(source: &str) -> Vec<OpCode> {
    let mut engine = ScriptEngine::new(Default::default());
    let id = engine.compile("ops", source).unwrap();
    let unit = engine.unit(id).unwrap();
    let code = unit.code();

    let mut ops = Vec::new();
    let mut pos = 0;
    while pos < code.len() {
        let op = OpCode::from_byte(code[pos]).unwrap();
        pos += 1;
        pos = match op {
            OpCode::Int => read_varint(code, pos).unwrap().1,
            OpCode::Str => read_cstr(code, pos).unwrap().1,
            OpCode::Pos | OpCode::Name => pos + 3,
            _ => pos,
        };
        ops.push(op);
    }
    ops
}

/// Message of the compile error `source` must produce
pub fn compile_error(source: &str) -> String {
    let mut engine = ScriptEngine::new(Default::default());
    match engine.compile("bad", source) {
        Err(ScriptError::Compile(err)) => err.message,
        Err(other) => panic!("expected a compile error, got {}", other),
        Ok(_) => panic!("compiled: {}", source),
    }
}

/// Run a script to completion with [`TEST_ACTOR`] attached
pub fn run_source(source: &str) -> Option<RegValue> {
    let mut engine = ScriptEngine::new(Default::default());
    let mut host = MockHost::new();
    host.add_actor(TEST_ACTOR, "Tester");
    let unit = engine.compile("test", source).unwrap();
    match engine.run(&mut host, unit, 0, TEST_ACTOR, EntityId::new(1)) {
        Ok(RunOutcome::Finished { result }) => result,
        other => panic!("script did not finish: {:?}", other),
    }
}
