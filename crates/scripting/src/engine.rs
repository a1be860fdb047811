//! Script engine
//!
//! Owns the compiled units, the symbol table, the native library and every
//! variable store that outlives a single run. Runs states in bursts and
//! keeps the ones that park: input waits here, sleeps in the host's timers.

use crate::builtins::{NativeFn, NativeTable};
use crate::context::{Answer, Host, InputKind, Param};
use crate::error::{Result, ScriptError};
use crate::interner::{Interner, SymbolKind};
use crate::lang::bytecode::ScriptCode;
use crate::lang::compiler;
use crate::lang::value::Data;
use crate::lang::vm::Vm;
use crate::state::{ExecutionState, RunState, StateSnapshot, Suspend};
use crate::vars::RegDb;
use mapscript_config::ScriptConfig;
use mapscript_core::{AccountId, ActorId, EntityId, IdGenerator, StateId, Tick, TimerId, UnitId};
use mapscript_storage::{PersistentRegistry, RegValue, VarRecord};
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

/// How a run burst left the script
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The script ended; `result` is a top-level `return` value
    Finished { result: Option<RegValue> },
    /// Parked until [`ScriptEngine::deliver`] brings an answer
    AwaitingInput(InputKind),
    /// Handed to a host timer
    Sleeping { wake_at: Tick },
    /// A woken state was dropped without running
    Discarded,
}

/// Per-actor engine data
#[derive(Debug, Default)]
pub(crate) struct ActorSession {
    /// `@` variables
    pub(crate) temp: RegDb,
    /// Character-persistent variables
    pub(crate) character: RegDb,
    /// The script the actor is attached to
    pub(crate) state: Option<StateId>,
    /// Answer waiting for the re-run of a dialog native
    pub(crate) answer: Option<Answer>,
}

/// The script engine
///
/// # Purpose
/// One per map server. Compiles units, starts and resumes executions, and
/// holds the variable stores scripts share.
///
/// # Thread Safety
/// Single-threaded: units and states use `Rc` and all methods take
/// `&mut self`. Only the global-persistent registry is shared, through an
/// `Arc`, with whatever task flushes it.
pub struct ScriptEngine {
    pub(crate) config: ScriptConfig,
    pub(crate) interner: Interner,
    pub(crate) natives: NativeTable,
    pub(crate) units: HashMap<UnitId, Rc<ScriptCode>>,
    /// Global functions by lowercase name
    pub(crate) functions: HashMap<String, UnitId>,
    pub(crate) globals: Arc<PersistentRegistry>,
    pub(crate) global_temps: RegDb,
    pub(crate) actors: HashMap<ActorId, ActorSession>,
    pub(crate) accounts: HashMap<AccountId, RegDb>,
    /// States waiting for input
    parked: HashMap<StateId, Box<ExecutionState>>,
    /// Sleeping states by owner, with their host timers
    sleepers: HashMap<EntityId, Vec<(StateId, TimerId)>>,
    unit_ids: IdGenerator<UnitId>,
    state_ids: IdGenerator<StateId>,
}

impl ScriptEngine {
    /// Create an engine with an empty global registry
    pub fn new(config: ScriptConfig) -> Self {
        Self::with_globals(config, Arc::new(PersistentRegistry::new()))
    }

    /// Create an engine over an already loaded global registry
    pub fn with_globals(config: ScriptConfig, globals: Arc<PersistentRegistry>) -> Self {
        let natives = NativeTable::standard();
        let mut interner = Interner::new();
        for (index, def) in natives.iter() {
            interner.define(&def.name, SymbolKind::Native, index as i64);
        }
        for param in Param::ALL {
            interner.define(param.name(), SymbolKind::Param, param.code());
        }
        interner.define("true", SymbolKind::Constant, 1);
        interner.define("false", SymbolKind::Constant, 0);

        tracing::debug!("Script engine ready with {} natives", natives.len());

        Self {
            config,
            interner,
            natives,
            units: HashMap::new(),
            functions: HashMap::new(),
            globals,
            global_temps: RegDb::new(),
            actors: HashMap::new(),
            accounts: HashMap::new(),
            parked: HashMap::new(),
            sleepers: HashMap::new(),
            unit_ids: IdGenerator::new(),
            state_ids: IdGenerator::new(),
        }
    }

    pub fn config(&self) -> &ScriptConfig {
        &self.config
    }

    pub fn globals(&self) -> &Arc<PersistentRegistry> {
        &self.globals
    }

    // ========== Compilation ==========

    /// Compile a unit; `name` is used in logs and disassembly
    pub fn compile(&mut self, name: &str, source: &str) -> Result<UnitId> {
        let compiled = compiler::compile(source, &mut self.interner, &self.natives, &self.config)?;
        let id = self.unit_ids.next_id();
        let unit = Rc::new(ScriptCode::new(id, name, compiled));
        tracing::debug!("Compiled {} as {} ({} bytes)", name, id, unit.code().len());
        self.units.insert(id, unit);
        Ok(id)
    }

    /// Compile a global function reachable through `callfunc`
    pub fn register_function(&mut self, name: &str, source: &str) -> Result<UnitId> {
        let id = self.compile(name, source)?;
        if let Some(old) = self.functions.insert(name.to_ascii_lowercase(), id) {
            tracing::warn!("Function '{}' redefined ({} replaces {})", name, id, old);
        }
        Ok(id)
    }

    /// Define an integer constant visible to units compiled afterwards
    pub fn set_constant(&mut self, name: &str, value: i64) -> Result<()> {
        let symbol = self.interner.intern(name);
        match self.interner.kind(symbol) {
            SymbolKind::Unresolved | SymbolKind::Constant => {
                self.interner.define(name, SymbolKind::Constant, value);
                Ok(())
            }
            other => Err(ScriptError::Runtime(format!(
                "cannot define constant '{}': already a {:?}",
                name, other
            ))),
        }
    }

    /// Add or replace a native function
    pub fn register_native(&mut self, name: &str, signature: &str, func: NativeFn) -> Result<()> {
        let symbol = self.interner.intern(name);
        match self.interner.kind(symbol) {
            SymbolKind::Unresolved | SymbolKind::Native => {}
            other => {
                return Err(ScriptError::Runtime(format!(
                    "cannot register native '{}': already a {:?}",
                    name, other
                )))
            }
        }
        let index = self.natives.add(name, signature, func)?;
        self.interner.define(name, SymbolKind::Native, index as i64);
        Ok(())
    }

    pub fn unit(&self, id: UnitId) -> Option<Rc<ScriptCode>> {
        self.units.get(&id).cloned()
    }

    /// Human-readable listing of a unit
    pub fn disassemble(&self, id: UnitId) -> Option<String> {
        self.units.get(&id).map(|unit| unit.disassemble(&self.interner))
    }

    #[cfg(test)]
    pub(crate) fn compiler_parts(&mut self) -> (&mut Interner, &NativeTable, &ScriptConfig) {
        (&mut self.interner, &self.natives, &self.config)
    }

    // ========== Running ==========

    /// Start `unit` at `offset` for `actor` (or [`ActorId::NONE`]) on behalf
    /// of the entity `owner`
    pub fn run(
        &mut self,
        host: &mut dyn Host,
        unit: UnitId,
        offset: usize,
        actor: ActorId,
        owner: EntityId,
    ) -> Result<RunOutcome> {
        let code = self.unit(unit).ok_or(ScriptError::UnknownUnit(unit))?;

        if let Some(actor) = actor.attached() {
            if let Some(busy) = self.actors.get(&actor).and_then(|session| session.state) {
                // clicking the same spot again just keeps the open wait
                return match self.parked.get(&busy) {
                    Some(st) if st.unit_id() == unit && st.pos() == offset => match st.suspend() {
                        Some(Suspend::AwaitingInput(kind)) => Ok(RunOutcome::AwaitingInput(kind)),
                        _ => Err(ScriptError::ActorBusy(actor)),
                    },
                    _ => Err(ScriptError::ActorBusy(actor)),
                };
            }
        }

        let id = self.state_ids.next_id();
        let st = ExecutionState::new(id, code, offset, actor, owner);
        if let Some(actor) = actor.attached() {
            let session = self.actors.entry(actor).or_default();
            session.state = Some(id);
            session.answer = None;
        }
        tracing::debug!("Running {} at {} for {} from {}", unit, offset, actor, owner);
        self.drive(host, Box::new(st))
    }

    /// Resume the state `actor` is waiting in with their answer.
    ///
    /// A dismissed window ([`Answer::Closed`]) ends any wait. Any other
    /// answer of the wrong kind is rejected and the state stays parked.
    pub fn deliver(&mut self, host: &mut dyn Host, actor: ActorId, answer: Answer) -> Result<RunOutcome> {
        let state_id = self
            .actors
            .get(&actor)
            .and_then(|session| session.state)
            .filter(|id| self.parked.contains_key(id))
            .ok_or(ScriptError::NoState(actor))?;
        let kind = match self.parked.get(&state_id).and_then(|st| st.suspend()) {
            Some(Suspend::AwaitingInput(kind)) => kind,
            _ => return Err(ScriptError::NoState(actor)),
        };

        if answer == Answer::Closed && kind != InputKind::Close {
            if let Some(mut st) = self.parked.remove(&state_id) {
                tracing::debug!("{} dismissed the dialog of {}", actor, st.owner());
                st.dialog_open = false;
                self.finish(host, st);
            }
            return Ok(RunOutcome::Finished { result: None });
        }
        if answer.kind() != kind {
            return Err(ScriptError::Runtime(format!(
                "{} answered {:?} to a {:?} prompt",
                actor,
                answer.kind(),
                kind
            )));
        }

        let mut st = self.parked.remove(&state_id).ok_or(ScriptError::NoState(actor))?;
        st.suspend = None;
        self.actors.entry(actor).or_default().answer = Some(answer);
        self.drive(host, st)
    }

    /// Continue a state handed back by a host timer.
    ///
    /// The wake is dropped if the timer was cancelled or already fired, if
    /// the unit was unloaded, or if the attached actor is gone or has walked
    /// away from an open dialog.
    pub fn wake(&mut self, host: &mut dyn Host, state: Box<ExecutionState>) -> Result<RunOutcome> {
        let (id, owner) = (state.id(), state.owner());
        let listed = match self.sleepers.get_mut(&owner) {
            Some(entries) => match entries.iter().position(|&(state_id, _)| state_id == id) {
                Some(i) => {
                    entries.swap_remove(i);
                    if entries.is_empty() {
                        self.sleepers.remove(&owner);
                    }
                    true
                }
                None => false,
            },
            None => false,
        };
        if !listed {
            tracing::debug!("Ignoring stale wake of {:?} from {}", id, owner);
            return Ok(RunOutcome::Discarded);
        }

        if !self.units.contains_key(&state.unit_id()) {
            tracing::debug!("Dropping {:?}: {} was unloaded", id, state.unit_id());
            self.discard(state);
            return Ok(RunOutcome::Discarded);
        }

        if let Some(actor) = state.actor().attached() {
            let Some(info) = host.actor(actor) else {
                tracing::debug!("Dropping {:?}: {} is gone", id, actor);
                self.discard(state);
                return Ok(RunOutcome::Discarded);
            };
            if state.dialog_open() {
                let in_range = host
                    .entity_position(owner)
                    .map_or(false, |npc| info.position.within(&npc, self.config.npc_interaction_range));
                if !in_range {
                    tracing::debug!("Dropping {:?}: {} left the dialog with {}", id, actor, owner);
                    self.finish(host, state);
                    return Ok(RunOutcome::Discarded);
                }
            }
        }

        let mut state = state;
        state.suspend = None;
        self.drive(host, state)
    }

    /// Run a burst and decide where the state goes next
    fn drive(&mut self, host: &mut dyn Host, mut st: Box<ExecutionState>) -> Result<RunOutcome> {
        let result = Vm::new(self, host, &mut st).execute();

        if let Err(err) = result {
            tracing::error!(
                "Script stopped: {} (owner {}, actor {}, {} at offset {})",
                err,
                st.owner(),
                st.actor(),
                st.unit_id(),
                st.pos()
            );
            self.finish(host, st);
            return Err(err);
        }

        match (st.run_state(), st.suspend()) {
            (RunState::RerunLine, _) if st.sleep_ms > 0 => {
                let wake_at = host.now().after(st.sleep_ms);
                st.suspend = Some(Suspend::Sleep { wake_at });
                Ok(self.schedule(host, st, wake_at))
            }
            (RunState::RerunLine, Some(Suspend::AwaitingInput(kind))) => {
                self.parked.insert(st.id(), st);
                Ok(RunOutcome::AwaitingInput(kind))
            }
            (RunState::RerunLine, _) => {
                let name = match st.stack.data.get(st.start) {
                    Some(Data::Name { key, .. }) => self.interner.name(key.symbol()).to_string(),
                    _ => "?".to_string(),
                };
                self.finish(host, st);
                Err(ScriptError::Runtime(format!("'{}' parked without a reason", name)))
            }
            _ => {
                let result = st.result.take();
                self.finish(host, st);
                Ok(RunOutcome::Finished { result })
            }
        }
    }

    fn schedule(&mut self, host: &mut dyn Host, st: Box<ExecutionState>, wake_at: Tick) -> RunOutcome {
        let (id, owner) = (st.id(), st.owner());
        let timer = host.schedule_timer(wake_at, st);
        self.sleepers.entry(owner).or_default().push((id, timer));
        RunOutcome::Sleeping { wake_at }
    }

    /// End a state: close its window and free the actor
    fn finish(&mut self, host: &mut dyn Host, st: Box<ExecutionState>) {
        if let Some(actor) = st.actor().attached() {
            if st.dialog_open() {
                host.end_dialog(actor, st.owner());
            }
            self.release_actor(actor, st.id());
        }
    }

    /// End a state whose actor cannot be talked to
    fn discard(&mut self, st: Box<ExecutionState>) {
        if let Some(actor) = st.actor().attached() {
            self.release_actor(actor, st.id());
        }
    }

    /// Detach `actor` from `state` if that is the script it is in
    pub(crate) fn release_actor(&mut self, actor: ActorId, state: StateId) {
        if let Some(session) = self.actors.get_mut(&actor) {
            if session.state == Some(state) {
                session.state = None;
                session.answer = None;
            }
        }
    }

    // ========== Lifecycle ==========

    /// Forget an actor that left: drops a state waiting on them, clears
    /// their `@` variables and returns the character variables that still
    /// need writing back
    pub fn remove_actor(&mut self, actor: ActorId) -> Vec<VarRecord> {
        let Some(session) = self.actors.remove(&actor) else {
            return Vec::new();
        };
        if let Some(st) = session.state.and_then(|id| self.parked.remove(&id)) {
            tracing::debug!("Dropped {:?} waiting on {}", st.id(), actor);
        }
        if session.character.is_dirty() {
            session.character.records(&self.interner)
        } else {
            Vec::new()
        }
    }

    /// Stop everything an entity started: cancels its sleep timers and
    /// closes dialogs parked on it. Returns the number of states stopped.
    pub fn remove_entity(&mut self, host: &mut dyn Host, owner: EntityId) -> usize {
        let mut stopped = 0;
        for (_, timer) in self.sleepers.remove(&owner).unwrap_or_default() {
            if let Some(st) = host.cancel_timer(timer) {
                self.discard(st);
                stopped += 1;
            }
        }

        let waiting: Vec<StateId> = self
            .parked
            .iter()
            .filter(|(_, st)| st.owner() == owner)
            .map(|(&id, _)| id)
            .collect();
        for id in waiting {
            if let Some(st) = self.parked.remove(&id) {
                self.finish(host, st);
                stopped += 1;
            }
        }

        if stopped > 0 {
            tracing::debug!("Stopped {} script(s) of {}", stopped, owner);
        }
        stopped
    }

    /// Drop a unit: parked states running it are stopped, sleeping ones are
    /// discarded when they wake, and its instance variables go with it
    pub fn unload_unit(&mut self, host: &mut dyn Host, id: UnitId) -> bool {
        let Some(unit) = self.units.remove(&id) else {
            return false;
        };
        self.functions.retain(|_, unit_id| *unit_id != id);

        let uses_unit = |st: &ExecutionState| {
            st.unit_id() == id
                || st
                    .stack
                    .data
                    .iter()
                    .any(|cell| matches!(cell, Data::RetInfo(info) if info.unit == id))
        };
        let affected: Vec<StateId> = self
            .parked
            .iter()
            .filter(|(_, st)| uses_unit(st))
            .map(|(&state_id, _)| state_id)
            .collect();
        for state_id in affected {
            if let Some(st) = self.parked.remove(&state_id) {
                self.finish(host, st);
            }
        }

        tracing::debug!("Unloaded {} ({})", unit.name(), id);
        true
    }

    // ========== Persistence ==========

    /// Load an actor's character variables; the store starts clean
    pub fn load_character(&mut self, actor: ActorId, records: impl IntoIterator<Item = VarRecord>) {
        let session = self.actors.entry(actor).or_default();
        session.character.load(&mut self.interner, records);
    }

    /// Character variables of an actor; marks them written
    pub fn character_records(&mut self, actor: ActorId) -> Vec<VarRecord> {
        match self.actors.get_mut(&actor) {
            Some(session) => {
                session.character.clear_dirty();
                session.character.records(&self.interner)
            }
            None => Vec::new(),
        }
    }

    /// Load an account's `#`/`##` variables; the store starts clean
    pub fn load_account(&mut self, account: AccountId, records: impl IntoIterator<Item = VarRecord>) {
        let store = self.accounts.entry(account).or_default();
        store.load(&mut self.interner, records);
    }

    /// Every account store changed since the last call, as records
    pub fn take_dirty_accounts(&mut self) -> Vec<(AccountId, Vec<VarRecord>)> {
        let interner = &self.interner;
        let mut dirty: Vec<_> = self
            .accounts
            .iter_mut()
            .filter(|(_, store)| store.is_dirty())
            .map(|(&account, store)| {
                store.clear_dirty();
                (account, store.records(interner))
            })
            .collect();
        dirty.sort_by_key(|(account, _)| *account);
        dirty
    }

    /// Write the global-persistent variables if they changed
    pub fn flush_globals(&self) -> mapscript_storage::Result<bool> {
        self.globals.flush_if_dirty(&self.config.global_reg_file)
    }

    /// The state an actor is waiting in, if any
    pub fn parked_state(&self, actor: ActorId) -> Option<&ExecutionState> {
        let id = self.actors.get(&actor)?.state?;
        self.parked.get(&id).map(|st| &**st)
    }

    /// Bring back a suspended state from its snapshot under a fresh id
    pub fn restore(&mut self, host: &mut dyn Host, snapshot: StateSnapshot) -> Result<RunOutcome> {
        let unit = self.unit(snapshot.unit).ok_or(ScriptError::UnknownUnit(snapshot.unit))?;
        let suspend = snapshot.suspend;
        let mut st = Box::new(ExecutionState::from_snapshot(snapshot, unit));
        st.id = self.state_ids.next_id();

        if let Some(actor) = st.actor().attached() {
            let session = self.actors.entry(actor).or_default();
            if session.state.is_some() {
                return Err(ScriptError::ActorBusy(actor));
            }
            session.state = Some(st.id());
        }

        match suspend {
            Some(Suspend::AwaitingInput(kind)) if st.actor().attached().is_some() => {
                self.parked.insert(st.id(), st);
                Ok(RunOutcome::AwaitingInput(kind))
            }
            Some(Suspend::Sleep { wake_at }) => Ok(self.schedule(host, st, wake_at)),
            _ => {
                self.discard(st);
                Err(ScriptError::Runtime("snapshot is not suspended".to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockHost;
    use mapscript_core::{AccountId, MapPosition};

    const PLAYER: ActorId = ActorId::new(9);
    const NPC: EntityId = EntityId::new(500);

    fn engine_with(source: &str) -> (ScriptEngine, MockHost, UnitId) {
        let mut engine = ScriptEngine::new(ScriptConfig::default());
        let mut host = MockHost::new();
        host.add_actor(PLAYER, "Alice");
        let unit = engine.compile("test", source).unwrap();
        (engine, host, unit)
    }

    #[test]
    fn test_busy_actor_rejected() {
        let (mut engine, mut host, unit) = engine_with("{ mes \"a\"; next; }");
        let other = engine.compile("other", "{ return 1; }").unwrap();
        engine.run(&mut host, unit, 0, PLAYER, NPC).unwrap();

        let err = engine.run(&mut host, other, 0, PLAYER, NPC).unwrap_err();
        assert!(matches!(err, ScriptError::ActorBusy(a) if a == PLAYER));
        // other actors and detached runs are unaffected
        assert!(engine.run(&mut host, other, 0, ActorId::NONE, NPC).is_ok());
    }

    #[test]
    fn test_deliver_without_state() {
        let (mut engine, mut host, _) = engine_with("{ end; }");
        let err = engine.deliver(&mut host, PLAYER, Answer::Next).unwrap_err();
        assert!(matches!(err, ScriptError::NoState(_)));
    }

    #[test]
    fn test_fatal_error_frees_actor_and_closes_dialog() {
        let (mut engine, mut host, unit) = engine_with("{ mes \"a\"; next; .@x = 1 / 0; }");
        engine.run(&mut host, unit, 0, PLAYER, NPC).unwrap();
        let err = engine.deliver(&mut host, PLAYER, Answer::Next).unwrap_err();
        assert!(matches!(err, ScriptError::DivisionByZero));
        assert_eq!(host.ended_dialogs, 1);
        assert!(engine.parked_state(PLAYER).is_none());
        assert!(engine.run(&mut host, unit, 0, PLAYER, NPC).is_ok());
    }

    #[test]
    fn test_remove_entity_cancels_sleep() {
        let (mut engine, mut host, unit) = engine_with("{ sleep 1000; set $woke, 1; }");
        let outcome = engine.run(&mut host, unit, 0, ActorId::NONE, NPC).unwrap();
        assert_eq!(outcome, RunOutcome::Sleeping { wake_at: Tick(1000) });
        assert_eq!(host.pending_timers(), 1);

        assert_eq!(engine.remove_entity(&mut host, NPC), 1);
        assert_eq!(host.pending_timers(), 0);
        host.advance(2000);
        assert!(host.fire_due(&mut engine).is_empty());
        assert_eq!(engine.globals().get("$woke", 0), None);
    }

    #[test]
    fn test_stale_wake_discarded() {
        let (mut engine, mut host, unit) = engine_with("{ sleep 10; return 1; }");
        engine.run(&mut host, unit, 0, ActorId::NONE, NPC).unwrap();
        // the owner is removed while the timer is already out of the host's hands
        host.advance(10);
        let due = host.take_due();
        assert_eq!(due.len(), 1);
        engine.remove_entity(&mut host, NPC);
        for state in due {
            assert_eq!(engine.wake(&mut host, state).unwrap(), RunOutcome::Discarded);
        }
    }

    #[test]
    fn test_sleep2_keeps_actor_and_checks_range() {
        let source = "{ mes \"wait\"; .@ok = sleep2(100); mes \"done\"; close; }";
        let (mut engine, mut host, unit) = engine_with(source);
        host.set_entity_position(NPC, MapPosition::new("prontera", 150, 150));
        host.set_actor_position(PLAYER, MapPosition::new("prontera", 152, 150));

        engine.run(&mut host, unit, 0, PLAYER, NPC).unwrap();
        host.advance(100);
        let outcomes = host.fire_due(&mut engine);
        assert_eq!(outcomes[0].as_ref().unwrap(), &RunOutcome::AwaitingInput(InputKind::Close));
        assert_eq!(host.texts(PLAYER), vec!["wait", "done"]);
    }

    #[test]
    fn test_sleep2_out_of_range_discards() {
        let source = "{ mes \"wait\"; sleep2 100; mes \"done\"; }";
        let (mut engine, mut host, unit) = engine_with(source);
        host.set_entity_position(NPC, MapPosition::new("prontera", 150, 150));
        host.set_actor_position(PLAYER, MapPosition::new("prontera", 190, 150));

        engine.run(&mut host, unit, 0, PLAYER, NPC).unwrap();
        host.advance(100);
        let outcomes = host.fire_due(&mut engine);
        assert_eq!(outcomes[0].as_ref().unwrap(), &RunOutcome::Discarded);
        assert_eq!(host.texts(PLAYER), vec!["wait"]);
        assert_eq!(host.ended_dialogs, 1);
        assert!(engine.run(&mut host, unit, 0, PLAYER, NPC).is_ok());
    }

    #[test]
    fn test_sleep_detaches_actor() {
        let (mut engine, mut host, unit) = engine_with("{ sleep 50; return sleep2(0); }");
        engine.run(&mut host, unit, 0, PLAYER, NPC).unwrap();
        // detached while asleep, so the actor is free
        let other = engine.compile("other", "{ return 2; }").unwrap();
        assert!(engine.run(&mut host, other, 0, PLAYER, NPC).is_ok());

        host.advance(50);
        let outcomes = host.fire_due(&mut engine);
        assert_eq!(
            outcomes[0].as_ref().unwrap(),
            &RunOutcome::Finished { result: Some(RegValue::Int(0)) }
        );
    }

    #[test]
    fn test_remove_actor_drops_state_and_temps() {
        let (mut engine, mut host, unit) = engine_with("{ @visits = 3; quest_step = 2; mes \"hi\"; next; }");
        engine.run(&mut host, unit, 0, PLAYER, NPC).unwrap();

        let records = engine.remove_actor(PLAYER);
        assert_eq!(records, vec![VarRecord::new("quest_step", 0, RegValue::Int(2))]);
        assert!(engine.parked_state(PLAYER).is_none());

        let probe = engine.compile("probe", "{ return @visits; }").unwrap();
        let outcome = engine.run(&mut host, probe, 0, PLAYER, NPC).unwrap();
        assert_eq!(outcome, RunOutcome::Finished { result: Some(RegValue::Int(0)) });
    }

    #[test]
    fn test_actor_temp_string_and_int() {
        let (mut engine, mut host, unit) = engine_with("{ @name$ = \"Bob\"; @n = 4; }");
        engine.run(&mut host, unit, 0, PLAYER, NPC).unwrap();
        let probe = engine.compile("probe", "{ return @name$ + @n; }").unwrap();
        let outcome = engine.run(&mut host, probe, 0, PLAYER, NPC).unwrap();
        assert_eq!(outcome, RunOutcome::Finished { result: Some(RegValue::Str("Bob4".into())) });
    }

    #[test]
    fn test_unit_instance_shared_between_runs() {
        let (mut engine, mut host, unit) = engine_with("{ .count += 1; return .count; }");
        for expected in 1..=3 {
            let outcome = engine.run(&mut host, unit, 0, ActorId::NONE, NPC).unwrap();
            assert_eq!(outcome, RunOutcome::Finished { result: Some(RegValue::Int(expected)) });
        }
        // a different unit has its own
        let other = engine.compile("other", "{ return .count; }").unwrap();
        let outcome = engine.run(&mut host, other, 0, ActorId::NONE, NPC).unwrap();
        assert_eq!(outcome, RunOutcome::Finished { result: Some(RegValue::Int(0)) });
    }

    #[test]
    fn test_unit_instance_written_inside_function() {
        let (mut engine, mut host, unit) =
            engine_with("{ function Bump { .hits += 1; return; } Bump(); return .hits; }");
        for expected in 1..=2 {
            let outcome = engine.run(&mut host, unit, 0, ActorId::NONE, NPC).unwrap();
            assert_eq!(outcome, RunOutcome::Finished { result: Some(RegValue::Int(expected)) });
        }
    }

    #[test]
    fn test_account_variables() {
        let (mut engine, mut host, unit) = engine_with("{ #points += 5; return #points; }");
        host.set_account(PLAYER, AccountId::new(2000));
        engine.load_account(AccountId::new(2000), vec![VarRecord::new("#points", 0, RegValue::Int(10))]);
        assert!(engine.take_dirty_accounts().is_empty());

        let outcome = engine.run(&mut host, unit, 0, PLAYER, NPC).unwrap();
        assert_eq!(outcome, RunOutcome::Finished { result: Some(RegValue::Int(15)) });
        let dirty = engine.take_dirty_accounts();
        assert_eq!(dirty.len(), 1);
        assert_eq!(dirty[0].1, vec![VarRecord::new("#points", 0, RegValue::Int(15))]);
    }

    #[test]
    fn test_unload_unit_stops_parked_state() {
        let (mut engine, mut host, unit) = engine_with("{ mes \"hi\"; next; }");
        engine.run(&mut host, unit, 0, PLAYER, NPC).unwrap();
        assert!(engine.unload_unit(&mut host, unit));
        assert!(engine.parked_state(PLAYER).is_none());
        assert!(!engine.unload_unit(&mut host, unit));
        let err = engine.run(&mut host, unit, 0, PLAYER, NPC).unwrap_err();
        assert!(matches!(err, ScriptError::UnknownUnit(_)));
    }

    #[test]
    fn test_globals_flush_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mapreg.txt");
        let config = ScriptConfig {
            global_reg_file: path.clone(),
            ..ScriptConfig::default()
        };
        let mut engine = ScriptEngine::new(config);
        let mut host = MockHost::new();
        let unit = engine.compile("g", "{ $winner$ = \"Alice\"; $round = 3; }").unwrap();

        assert!(!engine.flush_globals().unwrap());
        engine.run(&mut host, unit, 0, ActorId::NONE, NPC).unwrap();
        assert!(engine.flush_globals().unwrap());
        assert!(!engine.flush_globals().unwrap());

        let reloaded = PersistentRegistry::load(&path).unwrap();
        assert_eq!(reloaded.get("$round", 0), Some(RegValue::Int(3)));
        assert_eq!(reloaded.get("$winner$", 0), Some(RegValue::Str("Alice".into())));
    }

    #[test]
    fn test_snapshot_restore_resumes_input() {
        let (mut engine, mut host, unit) = engine_with("{ .@a = 6; mes \"q\"; next; return .@a * 7; }");
        engine.run(&mut host, unit, 0, PLAYER, NPC).unwrap();
        let json = engine.parked_state(PLAYER).unwrap().snapshot_json().unwrap();
        assert!(json.contains("AwaitingInput"));
        let snapshot: StateSnapshot = serde_json::from_str(&json).unwrap();

        engine.remove_actor(PLAYER);
        let outcome = engine.restore(&mut host, snapshot).unwrap();
        assert_eq!(outcome, RunOutcome::AwaitingInput(InputKind::Next));
        let outcome = engine.deliver(&mut host, PLAYER, Answer::Next).unwrap();
        assert_eq!(outcome, RunOutcome::Finished { result: Some(RegValue::Int(42)) });
    }

    #[test]
    fn test_snapshot_restore_mid_compound_assignment() {
        let (mut engine, mut host, unit) = engine_with("{ .@a = 5; .@a += select(\"x:y\"); return .@a; }");
        engine.run(&mut host, unit, 0, PLAYER, NPC).unwrap();
        let json = engine.parked_state(PLAYER).unwrap().snapshot_json().unwrap();
        let snapshot: StateSnapshot = serde_json::from_str(&json).unwrap();
        assert!(snapshot.op2ref.is_some());

        engine.remove_actor(PLAYER);
        let outcome = engine.restore(&mut host, snapshot).unwrap();
        assert_eq!(outcome, RunOutcome::AwaitingInput(InputKind::Menu));
        let outcome = engine.deliver(&mut host, PLAYER, Answer::Menu(2)).unwrap();
        assert_eq!(outcome, RunOutcome::Finished { result: Some(RegValue::Int(7)) });
    }

    #[test]
    fn test_constants() {
        let mut engine = ScriptEngine::new(ScriptConfig::default());
        engine.set_constant("Job_Novice", 0).unwrap();
        engine.set_constant("MAX_LEVEL", 99).unwrap();
        assert!(engine.set_constant("mes", 1).is_err());
        let mut host = MockHost::new();
        let unit = engine.compile("c", "{ return MAX_LEVEL + Job_Novice + true; }").unwrap();
        let outcome = engine.run(&mut host, unit, 0, ActorId::NONE, NPC).unwrap();
        assert_eq!(outcome, RunOutcome::Finished { result: Some(RegValue::Int(100)) });
    }

    #[test]
    fn test_register_native() {
        fn builtin_double(vm: &mut Vm<'_>) -> Result<()> {
            let n = vm.arg_int(0)?;
            vm.push_int(n * 2)
        }
        let mut engine = ScriptEngine::new(ScriptConfig::default());
        engine.register_native("double", "i", builtin_double).unwrap();
        let mut host = MockHost::new();
        let unit = engine.compile("n", "{ return double(21); }").unwrap();
        let outcome = engine.run(&mut host, unit, 0, ActorId::NONE, NPC).unwrap();
        assert_eq!(outcome, RunOutcome::Finished { result: Some(RegValue::Int(42)) });
        assert!(engine.register_native("bad", "x", builtin_double).is_err());
    }
}
