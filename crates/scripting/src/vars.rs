//! Script variables
//!
//! Every variable is an array of up to [`MAX_ARRAY_SLOTS`] slots; a plain
//! `name` is element 0. Writing zero or the empty string deletes a slot,
//! and the size of an array is its highest used index plus one.

use crate::error::{Result, ScriptError};
use crate::interner::{Interner, SymbolId, SymbolKind, VarScope};
use crate::lang::value::{Data, ScopeRef, VarKey, MAX_ARRAY_SLOTS};
use crate::lang::vm::Vm;
use crate::Param;
use mapscript_storage::{PersistentRegistry, RegValue, VarRecord};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

/// Slots of one array variable, trailing empties trimmed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegArray {
    slots: Vec<Option<RegValue>>,
}

impl RegArray {
    pub fn get(&self, index: u32) -> Option<&RegValue> {
        self.slots.get(index as usize).and_then(Option::as_ref)
    }

    pub fn set(&mut self, index: u32, value: RegValue) {
        let index = index as usize;
        if value.is_empty() {
            if index < self.slots.len() {
                self.slots[index] = None;
                while matches!(self.slots.last(), Some(None)) {
                    self.slots.pop();
                }
            }
            return;
        }
        if index >= self.slots.len() {
            self.slots.resize(index + 1, None);
        }
        self.slots[index] = Some(value);
    }

    /// Highest used index plus one
    pub fn size(&self) -> u32 {
        self.slots.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &RegValue)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|v| (i as u32, v)))
    }
}

/// A variable dictionary keyed by symbol
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegDb {
    vars: HashMap<SymbolId, RegArray>,
    #[serde(skip)]
    dirty: bool,
}

impl RegDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, symbol: SymbolId, index: u32) -> Option<&RegValue> {
        self.vars.get(&symbol).and_then(|array| array.get(index))
    }

    pub fn set(&mut self, symbol: SymbolId, index: u32, value: RegValue) {
        if value.is_empty() {
            if let Some(array) = self.vars.get_mut(&symbol) {
                array.set(index, value);
                if array.is_empty() {
                    self.vars.remove(&symbol);
                }
                self.dirty = true;
            }
            return;
        }
        self.vars.entry(symbol).or_default().set(index, value);
        self.dirty = true;
    }

    pub fn size(&self, symbol: SymbolId) -> u32 {
        self.vars.get(&symbol).map_or(0, RegArray::size)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    /// Fill from persisted records; the result starts clean
    pub fn load(&mut self, interner: &mut Interner, records: impl IntoIterator<Item = VarRecord>) {
        for record in records {
            let symbol = interner.intern(&record.name);
            if record.index < MAX_ARRAY_SLOTS {
                self.set(symbol, record.index, record.value);
            }
        }
        self.dirty = false;
    }

    /// Export as records, sorted by name then index
    pub fn records(&self, interner: &Interner) -> Vec<VarRecord> {
        let mut records: Vec<VarRecord> = self
            .vars
            .iter()
            .flat_map(|(&symbol, array)| {
                let name = interner.name(symbol).to_ascii_lowercase();
                array
                    .iter()
                    .map(move |(index, value)| VarRecord::new(name.clone(), index, value.clone()))
            })
            .collect();
        records.sort_by(|a, b| a.name.cmp(&b.name).then(a.index.cmp(&b.index)));
        records
    }
}

/// Uniform slot access over the different variable stores
pub trait VarStore {
    fn get(&self, symbol: SymbolId, index: u32) -> Option<RegValue>;
    fn set(&mut self, symbol: SymbolId, index: u32, value: RegValue);
    fn size(&self, symbol: SymbolId) -> u32;
}

impl VarStore for RegDb {
    fn get(&self, symbol: SymbolId, index: u32) -> Option<RegValue> {
        RegDb::get(self, symbol, index).cloned()
    }

    fn set(&mut self, symbol: SymbolId, index: u32, value: RegValue) {
        RegDb::set(self, symbol, index, value)
    }

    fn size(&self, symbol: SymbolId) -> u32 {
        RegDb::size(self, symbol)
    }
}

/// Name-keyed view of the shared persistent registry
struct GlobalView<'a> {
    registry: &'a PersistentRegistry,
    interner: &'a Interner,
}

impl VarStore for GlobalView<'_> {
    fn get(&self, symbol: SymbolId, index: u32) -> Option<RegValue> {
        self.registry.get(self.interner.name(symbol), index)
    }

    fn set(&mut self, symbol: SymbolId, index: u32, value: RegValue) {
        self.registry.set(self.interner.name(symbol), index, value)
    }

    fn size(&self, symbol: SymbolId) -> u32 {
        self.registry
            .highest_index(self.interner.name(symbol), MAX_ARRAY_SLOTS)
            .map_or(0, |i| i + 1)
    }
}

/// Default value for a variable of the given type
pub(crate) fn empty_value(is_string: bool) -> RegValue {
    if is_string {
        RegValue::Str(String::new())
    } else {
        RegValue::Int(0)
    }
}

impl Vm<'_> {
    /// Run `f` against the store holding `symbol`; `None` when the store
    /// needs an actor and none is attached
    pub(crate) fn with_store<R>(
        &mut self,
        symbol: SymbolId,
        scope: Option<ScopeRef>,
        f: impl FnOnce(&mut dyn VarStore) -> R,
    ) -> Option<R> {
        let (var_scope, name) = match self.rt.interner.get(symbol) {
            Some(s) => (s.scope, Arc::clone(&s.name)),
            None => return None,
        };

        match var_scope {
            VarScope::CallLocal => {
                let top = self.st.stack.scopes.len() - 1;
                let depth = match scope {
                    Some(ScopeRef::Frame(depth)) if depth <= top => depth,
                    _ => top,
                };
                Some(f(&mut self.st.stack.scopes[depth]))
            }
            VarScope::UnitInstance => {
                let unit = match scope {
                    Some(ScopeRef::Unit(id)) => self
                        .rt
                        .units
                        .get(&id)
                        .cloned()
                        .unwrap_or_else(|| Rc::clone(&self.st.unit)),
                    _ => Rc::clone(&self.st.unit),
                };
                let mut locals = unit.locals.borrow_mut();
                let result = f(&mut *locals);
                Some(result)
            }
            VarScope::GlobalTemp => Some(f(&mut self.rt.global_temps)),
            VarScope::Global => {
                let mut view = GlobalView {
                    registry: &*self.rt.globals,
                    interner: &self.rt.interner,
                };
                Some(f(&mut view))
            }
            VarScope::ActorTemp | VarScope::Character => {
                let Some(actor) = self.st.actor.attached() else {
                    tracing::warn!("Variable '{}' needs an attached actor", name);
                    return None;
                };
                let session = self.rt.actors.entry(actor).or_default();
                if var_scope == VarScope::ActorTemp {
                    Some(f(&mut session.temp))
                } else {
                    Some(f(&mut session.character))
                }
            }
            VarScope::Account | VarScope::AccountGlobal => {
                let account = self.st.actor.attached().and_then(|actor| self.host.account_of(actor));
                let Some(account) = account else {
                    tracing::warn!("Variable '{}' needs an attached actor with an account", name);
                    return None;
                };
                Some(f(self.rt.accounts.entry(account).or_default()))
            }
        }
    }

    /// Read one slot as a runtime value
    pub(crate) fn read_var(&mut self, key: VarKey, scope: Option<ScopeRef>) -> Result<Data> {
        let symbol = key.symbol();
        let (kind, value, is_string) = match self.rt.interner.get(symbol) {
            Some(s) => (s.kind, s.value, s.is_string),
            None => return Err(ScriptError::Runtime(format!("unknown symbol {}", symbol))),
        };

        match kind {
            SymbolKind::Constant => return Ok(Data::Int(value)),
            SymbolKind::Param => return Ok(Data::Int(self.read_param(value))),
            SymbolKind::Label | SymbolKind::UserFunction => return Ok(Data::Pos(value as usize)),
            _ => {}
        }

        let index = key.index();
        let stored = self
            .with_store(symbol, scope, |store| store.get(symbol, index))
            .flatten();
        Ok(stored.unwrap_or_else(|| empty_value(is_string)).into())
    }

    /// Write one slot, converting to the variable's declared type
    pub(crate) fn write_var(&mut self, key: VarKey, scope: Option<ScopeRef>, value: &Data) -> Result<()> {
        let symbol = key.symbol();
        let (kind, param, is_string, name) = match self.rt.interner.get(symbol) {
            Some(s) => (s.kind, s.value, s.is_string, Arc::clone(&s.name)),
            None => return Err(ScriptError::Runtime(format!("unknown symbol {}", symbol))),
        };

        match kind {
            SymbolKind::Param => {
                self.write_param(param, value.to_int());
                return Ok(());
            }
            SymbolKind::Unresolved => {}
            _ => {
                return Err(ScriptError::Runtime(format!("'{}' is not a variable", name)));
            }
        }

        let value = if is_string {
            RegValue::Str(value.to_text())
        } else {
            RegValue::Int(value.to_int())
        };
        let index = key.index();
        self.with_store(symbol, scope, |store| store.set(symbol, index, value));
        Ok(())
    }

    /// Highest used index plus one
    pub(crate) fn array_size(&mut self, symbol: SymbolId, scope: Option<ScopeRef>) -> u32 {
        self.with_store(symbol, scope, |store| store.size(symbol)).unwrap_or(0)
    }

    /// Dereference a variable reference; everything else passes through
    pub(crate) fn get_val(&mut self, data: Data) -> Result<Data> {
        match data {
            Data::Name { key, scope } => self.read_var(key, scope),
            Data::Nil => Ok(Data::Int(0)),
            other => Ok(other),
        }
    }

    pub(crate) fn conv_num(&mut self, data: Data) -> Result<i64> {
        Ok(self.get_val(data)?.to_int())
    }

    pub(crate) fn is_string_var(&self, symbol: SymbolId) -> bool {
        self.rt.interner.get(symbol).map_or(false, |s| s.is_string)
    }

    fn read_param(&mut self, code: i64) -> i64 {
        let Some(param) = Param::from_code(code) else {
            return 0;
        };
        match self.st.actor.attached() {
            Some(actor) => self.host.read_attribute(actor, param),
            None => {
                tracing::warn!("Reading {:?} without an attached actor", param);
                0
            }
        }
    }

    fn write_param(&mut self, code: i64, value: i64) {
        let Some(param) = Param::from_code(code) else {
            return;
        };
        match self.st.actor.attached() {
            Some(actor) => {
                if !self.host.write_attribute(actor, param, value) {
                    tracing::warn!("Host refused {:?} = {} for {}", param, value, actor);
                }
            }
            None => tracing::warn!("Writing {:?} without an attached actor", param),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_array_size_is_highest_plus_one() {
        let mut db = RegDb::new();
        db.set(1, 0, RegValue::Int(10));
        db.set(1, 3, RegValue::Int(30));
        db.set(1, 5, RegValue::Int(50));
        assert_eq!(db.size(1), 6);
        assert_eq!(db.get(1, 4), None);
    }

    #[test]
    fn test_clearing_trims_trailing_slots() {
        let mut db = RegDb::new();
        db.set(1, 0, RegValue::Int(1));
        db.set(1, 5, RegValue::Int(5));
        db.set(1, 5, RegValue::Int(0));
        assert_eq!(db.size(1), 1);
        db.set(1, 0, RegValue::Int(0));
        assert_eq!(db.size(1), 0);
        assert!(db.is_empty());
    }

    #[test]
    fn test_empty_write_to_missing_is_clean() {
        let mut db = RegDb::new();
        db.set(2, 0, RegValue::Str(String::new()));
        assert!(!db.is_dirty());
        db.set(2, 0, RegValue::Str("x".into()));
        assert!(db.is_dirty());
    }

    #[test]
    fn test_records_roundtrip_through_interner() {
        let mut interner = Interner::new();
        let mut db = RegDb::new();
        db.load(
            &mut interner,
            vec![
                VarRecord::new("quest_step", 0, RegValue::Int(3)),
                VarRecord::new("kills", 2, RegValue::Int(9)),
            ],
        );
        assert!(!db.is_dirty());
        assert_eq!(db.get(interner.intern("QUEST_STEP"), 0), Some(&RegValue::Int(3)));

        let records = db.records(&interner);
        assert_eq!(records[0], VarRecord::new("kills", 2, RegValue::Int(9)));
        assert_eq!(records[1], VarRecord::new("quest_step", 0, RegValue::Int(3)));
    }
}
