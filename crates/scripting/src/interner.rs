//! Symbol interning
//!
//! Every identifier and literal string the compiler meets is interned once
//! and referred to by a [`SymbolId`]. Identifiers are matched
//! case-insensitively; literal text is matched exactly. Ids are indexes
//! into one growable table and stay valid for the engine's lifetime.

use std::collections::HashMap;
use std::sync::Arc;

/// Index of an interned symbol
pub type SymbolId = u32;

/// Symbols must fit the 24-bit operand of a name reference
pub const MAX_SYMBOLS: u32 = 1 << 24;

/// What a symbol currently denotes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    /// Plain name: a variable, or a label not yet seen
    Unresolved,
    /// Integer constant, value holds the number
    Constant,
    /// Actor attribute, value holds the [`Param`](crate::Param) code
    Param,
    /// Native function, value holds its table index
    Native,
    /// `function Name;` seen, body not yet compiled
    UserFunctionDeclared,
    /// User function body, value holds its offset
    UserFunction,
    /// Label, value holds its offset
    Label,
    /// Literal string text
    Str,
}

/// Storage class of a variable, decided by its name prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarScope {
    /// `.@name` or `'name`: lives for one function call
    CallLocal,
    /// `.name`: shared by all runs of one unit
    UnitInstance,
    /// `@name`: per actor, gone at logout
    ActorTemp,
    /// `name`: per character, persisted by the host
    Character,
    /// `#name`: per account
    Account,
    /// `##name`: per account, shared across servers
    AccountGlobal,
    /// `$@name`: server-wide, not persisted
    GlobalTemp,
    /// `$name`: server-wide, persisted
    Global,
}

impl VarScope {
    pub fn classify(name: &str) -> VarScope {
        let bytes = name.as_bytes();
        match bytes {
            [b'.', b'@', ..] | [b'\'', ..] => VarScope::CallLocal,
            [b'.', ..] => VarScope::UnitInstance,
            [b'@', ..] => VarScope::ActorTemp,
            [b'$', b'@', ..] => VarScope::GlobalTemp,
            [b'$', ..] => VarScope::Global,
            [b'#', b'#', ..] => VarScope::AccountGlobal,
            [b'#', ..] => VarScope::Account,
            _ => VarScope::Character,
        }
    }

    /// Variables bound to the attached actor
    pub fn needs_actor(&self) -> bool {
        matches!(
            self,
            VarScope::ActorTemp | VarScope::Character | VarScope::Account | VarScope::AccountGlobal
        )
    }
}

/// One interned symbol
#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: Arc<str>,
    pub kind: SymbolKind,
    pub value: i64,
    /// Head of the backpatch chain while compiling
    pub backpatch: Option<usize>,
    pub scope: VarScope,
    /// Name ends in `$`
    pub is_string: bool,
}

/// The engine-wide symbol table
#[derive(Debug, Default)]
pub struct Interner {
    symbols: Vec<Symbol>,
    identifiers: HashMap<String, SymbolId>,
    literals: HashMap<Arc<str>, SymbolId>,
}

impl Interner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern an identifier (case-insensitive)
    pub fn intern(&mut self, name: &str) -> SymbolId {
        let key = name.to_ascii_lowercase();
        if let Some(&id) = self.identifiers.get(&key) {
            return id;
        }
        let id = self.push(Symbol {
            name: Arc::from(name),
            kind: SymbolKind::Unresolved,
            value: 0,
            backpatch: None,
            scope: VarScope::classify(name),
            is_string: name.ends_with('$'),
        });
        self.identifiers.insert(key, id);
        id
    }

    /// Intern literal text (case-sensitive), returning the shared copy
    pub fn intern_literal(&mut self, text: &str) -> Arc<str> {
        if let Some(&id) = self.literals.get(text) {
            return Arc::clone(&self.symbols[id as usize].name);
        }
        let name: Arc<str> = Arc::from(text);
        let id = self.push(Symbol {
            name: Arc::clone(&name),
            kind: SymbolKind::Str,
            value: 0,
            backpatch: None,
            scope: VarScope::Character,
            is_string: true,
        });
        self.literals.insert(Arc::clone(&name), id);
        name
    }

    fn push(&mut self, symbol: Symbol) -> SymbolId {
        let id = self.symbols.len() as SymbolId;
        self.symbols.push(symbol);
        id
    }

    /// Look up an identifier without interning it
    pub fn lookup(&self, name: &str) -> Option<SymbolId> {
        self.identifiers.get(&name.to_ascii_lowercase()).copied()
    }

    pub fn get(&self, id: SymbolId) -> Option<&Symbol> {
        self.symbols.get(id as usize)
    }

    pub(crate) fn get_mut(&mut self, id: SymbolId) -> Option<&mut Symbol> {
        self.symbols.get_mut(id as usize)
    }

    /// Display name of a symbol, `?` for unknown ids
    pub fn name(&self, id: SymbolId) -> &str {
        self.get(id).map_or("?", |s| &*s.name)
    }

    pub fn kind(&self, id: SymbolId) -> SymbolKind {
        self.get(id).map_or(SymbolKind::Unresolved, |s| s.kind)
    }

    /// Bind a name to a fixed kind and value (constants, params, natives)
    pub fn define(&mut self, name: &str, kind: SymbolKind, value: i64) -> SymbolId {
        let id = self.intern(name);
        let symbol = &mut self.symbols[id as usize];
        symbol.kind = kind;
        symbol.value = value;
        id
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifiers_case_insensitive() {
        let mut interner = Interner::new();
        let a = interner.intern("@Quest_Step");
        let b = interner.intern("@quest_step");
        assert_eq!(a, b);
        assert_eq!(interner.name(a), "@Quest_Step");
        assert_eq!(interner.get(a).unwrap().scope, VarScope::ActorTemp);
    }

    #[test]
    fn test_literals_case_sensitive() {
        let mut interner = Interner::new();
        let a = interner.intern_literal("Hello");
        let b = interner.intern_literal("hello");
        let c = interner.intern_literal("Hello");
        assert_ne!(a, b);
        assert!(Arc::ptr_eq(&a, &c));
        // literal text never shadows an identifier of the same spelling
        assert_eq!(interner.lookup("Hello"), None);
    }

    #[test]
    fn test_scope_prefixes() {
        assert_eq!(VarScope::classify(".@tmp"), VarScope::CallLocal);
        assert_eq!(VarScope::classify("'arg"), VarScope::CallLocal);
        assert_eq!(VarScope::classify(".count"), VarScope::UnitInstance);
        assert_eq!(VarScope::classify("@menu"), VarScope::ActorTemp);
        assert_eq!(VarScope::classify("quest_done"), VarScope::Character);
        assert_eq!(VarScope::classify("#bank"), VarScope::Account);
        assert_eq!(VarScope::classify("##cash"), VarScope::AccountGlobal);
        assert_eq!(VarScope::classify("$@event"), VarScope::GlobalTemp);
        assert_eq!(VarScope::classify("$winners$"), VarScope::Global);
    }

    #[test]
    fn test_string_suffix() {
        let mut interner = Interner::new();
        let s = interner.intern(".@name$");
        let n = interner.intern(".@name");
        assert_ne!(s, n);
        assert!(interner.get(s).unwrap().is_string);
        assert!(!interner.get(n).unwrap().is_string);
    }

    #[test]
    fn test_define_overrides_kind() {
        let mut interner = Interner::new();
        let id = interner.define("Job_Novice", SymbolKind::Constant, 0);
        assert_eq!(interner.kind(id), SymbolKind::Constant);
        assert_eq!(interner.intern("JOB_NOVICE"), id);
    }
}
