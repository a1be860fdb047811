//! Stack values

use crate::interner::{SymbolId, MAX_SYMBOLS};
use mapscript_core::UnitId;
use mapscript_storage::RegValue;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Array slots per variable
pub const MAX_ARRAY_SLOTS: u32 = 128;

/// Packed variable reference: array index in the top 8 bits, symbol below
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VarKey(u32);

impl VarKey {
    /// `None` when the index is past the array capacity
    pub fn new(symbol: SymbolId, index: u32) -> Option<Self> {
        if index >= MAX_ARRAY_SLOTS || symbol >= MAX_SYMBOLS {
            return None;
        }
        Some(Self(index << 24 | symbol))
    }

    /// Element 0 of a symbol read straight from a 3-byte operand
    pub(crate) fn of(symbol: SymbolId) -> Self {
        Self(symbol & (MAX_SYMBOLS - 1))
    }

    pub fn symbol(self) -> SymbolId {
        self.0 & (MAX_SYMBOLS - 1)
    }

    pub fn index(self) -> u32 {
        self.0 >> 24
    }
}

/// Which dictionary a reference was bound to when it left its frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScopeRef {
    /// Call-local dictionary at this call depth
    Frame(usize),
    /// Unit-instance dictionary of this unit
    Unit(UnitId),
}

/// Saved caller context pushed by `callsub`/`callfunc`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetInfo {
    /// Offset to resume at in the caller
    pub pos: usize,
    pub unit: UnitId,
    /// Call depth of the caller's local dictionary
    pub scope_depth: usize,
    pub nargs: usize,
    /// Caller's frame base
    pub defsp: usize,
}

/// One evaluation stack cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Data {
    Nil,
    Int(i64),
    /// Owned text produced at runtime
    Str(String),
    /// Text borrowed from compiled code
    ConstStr(Arc<str>),
    /// Variable (or native/param) reference
    Name { key: VarKey, scope: Option<ScopeRef> },
    /// Label offset
    Pos(usize),
    /// Argument-list marker
    Arg,
    RetInfo(Box<RetInfo>),
}

impl Data {
    pub fn is_string(&self) -> bool {
        matches!(self, Data::Str(_) | Data::ConstStr(_))
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Data::Str(s) => Some(s),
            Data::ConstStr(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric view of an already dereferenced value
    pub fn to_int(&self) -> i64 {
        match self {
            Data::Int(n) => *n,
            Data::Str(s) => atoi(s),
            Data::ConstStr(s) => atoi(s),
            Data::Pos(p) => *p as i64,
            _ => 0,
        }
    }

    /// Text view of an already dereferenced value
    pub fn to_text(&self) -> String {
        match self {
            Data::Int(n) => n.to_string(),
            Data::Str(s) => s.clone(),
            Data::ConstStr(s) => s.to_string(),
            Data::Pos(p) => p.to_string(),
            _ => String::new(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Data::Nil => "nil",
            Data::Int(_) => "int",
            Data::Str(_) | Data::ConstStr(_) => "string",
            Data::Name { .. } => "reference",
            Data::Pos(_) => "label",
            Data::Arg => "arg",
            Data::RetInfo(_) => "retinfo",
        }
    }
}

impl From<RegValue> for Data {
    fn from(value: RegValue) -> Self {
        match value {
            RegValue::Int(n) => Data::Int(n),
            RegValue::Str(s) => Data::Str(s),
        }
    }
}

/// Leading-integer parse: optional sign then digits, saturating; 0 if none
pub fn atoi(s: &str) -> i64 {
    let s = s.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };

    let mut value: i64 = 0;
    for b in digits.bytes().take_while(u8::is_ascii_digit) {
        let digit = (b - b'0') as i64;
        value = if negative {
            value.saturating_mul(10).saturating_sub(digit)
        } else {
            value.saturating_mul(10).saturating_add(digit)
        };
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_var_key_packing() {
        let key = VarKey::new(0x00AB_CDEF, 127).unwrap();
        assert_eq!(key.symbol(), 0x00AB_CDEF);
        assert_eq!(key.index(), 127);
        assert!(VarKey::new(1, MAX_ARRAY_SLOTS).is_none());
    }

    #[test]
    fn test_atoi() {
        assert_eq!(atoi("42"), 42);
        assert_eq!(atoi("  -17abc"), -17);
        assert_eq!(atoi("abc"), 0);
        assert_eq!(atoi(""), 0);
        assert_eq!(atoi("99999999999999999999999"), i64::MAX);
        assert_eq!(atoi("-99999999999999999999999"), i64::MIN);
    }

    #[test]
    fn test_conversions() {
        assert_eq!(Data::ConstStr(Arc::from("12")).to_int(), 12);
        assert_eq!(Data::Int(-3).to_text(), "-3");
        assert_eq!(Data::Nil.to_text(), "");
        assert!(Data::Str("x".into()).is_string());
        assert!(!Data::Int(0).is_string());
    }

    #[test]
    fn test_clone_duplicates_owned_text() {
        let original = Data::Str("owned".into());
        let copy = original.clone();
        if let (Data::Str(a), Data::Str(b)) = (&original, &copy) {
            assert_ne!(a.as_ptr(), b.as_ptr());
        }
        assert_eq!(original, copy);
    }
}
