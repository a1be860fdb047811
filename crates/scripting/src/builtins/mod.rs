//! Native function library
//!
//! Every command and function a script can call is a native registered in
//! the [`NativeTable`] with a signature string:
//!
//! | char | argument |
//! |------|----------|
//! | `i`  | integer |
//! | `s`  | string |
//! | `v`  | any value |
//! | `r`  | variable reference |
//! | `l`  | label |
//! | `?`  | the following arguments are optional |
//! | `*`  | repeat the types after the last `?` (or all of them) any number of times |
//!
//! So `"s*"` is one or more strings, `"sl*"` is string/label pairs and
//! `"l?v*"` a label followed by any number of values.

mod array;
mod control;
mod dialog;
mod string;
mod world;

pub use dialog::MENU_CANCEL;

use crate::error::{Result, ScriptError};
use crate::lang::vm::Vm;

/// Native implementation; pushes at most one result
pub type NativeFn = fn(&mut Vm<'_>) -> Result<()>;

/// Declared argument type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgType {
    Int,
    Str,
    Value,
    Ref,
    Label,
}

/// Parsed native signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    types: Vec<ArgType>,
    required: usize,
    /// Start of the group `*` repeats
    repeat_from: Option<usize>,
}

impl Signature {
    pub fn parse(spec: &str) -> std::result::Result<Self, String> {
        let mut types = Vec::new();
        let mut required = None;
        let mut repeat_from = None;

        let mut chars = spec.chars().peekable();
        while let Some(c) = chars.next() {
            let ty = match c {
                'i' => ArgType::Int,
                's' => ArgType::Str,
                'v' => ArgType::Value,
                'r' => ArgType::Ref,
                'l' => ArgType::Label,
                '?' => {
                    if required.is_some() {
                        return Err("more than one '?'".to_string());
                    }
                    required = Some(types.len());
                    continue;
                }
                '*' => {
                    if chars.peek().is_some() {
                        return Err("'*' must come last".to_string());
                    }
                    let from = required.unwrap_or(0);
                    if from >= types.len() {
                        return Err("'*' has nothing to repeat".to_string());
                    }
                    repeat_from = Some(from);
                    continue;
                }
                other => return Err(format!("unknown type character '{}'", other)),
            };
            types.push(ty);
        }

        Ok(Self {
            required: required.unwrap_or(types.len()),
            types,
            repeat_from,
        })
    }

    /// Arguments that must be present
    pub fn required(&self) -> usize {
        self.required
    }

    /// Upper bound, `None` for repeating signatures
    pub fn max(&self) -> Option<usize> {
        match self.repeat_from {
            Some(_) => None,
            None => Some(self.types.len()),
        }
    }

    /// Declared type of argument `index`
    pub fn arg_type(&self, index: usize) -> Option<ArgType> {
        if let Some(&ty) = self.types.get(index) {
            return Some(ty);
        }
        let from = self.repeat_from?;
        let group = &self.types[from..];
        Some(group[(index - self.types.len()) % group.len()])
    }
}

/// One registered native
#[derive(Debug, Clone)]
pub struct NativeDef {
    pub name: String,
    pub signature: Signature,
    pub func: NativeFn,
}

/// Native function registry
///
/// # Purpose
/// Indexed by the value the interner stores for a native symbol, so the VM
/// dispatches a call with one table lookup.
#[derive(Debug, Default)]
pub struct NativeTable {
    defs: Vec<NativeDef>,
}

impl NativeTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a table holding the standard library
    pub fn standard() -> Self {
        let mut table = Self::new();

        // Register all built-in functions
        control::register_control_functions(&mut table);
        dialog::register_dialog_functions(&mut table);
        array::register_variable_functions(&mut table);
        string::register_string_functions(&mut table);
        string::register_math_functions(&mut table);
        world::register_world_functions(&mut table);

        table
    }

    /// Add or replace a native; returns its index
    pub fn add(&mut self, name: &str, signature: &str, func: NativeFn) -> Result<usize> {
        let signature = Signature::parse(signature)
            .map_err(|e| ScriptError::Runtime(format!("bad signature for '{}': {}", name, e)))?;
        let def = NativeDef {
            name: name.to_string(),
            signature,
            func,
        };

        if let Some(index) = self.index_of(name) {
            self.defs[index] = def;
            return Ok(index);
        }
        self.defs.push(def);
        Ok(self.defs.len() - 1)
    }

    /// Registration helper for the built-in groups
    fn define(&mut self, name: &str, signature: &str, func: NativeFn) {
        if let Err(e) = self.add(name, signature, func) {
            tracing::error!("Failed to register native: {}", e);
        }
    }

    pub fn get(&self, index: usize) -> Option<&NativeDef> {
        self.defs.get(index)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.defs.iter().position(|def| def.name.eq_ignore_ascii_case(name))
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &NativeDef)> {
        self.defs.iter().enumerate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_required_and_max() {
        let sig = Signature::parse("r?ii").unwrap();
        assert_eq!(sig.required(), 1);
        assert_eq!(sig.max(), Some(3));
        assert_eq!(sig.arg_type(0), Some(ArgType::Ref));
        assert_eq!(sig.arg_type(2), Some(ArgType::Int));
        assert_eq!(sig.arg_type(3), None);
    }

    #[test]
    fn test_signature_repeat_group() {
        let sig = Signature::parse("sl*").unwrap();
        assert_eq!(sig.required(), 2);
        assert_eq!(sig.max(), None);
        assert_eq!(sig.arg_type(4), Some(ArgType::Str));
        assert_eq!(sig.arg_type(5), Some(ArgType::Label));

        let sig = Signature::parse("l?v*").unwrap();
        assert_eq!(sig.required(), 1);
        assert_eq!(sig.arg_type(7), Some(ArgType::Value));
    }

    #[test]
    fn test_signature_errors() {
        assert!(Signature::parse("x").is_err());
        assert!(Signature::parse("i*s").is_err());
        assert!(Signature::parse("i?*").is_err());
        assert!(Signature::parse("?i?i").is_err());
    }

    #[test]
    fn test_standard_table_has_core_natives() {
        let table = NativeTable::standard();
        for name in ["set", "goto", "jump_zero", "callsub", "return", "getelementofarray", "mes", "select"] {
            assert!(table.index_of(name).is_some(), "missing {}", name);
        }
    }

    #[test]
    fn test_add_replaces_by_name() {
        fn noop(_: &mut Vm<'_>) -> Result<()> {
            Ok(())
        }
        let mut table = NativeTable::new();
        let a = table.add("Ping", "", noop).unwrap();
        let b = table.add("ping", "i", noop).unwrap();
        assert_eq!(a, b);
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(a).unwrap().signature.required(), 1);
    }
}
