//! Variables and arrays

use super::NativeTable;
use crate::error::{Result, ScriptError};
use crate::interner::{SymbolId, SymbolKind};
use crate::lang::value::{Data, VarKey, MAX_ARRAY_SLOTS};
use crate::lang::vm::Vm;

/// Register assignment and array functions
pub(super) fn register_variable_functions(table: &mut NativeTable) {
    // Assignment
    table.define("set", "rv", builtin_set);
    table.define("setd", "sv", builtin_setd);
    table.define("getd", "s", builtin_getd);

    // Arrays
    table.define("getelementofarray", "ri", builtin_getelementofarray);
    table.define("getarraysize", "r", builtin_getarraysize);
    table.define("setarray", "rv?v*", builtin_setarray);
    table.define("cleararray", "rvi", builtin_cleararray);
    table.define("copyarray", "rri", builtin_copyarray);
    table.define("deletearray", "r?i", builtin_deletearray);
    table.define("inarray", "rv", builtin_inarray);
}

/// Reference to element `index` of `symbol`, or a fatal error
fn element(vm: &Vm<'_>, symbol: SymbolId, index: i64) -> Result<VarKey> {
    u32::try_from(index)
        .ok()
        .and_then(|index| VarKey::new(symbol, index))
        .ok_or_else(|| {
            ScriptError::Runtime(format!(
                "index {} of '{}' out of range 0..{}",
                index,
                vm.rt.interner.name(symbol),
                MAX_ARRAY_SLOTS
            ))
        })
}

/// `name` or `name[index]` as typed in a string
fn parse_var_name(text: &str) -> Option<(&str, i64)> {
    let text = text.trim();
    match text.find('[') {
        None => Some((text, 0)),
        Some(open) => {
            let index = text[open + 1..].strip_suffix(']')?.trim().parse().ok()?;
            Some((text[..open].trim_end(), index))
        }
    }
}

/// Resolve a runtime variable name to a reference
///
/// The name is interned, so every distinct name built at runtime stays in the
/// symbol table until the engine is dropped.
fn dynamic_ref(vm: &mut Vm<'_>, text: &str) -> Result<VarKey> {
    let (name, index) = parse_var_name(text)
        .filter(|(name, _)| !name.is_empty())
        .ok_or_else(|| ScriptError::Runtime(format!("'{}' is not a variable name", text)))?;
    let symbol = vm.rt.interner.intern(name);
    match vm.rt.interner.kind(symbol) {
        SymbolKind::Unresolved | SymbolKind::Param => element(vm, symbol, index),
        _ => Err(ScriptError::Runtime(format!("'{}' is not a variable", name))),
    }
}

// ============================================================================
// ASSIGNMENT
// ============================================================================

/// `set var, value`; pushes the value
fn builtin_set(vm: &mut Vm<'_>) -> Result<()> {
    let (key, scope) = vm.arg_ref(0)?;
    let value = vm.arg_value(1)?;
    vm.write_var(key, scope, &value)?;
    vm.push(value)
}

fn builtin_setd(vm: &mut Vm<'_>) -> Result<()> {
    let name = vm.arg_str(0)?;
    let key = dynamic_ref(vm, &name)?;
    let value = vm.arg_value(1)?;
    vm.write_var(key, None, &value)
}

/// Pushes a reference to the named variable
fn builtin_getd(vm: &mut Vm<'_>) -> Result<()> {
    let name = vm.arg_str(0)?;
    let key = dynamic_ref(vm, &name)?;
    vm.push(Data::Name { key, scope: None })
}

// ============================================================================
// ARRAYS
// ============================================================================

/// `a[i]`: pushes a reference to the element
fn builtin_getelementofarray(vm: &mut Vm<'_>) -> Result<()> {
    let (key, scope) = vm.arg_ref(0)?;
    let index = vm.arg_int(1)?;
    let key = element(vm, key.symbol(), key.index() as i64 + index)?;
    vm.push(Data::Name { key, scope })
}

fn builtin_getarraysize(vm: &mut Vm<'_>) -> Result<()> {
    let (key, scope) = vm.arg_ref(0)?;
    let size = vm.array_size(key.symbol(), scope);
    vm.push_int(size as i64)
}

/// `setarray a[start], v1, v2, ...`
fn builtin_setarray(vm: &mut Vm<'_>) -> Result<()> {
    let (key, scope) = vm.arg_ref(0)?;
    let first = key.index() as i64;
    for i in 1..vm.argc() {
        let value = vm.arg_value(i)?;
        let target = element(vm, key.symbol(), first + i as i64 - 1)?;
        vm.write_var(target, scope, &value)?;
    }
    Ok(())
}

/// `cleararray a[start], value, count`
fn builtin_cleararray(vm: &mut Vm<'_>) -> Result<()> {
    let (key, scope) = vm.arg_ref(0)?;
    let value = vm.arg_value(1)?;
    let count = vm.arg_int(2)?;
    let first = key.index() as i64;
    for i in 0..count.max(0) {
        let target = element(vm, key.symbol(), first + i)?;
        vm.write_var(target, scope, &value)?;
    }
    Ok(())
}

/// `copyarray dst[i], src[j], count`; overlapping copies read everything first
fn builtin_copyarray(vm: &mut Vm<'_>) -> Result<()> {
    let (dst, dst_scope) = vm.arg_ref(0)?;
    let (src, src_scope) = vm.arg_ref(1)?;
    let count = vm.arg_int(2)?.max(0);

    let mut values = Vec::with_capacity(count as usize);
    for i in 0..count {
        let from = element(vm, src.symbol(), src.index() as i64 + i)?;
        values.push(vm.read_var(from, src_scope)?);
    }
    for (i, value) in values.iter().enumerate() {
        let to = element(vm, dst.symbol(), dst.index() as i64 + i as i64)?;
        vm.write_var(to, dst_scope, value)?;
    }
    Ok(())
}

/// `deletearray a[start], count`: removes elements, shifting the rest down.
/// Without a count everything from `start` on is removed.
fn builtin_deletearray(vm: &mut Vm<'_>) -> Result<()> {
    let (key, scope) = vm.arg_ref(0)?;
    let symbol = key.symbol();
    let start = key.index() as i64;
    let size = vm.array_size(symbol, scope) as i64;
    if start >= size {
        return Ok(());
    }
    let count = if vm.has_arg(1) { vm.arg_int(1)? } else { size - start };
    let count = count.clamp(0, size - start);
    if count == 0 {
        return Ok(());
    }

    for i in start..size - count {
        let from = element(vm, symbol, i + count)?;
        let value = vm.read_var(from, scope)?;
        let to = element(vm, symbol, i)?;
        vm.write_var(to, scope, &value)?;
    }
    let empty = if vm.is_string_var(symbol) {
        Data::Str(String::new())
    } else {
        Data::Int(0)
    };
    for i in size - count..size {
        let slot = element(vm, symbol, i)?;
        vm.write_var(slot, scope, &empty)?;
    }
    Ok(())
}

/// Index of the first element equal to the value, or -1
fn builtin_inarray(vm: &mut Vm<'_>) -> Result<()> {
    let (key, scope) = vm.arg_ref(0)?;
    let needle = vm.arg_value(1)?;
    let size = vm.array_size(key.symbol(), scope);

    for i in 0..size {
        let slot = element(vm, key.symbol(), i as i64)?;
        let value = vm.read_var(slot, scope)?;
        let found = if needle.is_string() || value.is_string() {
            needle.to_text() == value.to_text()
        } else {
            needle.to_int() == value.to_int()
        };
        if found {
            return vm.push_int(i as i64);
        }
    }
    vm.push_int(-1)
}
