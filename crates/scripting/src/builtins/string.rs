//! String and math functions

use super::NativeTable;
use crate::error::{Result, ScriptError};
use crate::lang::value::{atoi, Data, VarKey, MAX_ARRAY_SLOTS};
use crate::lang::vm::Vm;
use rand::Rng;
use std::time::{SystemTime, UNIX_EPOCH};

/// Register string functions
pub(super) fn register_string_functions(table: &mut NativeTable) {
    table.define("strlen", "s", builtin_strlen);
    table.define("getstrlen", "s", builtin_strlen);
    table.define("strtoupper", "s", builtin_strtoupper);
    table.define("strtolower", "s", builtin_strtolower);
    table.define("substr", "sii", builtin_substr);
    table.define("explode", "rss", builtin_explode);
    table.define("implode", "r?s", builtin_implode);
    table.define("atoi", "s", builtin_atoi);
}

/// Register math and time functions
pub(super) fn register_math_functions(table: &mut NativeTable) {
    table.define("rand", "i?i", builtin_rand);
    table.define("min", "i?i*", builtin_min);
    table.define("max", "i?i*", builtin_max);
    table.define("abs", "i", builtin_abs);
    table.define("pow", "ii", builtin_pow);
    table.define("sqrt", "i", builtin_sqrt);
    table.define("gettimetick", "i", builtin_gettimetick);
}

// ============================================================================
// STRINGS
// ============================================================================

/// Length in characters
fn builtin_strlen(vm: &mut Vm<'_>) -> Result<()> {
    let text = vm.arg_str(0)?;
    vm.push_int(text.chars().count() as i64)
}

fn builtin_strtoupper(vm: &mut Vm<'_>) -> Result<()> {
    let text = vm.arg_str(0)?;
    vm.push_str(text.to_uppercase())
}

fn builtin_strtolower(vm: &mut Vm<'_>) -> Result<()> {
    let text = vm.arg_str(0)?;
    vm.push_str(text.to_lowercase())
}

/// `substr(text, first, last)`, both ends inclusive
fn builtin_substr(vm: &mut Vm<'_>) -> Result<()> {
    let text = vm.arg_str(0)?;
    let first = vm.arg_int(1)?;
    let last = vm.arg_int(2)?;
    let len = text.chars().count() as i64;

    if first < 0 || last < first || last >= len {
        tracing::warn!("substr({}, {}) out of range for length {}", first, last, len);
        return vm.push_str("");
    }
    let slice: String = text
        .chars()
        .skip(first as usize)
        .take((last - first + 1) as usize)
        .collect();
    vm.push_str(slice)
}

/// `explode(arr$, text, sep)` splits into a string array; pushes the count
fn builtin_explode(vm: &mut Vm<'_>) -> Result<()> {
    let (key, scope) = vm.arg_ref(0)?;
    if !vm.is_string_var(key.symbol()) {
        return Err(ScriptError::Runtime(format!(
            "explode target '{}' must be a string array",
            vm.rt.interner.name(key.symbol())
        )));
    }
    let text = vm.arg_str(1)?;
    let separator = vm.arg_str(2)?;
    let parts: Vec<String> = if separator.is_empty() {
        vec![text]
    } else {
        text.split(separator.as_str()).map(str::to_string).collect()
    };

    let first = key.index();
    let mut count = 0;
    for part in parts {
        let Some(slot) = VarKey::new(key.symbol(), first + count) else {
            tracing::warn!("explode truncated at {} elements", MAX_ARRAY_SLOTS);
            break;
        };
        vm.write_var(slot, scope, &Data::Str(part))?;
        count += 1;
    }
    vm.push_int(count as i64)
}

/// `implode(arr$, sep)` joins every element up to the array size
fn builtin_implode(vm: &mut Vm<'_>) -> Result<()> {
    let (key, scope) = vm.arg_ref(0)?;
    let separator = if vm.has_arg(1) { vm.arg_str(1)? } else { String::new() };
    let size = vm.array_size(key.symbol(), scope);

    let mut parts = Vec::with_capacity(size as usize);
    for i in 0..size {
        if let Some(slot) = VarKey::new(key.symbol(), i) {
            parts.push(vm.read_var(slot, scope)?.to_text());
        }
    }
    vm.push_str(parts.join(&separator))
}

fn builtin_atoi(vm: &mut Vm<'_>) -> Result<()> {
    let text = vm.arg_str(0)?;
    vm.push_int(atoi(&text))
}

// ============================================================================
// MATH
// ============================================================================

/// `rand(n)` is 0..n-1, `rand(a, b)` is a..=b
fn builtin_rand(vm: &mut Vm<'_>) -> Result<()> {
    let (low, high) = if vm.has_arg(1) {
        let a = vm.arg_int(0)?;
        let b = vm.arg_int(1)?;
        (a.min(b), a.max(b))
    } else {
        let n = vm.arg_int(0)?;
        if n <= 0 {
            tracing::warn!("rand({}) needs a positive range", n);
            return vm.push_int(0);
        }
        (0, n - 1)
    };
    let value = rand::thread_rng().gen_range(low..=high);
    vm.push_int(value)
}

fn builtin_min(vm: &mut Vm<'_>) -> Result<()> {
    let mut best = vm.arg_int(0)?;
    for i in 1..vm.argc() {
        best = best.min(vm.arg_int(i)?);
    }
    vm.push_int(best)
}

fn builtin_max(vm: &mut Vm<'_>) -> Result<()> {
    let mut best = vm.arg_int(0)?;
    for i in 1..vm.argc() {
        best = best.max(vm.arg_int(i)?);
    }
    vm.push_int(best)
}

fn builtin_abs(vm: &mut Vm<'_>) -> Result<()> {
    let n = vm.arg_int(0)?;
    vm.push_int(n.saturating_abs())
}

/// Saturating; negative exponents give 0
fn builtin_pow(vm: &mut Vm<'_>) -> Result<()> {
    let base = vm.arg_int(0)?;
    let exp = vm.arg_int(1)?;
    let value = match u32::try_from(exp) {
        Ok(exp) => base.saturating_pow(exp),
        Err(_) if exp < 0 => 0,
        // exponent too large to fit: only 0, 1 and -1 stay finite
        Err(_) => match base {
            0 | 1 => base,
            -1 => 1 - 2 * (exp & 1),
            b if b < 0 && exp & 1 == 1 => i64::MIN,
            _ => i64::MAX,
        },
    };
    vm.push_int(value)
}

/// Integer square root; negative input gives 0
fn builtin_sqrt(vm: &mut Vm<'_>) -> Result<()> {
    let n = vm.arg_int(0)?;
    if n < 0 {
        tracing::warn!("sqrt of negative number {}", n);
        return vm.push_int(0);
    }
    let mut root = (n as f64).sqrt() as i64;
    while root > 0 && root.saturating_mul(root) > n {
        root -= 1;
    }
    while (root + 1).saturating_mul(root + 1) <= n {
        root += 1;
    }
    vm.push_int(root)
}

/// 0: host tick in ms, 1: seconds since midnight (UTC), 2: unix seconds
fn builtin_gettimetick(vm: &mut Vm<'_>) -> Result<()> {
    let kind = vm.arg_int(0)?;
    let unix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    let value = match kind {
        0 => vm.host().now().millis() as i64,
        1 => unix % 86_400,
        2 => unix,
        other => {
            tracing::warn!("gettimetick: unknown kind {}", other);
            0
        }
    };
    vm.push_int(value)
}

#[cfg(test)]
mod tests {
    use crate::testing::run_source;
    use mapscript_storage::RegValue;

    fn text(s: &str) -> Option<RegValue> {
        Some(RegValue::Str(s.to_string()))
    }

    #[test]
    fn test_substr_inclusive() {
        assert_eq!(run_source("{ return substr(\"abcdef\", 1, 3); }"), text("bcd"));
        assert_eq!(run_source("{ return substr(\"abc\", 2, 5); }"), text(""));
        assert_eq!(run_source("{ return substr(\"abc\", 2, 1); }"), text(""));
    }

    #[test]
    fn test_case_and_length() {
        assert_eq!(run_source("{ return strtoupper(\"Poring\") + strtolower(\"ABC\"); }"), text("PORINGabc"));
        assert_eq!(run_source("{ return strlen(\"héllo\") + getstrlen(\"\"); }"), Some(RegValue::Int(5)));
    }

    #[test]
    fn test_explode_implode() {
        let source = "{
            .@n = explode(.@p$, \"red:green:blue\", \":\");
            return .@n + \"|\" + .@p$[1] + \"|\" + implode(.@p$, \"-\");
        }";
        assert_eq!(run_source(source), text("3|green|red-green-blue"));
    }

    #[test]
    fn test_atoi_and_number_conversion() {
        assert_eq!(run_source("{ return atoi(\"  42abc\") + atoi(\"x\"); }"), Some(RegValue::Int(42)));
        assert_eq!(run_source("{ return atoi(\"-7\"); }"), Some(RegValue::Int(-7)));
    }

    #[test]
    fn test_min_max_abs() {
        assert_eq!(run_source("{ return min(4, -2, 9) * 100 + max(3, 8, 1); }"), Some(RegValue::Int(-192)));
        assert_eq!(run_source("{ return abs(-5) + max(7); }"), Some(RegValue::Int(12)));
    }

    #[test]
    fn test_pow_sqrt() {
        assert_eq!(run_source("{ return pow(2, 10); }"), Some(RegValue::Int(1024)));
        assert_eq!(run_source("{ return pow(10, 30); }"), Some(RegValue::Int(i64::MAX)));
        assert_eq!(run_source("{ return pow(2, -1); }"), Some(RegValue::Int(0)));
        assert_eq!(run_source("{ return sqrt(99) * 10 + sqrt(100); }"), Some(RegValue::Int(100)));
    }

    #[test]
    fn test_rand_in_range() {
        for _ in 0..20 {
            let Some(RegValue::Int(n)) = run_source("{ return rand(3, 5); }") else {
                panic!("expected int");
            };
            assert!((3..=5).contains(&n));
        }
        assert_eq!(run_source("{ return rand(1); }"), Some(RegValue::Int(0)));
    }

    #[test]
    fn test_gettimetick_host_tick() {
        assert_eq!(run_source("{ return gettimetick(0); }"), Some(RegValue::Int(0)));
    }
}
