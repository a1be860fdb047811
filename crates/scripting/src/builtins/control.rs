//! Control flow: jumps, user and global function calls, sleeping

use super::NativeTable;
use crate::error::{Result, ScriptError};
use crate::interner::{SymbolKind, VarScope};
use crate::lang::value::{Data, ScopeRef};
use crate::lang::vm::Vm;
use crate::state::RunState;
use mapscript_core::ActorId;

/// Register jump, call and timing functions
pub(super) fn register_control_functions(table: &mut NativeTable) {
    // Jumps
    table.define("goto", "l", builtin_goto);
    table.define("jump_zero", "il", builtin_jump_zero);
    table.define("end", "", builtin_end);

    // Calls
    table.define("callsub", "l?v*", builtin_callsub);
    table.define("callfunc", "s?v*", builtin_callfunc);
    table.define("return", "?v", builtin_return);
    table.define("getarg", "i?v", builtin_getarg);
    table.define("getargcount", "", builtin_getargcount);

    // Timing
    table.define("sleep", "i", builtin_sleep);
    table.define("sleep2", "i", builtin_sleep2);
}

// ============================================================================
// JUMPS
// ============================================================================

fn builtin_goto(vm: &mut Vm<'_>) -> Result<()> {
    let pos = vm.arg_label(0)?;
    vm.jump(pos);
    Ok(())
}

/// Jump when the condition is zero
fn builtin_jump_zero(vm: &mut Vm<'_>) -> Result<()> {
    if vm.arg_int(0)? == 0 {
        let pos = vm.arg_label(1)?;
        vm.jump(pos);
    }
    Ok(())
}

fn builtin_end(vm: &mut Vm<'_>) -> Result<()> {
    vm.st.run = RunState::Ended;
    Ok(())
}

// ============================================================================
// CALLS
// ============================================================================

fn builtin_callsub(vm: &mut Vm<'_>) -> Result<()> {
    let pos = vm.arg_label(0)?;
    let first_arg = vm.st.start + 3;
    vm.enter_call(first_arg, None, pos)
}

fn builtin_callfunc(vm: &mut Vm<'_>) -> Result<()> {
    let name = vm.arg_str(0)?;
    let unit = vm
        .rt
        .functions
        .get(&name.to_ascii_lowercase())
        .and_then(|id| vm.rt.units.get(id))
        .cloned()
        .ok_or_else(|| ScriptError::Runtime(format!("function '{}' not found", name)))?;
    let first_arg = vm.st.start + 3;
    vm.enter_call(first_arg, Some(unit), 0)
}

/// Push the return value and unwind once the window is gone
fn builtin_return(vm: &mut Vm<'_>) -> Result<()> {
    let value = if vm.has_arg(0) {
        let raw = vm.arg_raw(0)?.clone();
        return_value(vm, raw)?
    } else {
        Data::Nil
    };
    vm.push(value)?;
    vm.st.run = RunState::Returning;
    Ok(())
}

/// References into the dying frame are read now; references the caller
/// can still reach are handed back as references
fn return_value(vm: &mut Vm<'_>, raw: Data) -> Result<Data> {
    let Data::Name { key, scope } = raw else {
        return Ok(raw);
    };
    let info = vm.rt.interner.get(key.symbol()).map(|s| (s.kind, s.scope));
    let depth = vm.st.stack.call_depth();

    match info {
        Some((SymbolKind::Unresolved, VarScope::CallLocal)) => match scope {
            Some(ScopeRef::Frame(d)) if d < depth => Ok(Data::Name { key, scope }),
            _ => vm.read_var(key, scope),
        },
        Some((SymbolKind::Unresolved, VarScope::UnitInstance)) => Ok(Data::Name {
            key,
            scope: scope.or(Some(ScopeRef::Unit(vm.st.unit.id()))),
        }),
        _ => vm.read_var(key, scope),
    }
}

fn builtin_getarg(vm: &mut Vm<'_>) -> Result<()> {
    let index = vm.arg_int(0)?;
    let Some(frame) = vm.current_frame() else {
        return Err(ScriptError::Runtime("getarg used outside a function".to_string()));
    };
    let nargs = frame.nargs;
    let base = vm.st.stack.defsp - 1 - nargs;

    match usize::try_from(index) {
        Ok(i) if i < nargs => {
            let arg = vm.st.stack.data[base + i].clone();
            vm.push(arg)
        }
        _ if vm.has_arg(1) => {
            let default = vm.arg_value(1)?;
            vm.push(default)
        }
        _ => Err(ScriptError::Runtime(format!(
            "getarg({}) out of range, {} argument(s) passed",
            index, nargs
        ))),
    }
}

fn builtin_getargcount(vm: &mut Vm<'_>) -> Result<()> {
    let nargs = vm
        .current_frame()
        .map(|frame| frame.nargs)
        .ok_or_else(|| ScriptError::Runtime("getargcount used outside a function".to_string()))?;
    vm.push_int(nargs as i64)
}

// ============================================================================
// TIMING
// ============================================================================

/// Sleep and detach the actor
fn builtin_sleep(vm: &mut Vm<'_>) -> Result<()> {
    sleep(vm, true)
}

/// Sleep keeping the actor; pushes whether it is still attached
fn builtin_sleep2(vm: &mut Vm<'_>) -> Result<()> {
    sleep(vm, false)?;
    if vm.st.run != RunState::RerunLine {
        let attached = vm.actor().is_some();
        vm.push_int(attached as i64)?;
    }
    Ok(())
}

/// First call parks the line; the re-run after the timer continues
fn sleep(vm: &mut Vm<'_>, detach: bool) -> Result<()> {
    if vm.st.sleep_ms > 0 {
        vm.st.sleep_ms = 0;
        return Ok(());
    }

    let ms = vm.arg_int(0)?;
    if ms <= 0 {
        return Ok(());
    }

    if detach {
        if let Some(actor) = vm.actor() {
            if vm.st.dialog_open {
                let owner = vm.owner();
                vm.host.end_dialog(actor, owner);
                vm.st.dialog_open = false;
            }
            let id = vm.st.id;
            vm.rt.release_actor(actor, id);
            vm.st.actor = ActorId::NONE;
        }
    }

    vm.st.sleep_ms = ms as u64;
    vm.st.run = RunState::RerunLine;
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::testing::{run_source, MockHost};
    use crate::{RunOutcome, ScriptEngine, ScriptError};
    use mapscript_core::{ActorId, EntityId, Tick};
    use mapscript_storage::RegValue;

    #[test]
    fn test_forward_goto_skips_code() {
        let source = "{ set .@a, 1; goto L_Skip; set .@a, 99; L_Skip: return .@a; }";
        assert_eq!(run_source(source), Some(RegValue::Int(1)));
    }

    #[test]
    fn test_user_function_with_arguments() {
        let source = "{
            function Add3 { return getarg(0) + getarg(1) + getarg(2, 100); }
            return Add3(1, 2) * 10 + getargcount_probe();
            function getargcount_probe { return getargcount(); }
        }";
        let mut engine = ScriptEngine::new(Default::default());
        // calling a function defined later needs a declaration first
        assert!(engine.compile("late", source).is_err());

        let source = "{
            function Add3 { return getarg(0) + getarg(1) + getarg(2, 100); }
            return Add3(1, 2);
        }";
        assert_eq!(run_source(source), Some(RegValue::Int(103)));
    }

    #[test]
    fn test_declared_function_called_before_body() {
        let source = "{
            function Twice;
            return Twice(21);
            function Twice { return getarg(0) * 2; }
        }";
        assert_eq!(run_source(source), Some(RegValue::Int(42)));
    }

    #[test]
    fn test_call_local_not_visible_after_return() {
        let source = "{
            function Inner { set .@secret, 7; return; }
            set .@secret, 1;
            Inner();
            return .@secret;
        }";
        assert_eq!(run_source(source), Some(RegValue::Int(1)));
    }

    #[test]
    fn test_reference_argument_writes_caller_local() {
        let source = "{
            function Fill { set getarg(0), 5; return; }
            Fill(.@out);
            return .@out;
        }";
        assert_eq!(run_source(source), Some(RegValue::Int(5)));
    }

    #[test]
    fn test_recursion() {
        let source = "{
            function Fact;
            return Fact(5);
            function Fact {
                if (getarg(0) <= 1) return 1;
                return getarg(0) * Fact(getarg(0) - 1);
            }
        }";
        assert_eq!(run_source(source), Some(RegValue::Int(120)));
    }

    #[test]
    fn test_call_depth_limit() {
        let mut engine = ScriptEngine::new(mapscript_config::ScriptConfig {
            max_call_depth: 4,
            ..Default::default()
        });
        let mut host = MockHost::new();
        let unit = engine
            .compile("deep", "{ function Down; Down(); function Down { Down(); } }")
            .unwrap();
        let err = engine.run(&mut host, unit, 0, ActorId::NONE, EntityId(1)).unwrap_err();
        assert!(matches!(err, ScriptError::CallDepth));
    }

    #[test]
    fn test_getarg_out_of_range_is_fatal() {
        let mut engine = ScriptEngine::new(Default::default());
        let mut host = MockHost::new();
        let unit = engine
            .compile("bad", "{ function F { return getarg(3); } F(1); }")
            .unwrap();
        let err = engine.run(&mut host, unit, 0, ActorId::NONE, EntityId(1)).unwrap_err();
        assert!(err.to_string().contains("getarg(3)"));
    }

    #[test]
    fn test_callfunc_global_function() {
        let mut engine = ScriptEngine::new(Default::default());
        let mut host = MockHost::new();
        engine
            .register_function("Square", "{ return getarg(0) * getarg(0); }")
            .unwrap();
        let unit = engine.compile("caller", "{ return callfunc(\"Square\", 9) + 1; }").unwrap();
        let outcome = engine.run(&mut host, unit, 0, ActorId::NONE, EntityId(1)).unwrap();
        assert_eq!(outcome, RunOutcome::Finished { result: Some(RegValue::Int(82)) });
    }

    #[test]
    fn test_sleep_preserves_stack() {
        let mut engine = ScriptEngine::new(Default::default());
        let mut host = MockHost::new();
        let source = "{
            function Sum3 { sleep 500; return getarg(0) + getarg(1) + getarg(2); }
            return 100 * Sum3(1, 2, 3);
        }";
        let unit = engine.compile("sleepy", source).unwrap();
        let outcome = engine.run(&mut host, unit, 0, ActorId::NONE, EntityId(1)).unwrap();
        assert_eq!(outcome, RunOutcome::Sleeping { wake_at: Tick(500) });

        host.advance(500);
        let outcomes = host.fire_due(&mut engine);
        assert_eq!(outcomes.len(), 1);
        assert_eq!(
            outcomes[0].as_ref().unwrap(),
            &RunOutcome::Finished { result: Some(RegValue::Int(600)) }
        );
    }

    #[test]
    fn test_sleep_zero_does_not_park() {
        assert_eq!(run_source("{ sleep 0; return 3; }"), Some(RegValue::Int(3)));
    }
}
