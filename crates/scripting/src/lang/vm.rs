//! Stack virtual machine
//!
//! Runs one [`ExecutionState`] until it ends, parks, or fails. Natives see
//! the machine through [`Vm`]: their arguments sit in the window
//! `[callee, Arg, args...]` at the top of the stack and whatever they push
//! above it becomes the call's value once the window is popped.

use crate::builtins::{ArgType, NativeDef};
use crate::context::Host;
use crate::engine::ScriptEngine;
use crate::error::{Result, RunawayKind, ScriptError};
use crate::interner::{SymbolKind, VarScope};
use crate::lang::bytecode::{read_cstr, read_u24, read_varint, OpCode, ScriptCode};
use crate::lang::value::{Data, RetInfo, ScopeRef, VarKey};
use crate::state::{shift_index, ExecutionState, RunState};
use mapscript_config::ScriptConfig;
use mapscript_core::{ActorId, EntityId};
use mapscript_storage::RegValue;
use std::rc::Rc;

/// The machine a native runs against
///
/// # Purpose
/// Ties one execution state to the engine tables and the host for the
/// length of a run burst. Natives read their arguments and push their
/// result through it.
pub struct Vm<'a> {
    pub(crate) rt: &'a mut ScriptEngine,
    pub(crate) host: &'a mut dyn Host,
    pub(crate) st: &'a mut ExecutionState,
}

/// Per-burst runaway budgets; `None` means unlimited
struct Budget {
    opcodes: Option<u32>,
    jumps: Option<u32>,
}

impl Budget {
    fn new(config: &ScriptConfig) -> Self {
        let limit = |n: u32| (n > 0).then_some(n);
        Self {
            opcodes: limit(config.check_cmdcount),
            jumps: limit(config.check_gotocount),
        }
    }

    fn spend(counter: &mut Option<u32>, kind: RunawayKind) -> Result<()> {
        match counter {
            Some(0) => Err(ScriptError::Runaway(kind)),
            Some(n) => {
                *n -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn opcode(&mut self) -> Result<()> {
        Self::spend(&mut self.opcodes, RunawayKind::Opcodes)
    }

    fn jump(&mut self) -> Result<()> {
        Self::spend(&mut self.jumps, RunawayKind::Jumps)
    }
}

impl<'a> Vm<'a> {
    pub(crate) fn new(rt: &'a mut ScriptEngine, host: &'a mut dyn Host, st: &'a mut ExecutionState) -> Self {
        Self { rt, host, st }
    }

    /// Run until the state ends or parks
    pub(crate) fn execute(&mut self) -> Result<()> {
        let mut budget = Budget::new(&self.rt.config);

        match self.st.run {
            RunState::RerunLine => {
                self.st.run = RunState::Running;
                self.run_func()?;
                self.settle(&mut budget)?;
            }
            RunState::Ended => return Ok(()),
            _ => self.st.run = RunState::Running,
        }

        while self.st.run == RunState::Running {
            budget.opcode()?;
            self.step(&mut budget)?;
        }
        Ok(())
    }

    /// Fetch and execute one instruction
    fn step(&mut self, budget: &mut Budget) -> Result<()> {
        let unit = Rc::clone(&self.st.unit);
        let code = unit.code();
        let at = self.st.pos;
        let op = code
            .get(at)
            .and_then(|&b| OpCode::from_byte(b))
            .ok_or_else(|| ScriptError::Runtime(format!("invalid instruction at {} in {}", at, unit.name())))?;
        self.st.pos += 1;

        let truncated = || ScriptError::Runtime(format!("truncated operand at {} in {}", at, unit.name()));
        match op {
            OpCode::Nop => self.st.run = RunState::Ended,
            OpCode::Eol => self.end_of_line(),
            OpCode::Int => {
                let (value, next) = read_varint(code, self.st.pos).ok_or_else(truncated)?;
                self.st.pos = next;
                self.push(Data::Int(value))?;
            }
            OpCode::Pos => {
                let target = read_u24(code, self.st.pos).ok_or_else(truncated)?;
                self.st.pos += 3;
                self.push(Data::Pos(target as usize))?;
            }
            OpCode::Name => {
                let symbol = read_u24(code, self.st.pos).ok_or_else(truncated)?;
                self.st.pos += 3;
                self.push(Data::Name {
                    key: VarKey::of(symbol),
                    scope: None,
                })?;
            }
            OpCode::Str => {
                let (text, next) = read_cstr(code, self.st.pos).ok_or_else(truncated)?;
                self.st.pos = next;
                let text = self.rt.interner.intern_literal(text);
                self.push(Data::ConstStr(text))?;
            }
            OpCode::Arg => self.push(Data::Arg)?,
            OpCode::Func => {
                self.run_func()?;
                self.settle(budget)?;
            }
            OpCode::Ref => self.st.op2ref = self.st.stack.len().checked_sub(1),
            OpCode::Op3 => self.op_3()?,
            OpCode::Neg | OpCode::LNot | OpCode::Not => self.op_1(op)?,
            OpCode::AddPost | OpCode::SubPost | OpCode::AddPre | OpCode::SubPre => self.incdec(op)?,
            _ => self.op_2(op)?,
        }
        Ok(())
    }

    /// Turn a jump request back into running, charging the jump budget
    fn settle(&mut self, budget: &mut Budget) -> Result<()> {
        if self.st.run == RunState::Goto {
            budget.jump()?;
            self.st.run = RunState::Running;
        }
        Ok(())
    }

    fn end_of_line(&mut self) {
        let stack = &mut self.st.stack;
        let len = stack.len();
        if len > stack.defsp {
            // values nobody consumed, e.g. an ignored call result
            stack.data.truncate(stack.defsp);
        } else if len < stack.defsp {
            tracing::error!(
                "Stack below frame base at {} in {} ({} < {})",
                self.st.pos,
                self.st.unit.name(),
                len,
                stack.defsp
            );
        }
        self.st.op2ref = None;
    }

    // ========== Stack ==========

    pub(crate) fn push(&mut self, data: Data) -> Result<()> {
        if self.st.stack.data.len() >= self.rt.config.stack_limit {
            return Err(ScriptError::StackOverflow);
        }
        self.st.stack.data.push(data);
        Ok(())
    }

    fn pop(&mut self) -> Result<Data> {
        if self.st.stack.data.len() <= self.st.stack.defsp {
            return Err(ScriptError::StackUnderflow);
        }
        self.st.stack.data.pop().ok_or(ScriptError::StackUnderflow)
    }

    /// Remove `start..end` and keep the native window indexes valid
    pub(crate) fn pop_stack(&mut self, start: usize, end: usize) {
        let delta = self.st.stack.pop_range(start, end);
        if delta > 0 {
            shift_index(&mut self.st.start, start, end, delta);
            shift_index(&mut self.st.end, start, end, delta);
        }
    }

    // ========== Calls ==========

    /// Invoke the native whose window ends at the stack top
    fn run_func(&mut self) -> Result<()> {
        let end = self.st.stack.len();
        let floor = self.st.stack.defsp + 1;
        let marker = (floor..end)
            .rev()
            .find(|&i| matches!(self.st.stack.data[i], Data::Arg))
            .ok_or(ScriptError::StackUnderflow)?;
        let start = marker - 1;
        self.st.start = start;
        self.st.end = end;

        let index = match &self.st.stack.data[start] {
            Data::Name { key, .. } => {
                let symbol = key.symbol();
                match self.rt.interner.get(symbol) {
                    Some(s) if s.kind == SymbolKind::Native => s.value as usize,
                    _ => return Err(ScriptError::NotCallable(self.rt.interner.name(symbol).to_string())),
                }
            }
            other => return Err(ScriptError::NotCallable(other.type_name().to_string())),
        };
        let def = self
            .rt
            .natives
            .get(index)
            .ok_or_else(|| ScriptError::NotCallable(format!("native #{}", index)))?;
        check_arguments(def, &self.st.stack.data[start + 2..end], &self.rt.config)?;
        let func = def.func;

        func(self)?;

        if self.st.run == RunState::RerunLine {
            // the window stays for the re-run
            return Ok(());
        }
        let (start, end) = (self.st.start, self.st.end);
        self.pop_stack(start, end);

        if self.st.run == RunState::Returning {
            self.script_return()?;
        }
        Ok(())
    }

    /// Unwind to the caller after `return`; the value sits at `st.start`
    fn script_return(&mut self) -> Result<()> {
        let defsp = self.st.stack.defsp;
        let value_at = self.st.start;
        self.pop_stack(defsp, value_at);

        let frame = match defsp.checked_sub(1).map(|i| &self.st.stack.data[i]) {
            Some(Data::RetInfo(info)) => (**info).clone(),
            _ => {
                // top-level return ends the script with its value
                let value = self.st.stack.data.pop().unwrap_or(Data::Nil);
                let value = self.get_val(value)?;
                self.st.result = match value {
                    Data::Nil => None,
                    Data::Int(n) => Some(RegValue::Int(n)),
                    other => Some(RegValue::Str(other.to_text())),
                };
                self.st.run = RunState::Ended;
                return Ok(());
            }
        };

        let unit = if frame.unit == self.st.unit.id() {
            Rc::clone(&self.st.unit)
        } else {
            self.rt
                .units
                .get(&frame.unit)
                .cloned()
                .ok_or(ScriptError::UnknownUnit(frame.unit))?
        };
        self.st.stack.scopes.truncate(frame.scope_depth + 1);
        self.st.unit = unit;
        self.st.pos = frame.pos;
        self.st.stack.defsp = frame.defsp;
        self.pop_stack(defsp - frame.nargs - 1, defsp);
        self.st.run = RunState::Goto;
        Ok(())
    }

    /// Enter a user function or global function: copy the arguments, push
    /// the return frame and open a fresh call-local scope
    pub(crate) fn enter_call(&mut self, first_arg: usize, unit: Option<Rc<ScriptCode>>, pos: usize) -> Result<()> {
        if self.st.stack.call_depth() >= self.rt.config.max_call_depth {
            return Err(ScriptError::CallDepth);
        }
        let depth = self.st.stack.call_depth();
        let unit_id = self.st.unit.id();

        let end = self.st.end;
        let nargs = end.saturating_sub(first_arg);
        for i in first_arg..end {
            let arg = match self.st.stack.data[i].clone() {
                Data::Name { key, scope: None } => {
                    let scope = match self.rt.interner.get(key.symbol()).map(|s| (s.kind, s.scope)) {
                        Some((SymbolKind::Unresolved, VarScope::CallLocal)) => Some(ScopeRef::Frame(depth)),
                        Some((SymbolKind::Unresolved, VarScope::UnitInstance)) => Some(ScopeRef::Unit(unit_id)),
                        _ => None,
                    };
                    Data::Name { key, scope }
                }
                other => other,
            };
            self.push(arg)?;
        }

        let frame = RetInfo {
            pos: self.st.pos,
            unit: unit_id,
            scope_depth: depth,
            nargs,
            defsp: self.st.stack.defsp,
        };
        self.push(Data::RetInfo(Box::new(frame)))?;
        self.st.stack.defsp = self.st.stack.len();
        self.st.stack.scopes.push(Default::default());

        if let Some(unit) = unit {
            self.st.unit = unit;
        }
        self.st.pos = pos;
        self.st.run = RunState::Goto;
        Ok(())
    }

    /// Return frame of the current call, if inside one
    pub(crate) fn current_frame(&self) -> Option<&RetInfo> {
        let defsp = self.st.stack.defsp;
        match defsp.checked_sub(1).map(|i| &self.st.stack.data[i]) {
            Some(Data::RetInfo(info)) => Some(&**info),
            _ => None,
        }
    }

    // ========== Operators ==========

    fn op_2(&mut self, op: OpCode) -> Result<()> {
        let len = self.st.stack.len();
        if len < self.st.stack.defsp + 2 {
            return Err(ScriptError::StackUnderflow);
        }
        let keep_left = self.st.op2ref == Some(len - 2);
        if keep_left {
            self.st.op2ref = None;
        }

        let right = self.pop()?;
        let left = if keep_left {
            self.st.stack.data[len - 2].clone()
        } else {
            self.pop()?
        };
        let left = self.get_val(left)?;
        let right = self.get_val(right)?;

        let result = if left.is_string() || right.is_string() {
            op_2str(op, &left.to_text(), &right.to_text())
        } else {
            Data::Int(op_2num(op, left.to_int(), right.to_int())?)
        };
        self.push(result)
    }

    fn op_1(&mut self, op: OpCode) -> Result<()> {
        let value = self.pop()?;
        let n = self.conv_num(value)?;
        let result = match op {
            OpCode::Neg => n.checked_neg().unwrap_or(i64::MAX),
            OpCode::LNot => (n == 0) as i64,
            _ => !n,
        };
        self.push(Data::Int(result))
    }

    /// `cond ? a : b`
    fn op_3(&mut self) -> Result<()> {
        let b = self.pop()?;
        let a = self.pop()?;
        let cond = self.pop()?;
        let chosen = if self.conv_num(cond)? != 0 { a } else { b };
        let value = self.get_val(chosen)?;
        self.push(value)
    }

    fn incdec(&mut self, op: OpCode) -> Result<()> {
        let Data::Name { key, scope } = self.pop()? else {
            return Err(ScriptError::Runtime("'++'/'--' on a non-variable".to_string()));
        };
        let old = self.read_var(key, scope)?.to_int();
        let new = match op {
            OpCode::AddPost | OpCode::AddPre => old.saturating_add(1),
            _ => old.saturating_sub(1),
        };
        self.write_var(key, scope, &Data::Int(new))?;
        let pushed = if matches!(op, OpCode::AddPost | OpCode::SubPost) { old } else { new };
        self.push(Data::Int(pushed))
    }

    // ========== Native helpers ==========

    /// Name of the native being run
    pub fn func_name(&self) -> String {
        match self.st.stack.data.get(self.st.start) {
            Some(Data::Name { key, .. }) => self.rt.interner.name(key.symbol()).to_string(),
            _ => "?".to_string(),
        }
    }

    /// Arguments passed to the native being run
    pub fn argc(&self) -> usize {
        self.st.end.saturating_sub(self.st.start + 2)
    }

    pub fn has_arg(&self, index: usize) -> bool {
        index < self.argc()
    }

    /// Argument cell as passed, references not followed
    pub fn arg_raw(&self, index: usize) -> Result<&Data> {
        if !self.has_arg(index) {
            return Err(ScriptError::MissingArgument {
                func: self.func_name(),
                index,
            });
        }
        Ok(&self.st.stack.data[self.st.start + 2 + index])
    }

    /// Argument value with references followed
    pub fn arg_value(&mut self, index: usize) -> Result<Data> {
        let raw = self.arg_raw(index)?.clone();
        self.get_val(raw)
    }

    pub fn arg_int(&mut self, index: usize) -> Result<i64> {
        Ok(self.arg_value(index)?.to_int())
    }

    pub fn arg_str(&mut self, index: usize) -> Result<String> {
        Ok(self.arg_value(index)?.to_text())
    }

    /// Variable reference argument
    pub fn arg_ref(&self, index: usize) -> Result<(VarKey, Option<ScopeRef>)> {
        match self.arg_raw(index)? {
            Data::Name { key, scope }
                if matches!(
                    self.rt.interner.kind(key.symbol()),
                    SymbolKind::Unresolved | SymbolKind::Param
                ) =>
            {
                Ok((*key, *scope))
            }
            other => Err(ScriptError::Runtime(format!(
                "'{}' argument {} must be a variable, got {}",
                self.func_name(),
                index + 1,
                other.type_name()
            ))),
        }
    }

    /// Label argument as a code offset
    pub fn arg_label(&self, index: usize) -> Result<usize> {
        match self.arg_raw(index)? {
            Data::Pos(pos) => Ok(*pos),
            Data::Name { key, .. } if self.rt.interner.kind(key.symbol()) == SymbolKind::Label => {
                Ok(self.rt.interner.get(key.symbol()).map_or(0, |s| s.value as usize))
            }
            other => Err(ScriptError::Runtime(format!(
                "'{}' argument {} must be a label, got {}",
                self.func_name(),
                index + 1,
                other.type_name()
            ))),
        }
    }

    pub fn push_int(&mut self, value: i64) -> Result<()> {
        self.push(Data::Int(value))
    }

    pub fn push_str(&mut self, value: impl Into<String>) -> Result<()> {
        self.push(Data::Str(value.into()))
    }

    /// Attached actor, if any
    pub fn actor(&self) -> Option<ActorId> {
        self.st.actor.attached()
    }

    /// Attached actor, or a fatal error for natives that need one
    pub fn require_actor(&self) -> Result<ActorId> {
        self.st
            .actor
            .attached()
            .ok_or_else(|| ScriptError::Runtime(format!("'{}' needs an attached player", self.func_name())))
    }

    pub fn owner(&self) -> EntityId {
        self.st.owner
    }

    pub fn host(&mut self) -> &mut dyn Host {
        &mut *self.host
    }

    pub fn config(&self) -> &ScriptConfig {
        &self.rt.config
    }

    /// Jump to `pos` once the native returns
    pub(crate) fn jump(&mut self, pos: usize) {
        self.st.pos = pos;
        self.st.run = RunState::Goto;
    }
}

/// Runtime re-check of a call against the native's signature
fn check_arguments(def: &NativeDef, args: &[Data], config: &ScriptConfig) -> Result<()> {
    let sig = &def.signature;
    if args.len() < sig.required() {
        return Err(ScriptError::MissingArgument {
            func: def.name.clone(),
            index: args.len(),
        });
    }
    if config.warn_func_mismatch_paramnum {
        if let Some(max) = sig.max() {
            if args.len() > max {
                tracing::warn!("'{}' called with {} arguments, takes at most {}", def.name, args.len(), max);
            }
        }
    }
    if config.warn_func_mismatch_argtypes {
        for (i, arg) in args.iter().enumerate() {
            let fits = match (sig.arg_type(i), arg) {
                (None | Some(ArgType::Value), _) => true,
                (_, Data::Name { .. }) => true,
                (Some(ArgType::Int), data) => !data.is_string(),
                (Some(ArgType::Str), data) => data.is_string(),
                (Some(ArgType::Label), data) => matches!(data, Data::Pos(_)),
                (Some(ArgType::Ref), _) => false,
            };
            if !fits {
                tracing::warn!(
                    "'{}' argument {} has unexpected type {}",
                    def.name,
                    i + 1,
                    arg.type_name()
                );
            }
        }
    }
    Ok(())
}

/// Integer binary operators; arithmetic saturates
fn op_2num(op: OpCode, a: i64, b: i64) -> Result<i64> {
    let value = match op {
        OpCode::LOr => (a != 0 || b != 0) as i64,
        OpCode::LAnd => (a != 0 && b != 0) as i64,
        OpCode::Le => (a <= b) as i64,
        OpCode::Lt => (a < b) as i64,
        OpCode::Ge => (a >= b) as i64,
        OpCode::Gt => (a > b) as i64,
        OpCode::Eq => (a == b) as i64,
        OpCode::Ne => (a != b) as i64,
        OpCode::Xor => a ^ b,
        OpCode::Or => a | b,
        OpCode::And => a & b,
        OpCode::RShift => match u32::try_from(b) {
            Ok(shift) if shift < 64 => a >> shift,
            _ => a >> 63,
        },
        OpCode::LShift => match u32::try_from(b) {
            Ok(shift) if shift < 64 => a.wrapping_shl(shift),
            _ => 0,
        },
        OpCode::Add => a.saturating_add(b),
        OpCode::Sub => a.saturating_sub(b),
        OpCode::Mul => a.saturating_mul(b),
        OpCode::Div => {
            if b == 0 {
                return Err(ScriptError::DivisionByZero);
            }
            a.checked_div(b).unwrap_or(i64::MAX)
        }
        OpCode::Mod => {
            if b == 0 {
                return Err(ScriptError::DivisionByZero);
            }
            a.checked_rem(b).unwrap_or(0)
        }
        _ => return Err(ScriptError::Runtime(format!("{:?} is not a binary operator", op))),
    };
    Ok(value)
}

/// String binary operators: concatenation and comparison
fn op_2str(op: OpCode, a: &str, b: &str) -> Data {
    let flag = |v: bool| Data::Int(v as i64);
    match op {
        OpCode::Add => Data::Str(format!("{}{}", a, b)),
        OpCode::Eq => flag(a == b),
        OpCode::Ne => flag(a != b),
        OpCode::Lt => flag(a < b),
        OpCode::Le => flag(a <= b),
        OpCode::Gt => flag(a > b),
        OpCode::Ge => flag(a >= b),
        _ => {
            tracing::warn!("Operator {:?} is not defined for strings", op);
            Data::Int(0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{run_source, MockHost};
    use crate::ScriptEngine;

    #[test]
    fn test_saturating_arithmetic() {
        assert_eq!(op_2num(OpCode::Add, i64::MAX, 1).unwrap(), i64::MAX);
        assert_eq!(op_2num(OpCode::Sub, i64::MIN, 1).unwrap(), i64::MIN);
        assert_eq!(op_2num(OpCode::Mul, i64::MAX / 2, 3).unwrap(), i64::MAX);
        assert_eq!(op_2num(OpCode::Div, i64::MIN, -1).unwrap(), i64::MAX);
    }

    #[test]
    fn test_division_by_zero_is_fatal() {
        assert!(matches!(op_2num(OpCode::Div, 1, 0), Err(ScriptError::DivisionByZero)));
        assert!(matches!(op_2num(OpCode::Mod, 1, 0), Err(ScriptError::DivisionByZero)));
    }

    #[test]
    fn test_string_operators() {
        assert_eq!(op_2str(OpCode::Add, "ab", "cd"), Data::Str("abcd".into()));
        assert_eq!(op_2str(OpCode::Lt, "apple", "banana"), Data::Int(1));
        assert_eq!(op_2str(OpCode::Mul, "a", "b"), Data::Int(0));
    }

    #[test]
    fn test_concrete_while_scenario() {
        let result = run_source("{ set @a, 1; while(@a < 5) { set @a, @a + 1; } return @a; }");
        assert_eq!(result, Some(RegValue::Int(5)));
    }

    #[test]
    fn test_mixed_operands_concatenate() {
        let result = run_source("{ return \"lv\" + 10; }");
        assert_eq!(result, Some(RegValue::Str("lv10".into())));
    }

    #[test]
    fn test_precedence_and_ternary() {
        assert_eq!(run_source("{ return 2 + 3 * 4; }"), Some(RegValue::Int(14)));
        assert_eq!(run_source("{ return (2 + 3) * 4; }"), Some(RegValue::Int(20)));
        assert_eq!(run_source("{ return 1 < 2 ? 10 : 20; }"), Some(RegValue::Int(10)));
        assert_eq!(run_source("{ return -5 % 3; }"), Some(RegValue::Int(-2)));
        assert_eq!(run_source("{ return !0 + ~0; }"), Some(RegValue::Int(0)));
    }

    #[test]
    fn test_compound_assignment_and_increments() {
        let source = "{ .@a = 10; .@a += 2 * 3; .@a -= 1; .@b = .@a++; ++.@a; return .@a * 100 + .@b; }";
        assert_eq!(run_source(source), Some(RegValue::Int(1715)));
    }

    #[test]
    fn test_while_true_is_runaway() {
        let mut engine = ScriptEngine::new(Default::default());
        let mut host = MockHost::new();
        let unit = engine.compile("loop", "{ while(1) {} }").unwrap();
        let err = engine.run(&mut host, unit, 0, ActorId::NONE, EntityId(1)).unwrap_err();
        assert!(matches!(err, ScriptError::Runaway(RunawayKind::Jumps)));
    }

    #[test]
    fn test_opcode_budget() {
        let mut engine = ScriptEngine::new(ScriptConfig {
            check_cmdcount: 50,
            ..ScriptConfig::default()
        });
        let mut host = MockHost::new();
        let unit = engine
            .compile("long", "{ for (.@i = 0; .@i < 100; .@i++) { .@s += .@i; } }")
            .unwrap();
        let err = engine.run(&mut host, unit, 0, ActorId::NONE, EntityId(1)).unwrap_err();
        assert!(matches!(err, ScriptError::Runaway(RunawayKind::Opcodes)));
    }

    #[test]
    fn test_ignored_call_result_is_discarded() {
        // strlen's value is never consumed; the next statement must still balance
        assert_eq!(run_source("{ strlen(\"abc\"); return 7; }"), Some(RegValue::Int(7)));
    }

    #[test]
    fn test_stack_limit() {
        let mut engine = ScriptEngine::new(ScriptConfig {
            stack_limit: 8,
            ..ScriptConfig::default()
        });
        let mut host = MockHost::new();
        let unit = engine
            .compile("deep", "{ return 1 + (2 + (3 + (4 + (5 + (6 + (7 + (8 + 9))))))); }")
            .unwrap();
        let err = engine.run(&mut host, unit, 0, ActorId::NONE, EntityId(1)).unwrap_err();
        assert!(matches!(err, ScriptError::StackOverflow));
    }
}
