//! Dialog natives
//!
//! Anything that waits for the player parks the line: the first call shows
//! the window and sets `RerunLine`, the engine parks the state, and once an
//! answer is delivered the same native runs again and finds it in the
//! actor's session.

use super::NativeTable;
use crate::context::{Answer, InputKind};
use crate::error::{Result, ScriptError};
use crate::lang::value::{Data, VarKey};
use crate::lang::vm::Vm;
use crate::state::{RunState, Suspend};
use mapscript_core::ActorId;

/// Menu answer meaning the player cancelled
pub const MENU_CANCEL: u32 = 255;

/// Register dialog window functions
pub(super) fn register_dialog_functions(table: &mut NativeTable) {
    table.define("mes", "s*", builtin_mes);
    table.define("next", "", builtin_next);
    table.define("close", "", builtin_close);
    table.define("close2", "", builtin_close2);
    table.define("select", "s*", builtin_select);
    table.define("prompt", "s*", builtin_prompt);
    table.define("menu", "sl*", builtin_menu);
    table.define("input", "r?ii", builtin_input);
}

/// Answer delivered for the current line, if any
fn take_answer(vm: &mut Vm<'_>, actor: ActorId) -> Option<Answer> {
    vm.rt.actors.get_mut(&actor).and_then(|session| session.answer.take())
}

fn park(vm: &mut Vm<'_>, kind: InputKind) {
    vm.st.suspend = Some(Suspend::AwaitingInput(kind));
    vm.st.run = RunState::RerunLine;
}

fn unexpected(vm: &Vm<'_>, answer: Answer) -> ScriptError {
    ScriptError::Runtime(format!("'{}' cannot use answer {:?}", vm.func_name(), answer))
}

fn set_menu_var(vm: &mut Vm<'_>, choice: u32) -> Result<()> {
    let symbol = vm.rt.interner.intern("@menu");
    vm.write_var(VarKey::of(symbol), None, &Data::Int(choice as i64))
}

fn builtin_mes(vm: &mut Vm<'_>) -> Result<()> {
    let actor = vm.require_actor()?;
    let owner = vm.owner();
    for i in 0..vm.argc() {
        let text = vm.arg_str(i)?;
        vm.host.show_text(actor, owner, &text);
    }
    vm.st.dialog_open = true;
    Ok(())
}

fn builtin_next(vm: &mut Vm<'_>) -> Result<()> {
    let actor = vm.require_actor()?;
    match take_answer(vm, actor) {
        Some(Answer::Next) => Ok(()),
        Some(other) => Err(unexpected(vm, other)),
        None => {
            let owner = vm.owner();
            vm.host.show_next(actor, owner);
            park(vm, InputKind::Next);
            Ok(())
        }
    }
}

/// Wait for the close button, then end
fn builtin_close(vm: &mut Vm<'_>) -> Result<()> {
    close_window(vm)?;
    if vm.st.run != RunState::RerunLine {
        vm.st.run = RunState::Ended;
    }
    Ok(())
}

/// Wait for the close button, then continue without a window
fn builtin_close2(vm: &mut Vm<'_>) -> Result<()> {
    close_window(vm)
}

fn close_window(vm: &mut Vm<'_>) -> Result<()> {
    let actor = vm.require_actor()?;
    match take_answer(vm, actor) {
        Some(Answer::Closed) => {
            vm.st.dialog_open = false;
            Ok(())
        }
        Some(other) => Err(unexpected(vm, other)),
        None => {
            let owner = vm.owner();
            vm.host.show_close(actor, owner);
            park(vm, InputKind::Close);
            Ok(())
        }
    }
}

/// Options from every argument, each split on `:`
fn menu_options(vm: &mut Vm<'_>, args: impl Iterator<Item = usize>) -> Result<Vec<String>> {
    let mut options = Vec::new();
    for i in args {
        let text = vm.arg_str(i)?;
        options.extend(text.split(':').map(str::to_string));
    }
    Ok(options)
}

/// Show a menu or read its answer; `None` while waiting
fn menu_choice(vm: &mut Vm<'_>, options: &[String]) -> Result<Option<u32>> {
    let actor = vm.require_actor()?;
    match take_answer(vm, actor) {
        Some(Answer::Menu(choice)) => Ok(Some(choice)),
        Some(other) => Err(unexpected(vm, other)),
        None => {
            let owner = vm.owner();
            vm.host.open_menu(actor, owner, options);
            vm.st.dialog_open = true;
            park(vm, InputKind::Menu);
            Ok(None)
        }
    }
}

fn valid_choice(choice: u32, count: usize) -> bool {
    choice >= 1 && (choice as usize) <= count
}

/// Pushes the 1-based choice; cancelling ends the script
fn builtin_select(vm: &mut Vm<'_>) -> Result<()> {
    let argc = vm.argc();
    let options = menu_options(vm, 0..argc)?;
    let Some(choice) = menu_choice(vm, &options)? else {
        return Ok(());
    };

    if !valid_choice(choice, options.len()) {
        if choice != MENU_CANCEL {
            tracing::warn!("Invalid menu choice {} of {} from {:?}", choice, options.len(), vm.actor());
        }
        vm.st.run = RunState::Ended;
        return Ok(());
    }
    set_menu_var(vm, choice)?;
    vm.push_int(choice as i64)
}

/// Like `select`, but a cancel is returned as 255
fn builtin_prompt(vm: &mut Vm<'_>) -> Result<()> {
    let argc = vm.argc();
    let options = menu_options(vm, 0..argc)?;
    let Some(choice) = menu_choice(vm, &options)? else {
        return Ok(());
    };

    if choice != MENU_CANCEL && !valid_choice(choice, options.len()) {
        tracing::warn!("Invalid prompt choice {} of {} from {:?}", choice, options.len(), vm.actor());
        vm.st.run = RunState::Ended;
        return Ok(());
    }
    set_menu_var(vm, choice)?;
    vm.push_int(choice as i64)
}

/// `menu "a", L_A, "b", L_B;` jumps to the label of the chosen option
fn builtin_menu(vm: &mut Vm<'_>) -> Result<()> {
    if vm.argc() % 2 != 0 {
        return Err(ScriptError::Runtime("'menu' needs option/label pairs".to_string()));
    }

    // option index -> label argument
    let mut options = Vec::new();
    let mut targets = Vec::new();
    for pair in 0..vm.argc() / 2 {
        let text = vm.arg_str(pair * 2)?;
        for option in text.split(':') {
            options.push(option.to_string());
            targets.push(pair * 2 + 1);
        }
    }

    let Some(choice) = menu_choice(vm, &options)? else {
        return Ok(());
    };
    if !valid_choice(choice, options.len()) {
        vm.st.run = RunState::Ended;
        return Ok(());
    }
    set_menu_var(vm, choice)?;
    let pos = vm.arg_label(targets[choice as usize - 1])?;
    vm.jump(pos);
    Ok(())
}

/// Store the answer in the variable; pushes 1 if it was above the maximum,
/// -1 if below the minimum, 0 otherwise. Numbers are clamped, text is
/// checked by length and kept.
fn builtin_input(vm: &mut Vm<'_>) -> Result<()> {
    let actor = vm.require_actor()?;
    let (key, scope) = vm.arg_ref(0)?;
    let kind = if vm.is_string_var(key.symbol()) {
        InputKind::Text
    } else {
        InputKind::Number
    };

    let answer = match take_answer(vm, actor) {
        Some(answer) => answer,
        None => {
            let owner = vm.owner();
            vm.host.open_input(actor, owner, kind);
            park(vm, kind);
            return Ok(());
        }
    };

    let min = if vm.has_arg(1) { vm.arg_int(1)? } else { vm.config().input_min_value };
    let max = if vm.has_arg(2) { vm.arg_int(2)? } else { vm.config().input_max_value };
    let compare = |n: i64| {
        if n > max {
            1
        } else if n < min {
            -1
        } else {
            0
        }
    };

    let flag = match answer {
        Answer::Number(n) => {
            let value = n.clamp(min, max.max(min));
            vm.write_var(key, scope, &Data::Int(value))?;
            compare(n)
        }
        Answer::Text(text) => {
            let flag = compare(text.chars().count() as i64);
            vm.write_var(key, scope, &Data::Str(text))?;
            flag
        }
        other => return Err(unexpected(vm, other)),
    };
    vm.push_int(flag)
}
