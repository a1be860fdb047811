//! World functions
//!
//! Side effects on the game world are handed to the host as typed
//! [`HostAction`]s; the host's result is pushed for the script.

use super::NativeTable;
use crate::context::{HostAction, ItemRef, Param};
use crate::error::{Result, ScriptError};
use crate::interner::SymbolKind;
use crate::lang::value::Data;
use crate::lang::vm::Vm;
use mapscript_core::ActorId;

/// Register functions acting on the actor and the world
pub(super) fn register_world_functions(table: &mut NativeTable) {
    // Inventory
    table.define("getitem", "vi", builtin_getitem);
    table.define("delitem", "vi", builtin_delitem);
    table.define("countitem", "v", builtin_countitem);

    // Actor
    table.define("warp", "sii", builtin_warp);
    table.define("sc_start", "iii", builtin_sc_start);
    table.define("heal", "ii", builtin_heal);
    table.define("readparam", "v", builtin_readparam);
    table.define("strcharinfo", "i", builtin_strcharinfo);
    table.define("getcharid", "i", builtin_getcharid);

    // Messages
    table.define("announce", "s?i", builtin_announce);
    table.define("dispbottom", "s", builtin_dispbottom);
    table.define("openshop", "s", builtin_openshop);
    table.define("debugmes", "s", builtin_debugmes);
}

/// Run an action for the attached actor and push the host's answer
fn perform(vm: &mut Vm<'_>, action: HostAction<'_>) -> Result<()> {
    let actor = vm.require_actor()?;
    let owner = vm.owner();
    let result = vm.host().perform(actor, owner, action);
    vm.push_int(result)
}

fn item_ref(item: &Data) -> ItemRef<'_> {
    match item.as_text() {
        Some(name) => ItemRef::Name(name),
        None => ItemRef::Id(item.to_int()),
    }
}

// ============================================================================
// INVENTORY
// ============================================================================

fn builtin_getitem(vm: &mut Vm<'_>) -> Result<()> {
    let item = vm.arg_value(0)?;
    let amount = vm.arg_int(1)?;
    if amount <= 0 {
        tracing::warn!("getitem with amount {}", amount);
        return vm.push_int(0);
    }
    perform(vm, HostAction::GetItem { item: item_ref(&item), amount })
}

fn builtin_delitem(vm: &mut Vm<'_>) -> Result<()> {
    let item = vm.arg_value(0)?;
    let amount = vm.arg_int(1)?;
    if amount <= 0 {
        tracing::warn!("delitem with amount {}", amount);
        return vm.push_int(0);
    }
    perform(vm, HostAction::DelItem { item: item_ref(&item), amount })
}

fn builtin_countitem(vm: &mut Vm<'_>) -> Result<()> {
    let item = vm.arg_value(0)?;
    perform(vm, HostAction::CountItem { item: item_ref(&item) })
}

// ============================================================================
// ACTOR
// ============================================================================

fn builtin_warp(vm: &mut Vm<'_>) -> Result<()> {
    let map = vm.arg_str(0)?;
    let x = coordinate(vm.arg_int(1)?)?;
    let y = coordinate(vm.arg_int(2)?)?;
    perform(vm, HostAction::Warp { map: &map, x, y })
}

fn coordinate(value: i64) -> Result<i32> {
    i32::try_from(value).map_err(|_| ScriptError::Runtime(format!("warp coordinate {} out of range", value)))
}

/// `sc_start status, duration_ms, value`
fn builtin_sc_start(vm: &mut Vm<'_>) -> Result<()> {
    let status = vm.arg_int(0)?;
    let duration_ms = vm.arg_int(1)?;
    let value = vm.arg_int(2)?;
    perform(vm, HostAction::StatusStart { status, duration_ms, value })
}

fn builtin_heal(vm: &mut Vm<'_>) -> Result<()> {
    let hp = vm.arg_int(0)?;
    let sp = vm.arg_int(1)?;
    perform(vm, HostAction::Heal { hp, sp })
}

/// `readparam(Zeny)`: a parameter name, or its numeric code
fn builtin_readparam(vm: &mut Vm<'_>) -> Result<()> {
    let actor = vm.require_actor()?;
    let named = match vm.arg_raw(0)? {
        Data::Name { key, .. } if vm.rt.interner.kind(key.symbol()) == SymbolKind::Param => {
            vm.rt.interner.get(key.symbol()).map(|s| s.value)
        }
        _ => None,
    };
    let code = match named {
        Some(code) => code,
        None => vm.arg_int(0)?,
    };
    let param = Param::from_code(code)
        .ok_or_else(|| ScriptError::Runtime(format!("readparam: unknown parameter {}", code)))?;
    let value = vm.host().read_attribute(actor, param);
    vm.push_int(value)
}

/// 0: character name; anything else is not tracked and gives ""
fn builtin_strcharinfo(vm: &mut Vm<'_>) -> Result<()> {
    let actor = vm.require_actor()?;
    let kind = vm.arg_int(0)?;
    let name = match kind {
        0 => vm.host().actor(actor).map(|info| info.name).unwrap_or_default(),
        _ => String::new(),
    };
    vm.push_str(name)
}

/// 0: character id, 3: account id
fn builtin_getcharid(vm: &mut Vm<'_>) -> Result<()> {
    let actor = vm.require_actor()?;
    let value = match vm.arg_int(0)? {
        0 => actor.get() as i64,
        3 => vm.host().account_of(actor).map_or(0, |account| account.get() as i64),
        _ => 0,
    };
    vm.push_int(value)
}

// ============================================================================
// MESSAGES
// ============================================================================

/// Server-wide broadcast; needs no actor
fn builtin_announce(vm: &mut Vm<'_>) -> Result<()> {
    let text = vm.arg_str(0)?;
    let flags = if vm.has_arg(1) { vm.arg_int(1)? } else { 0 };
    let actor = vm.actor().unwrap_or(ActorId::NONE);
    let owner = vm.owner();
    let result = vm.host().perform(actor, owner, HostAction::Announce { text: &text, flags });
    vm.push_int(result)
}

fn builtin_dispbottom(vm: &mut Vm<'_>) -> Result<()> {
    let text = vm.arg_str(0)?;
    perform(vm, HostAction::DispBottom { text: &text })
}

fn builtin_openshop(vm: &mut Vm<'_>) -> Result<()> {
    let shop = vm.arg_str(0)?;
    perform(vm, HostAction::OpenShop { shop: &shop })
}

fn builtin_debugmes(vm: &mut Vm<'_>) -> Result<()> {
    let text = vm.arg_str(0)?;
    tracing::info!("[{}] {}", vm.owner(), text);
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::context::Param;
    use crate::testing::MockHost;
    use crate::{RunOutcome, ScriptEngine, ScriptError};
    use mapscript_core::{ActorId, EntityId};
    use mapscript_storage::RegValue;

    const PLAYER: ActorId = ActorId::new(3);
    const NPC: EntityId = EntityId::new(40);

    fn run(host: &mut MockHost, source: &str, actor: ActorId) -> crate::Result<RunOutcome> {
        let mut engine = ScriptEngine::new(Default::default());
        let unit = engine.compile("world", source)?;
        engine.run(host, unit, 0, actor, NPC)
    }

    #[test]
    fn test_item_actions_reach_host() {
        let mut host = MockHost::new();
        host.add_actor(PLAYER, "Alice");
        host.action_result = 1;
        let outcome = run(&mut host, "{ getitem 501, 2; return delitem(\"Red Potion\", 1); }", PLAYER).unwrap();
        assert_eq!(outcome, RunOutcome::Finished { result: Some(RegValue::Int(1)) });
        assert_eq!(
            host.actions,
            vec![
                "GetItem { item: Id(501), amount: 2 }".to_string(),
                "DelItem { item: Name(\"Red Potion\"), amount: 1 }".to_string(),
            ]
        );
    }

    #[test]
    fn test_params_and_char_info() {
        let mut host = MockHost::new();
        host.add_actor(PLAYER, "Alice");
        host.set_attribute(PLAYER, Param::Zeny, 150);
        let source = "{ Zeny += 50; return strcharinfo(0) + readparam(Zeny) + getcharid(0); }";
        let outcome = run(&mut host, source, PLAYER).unwrap();
        assert_eq!(outcome, RunOutcome::Finished { result: Some(RegValue::Str("Alice2003".into())) });
        assert_eq!(host.attribute(PLAYER, Param::Zeny), 200);
    }

    #[test]
    fn test_announce_without_actor() {
        let mut host = MockHost::new();
        run(&mut host, "{ announce \"Event started\", 1; }", ActorId::NONE).unwrap();
        assert_eq!(host.actions, vec!["Announce { text: \"Event started\", flags: 1 }".to_string()]);
    }

    #[test]
    fn test_warp_needs_actor() {
        let mut host = MockHost::new();
        let err = run(&mut host, "{ warp \"prontera\", 150, 150; }", ActorId::NONE).unwrap_err();
        assert!(matches!(err, ScriptError::Runtime(_)));
        assert!(host.actions.is_empty());
    }

    #[test]
    fn test_warp_rejects_out_of_range_coordinates() {
        let mut host = MockHost::new();
        host.add_actor(PLAYER, "Alice");
        let err = run(&mut host, "{ warp \"prontera\", 2147483648, 150; }", PLAYER).unwrap_err();
        assert!(err.to_string().contains("out of range"));
        assert!(host.actions.is_empty());
    }
}
