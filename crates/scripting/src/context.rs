//! Host interface
//!
//! The engine never touches the world directly. Everything it needs from
//! the embedding server (actor lookups, dialog windows, inventory and
//! timers) goes through the [`Host`] trait.

use crate::state::ExecutionState;
use mapscript_core::{AccountId, ActorId, EntityId, MapPosition, Tick, TimerId};
use serde::{Deserialize, Serialize};

/// Actor attributes exposed to scripts as read/write names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Param {
    Zeny,
    BaseLevel,
    JobLevel,
    Hp,
    MaxHp,
    Sp,
    MaxSp,
    Sex,
    Class,
    StatusPoint,
    SkillPoint,
    Weight,
    MaxWeight,
}

impl Param {
    pub const ALL: [Param; 13] = [
        Param::Zeny,
        Param::BaseLevel,
        Param::JobLevel,
        Param::Hp,
        Param::MaxHp,
        Param::Sp,
        Param::MaxSp,
        Param::Sex,
        Param::Class,
        Param::StatusPoint,
        Param::SkillPoint,
        Param::Weight,
        Param::MaxWeight,
    ];

    /// Script-visible name
    pub fn name(&self) -> &'static str {
        match self {
            Param::Zeny => "Zeny",
            Param::BaseLevel => "BaseLevel",
            Param::JobLevel => "JobLevel",
            Param::Hp => "Hp",
            Param::MaxHp => "MaxHp",
            Param::Sp => "Sp",
            Param::MaxSp => "MaxSp",
            Param::Sex => "Sex",
            Param::Class => "Class",
            Param::StatusPoint => "StatusPoint",
            Param::SkillPoint => "SkillPoint",
            Param::Weight => "Weight",
            Param::MaxWeight => "MaxWeight",
        }
    }

    pub fn code(&self) -> i64 {
        *self as i64
    }

    pub fn from_code(code: i64) -> Option<Param> {
        usize::try_from(code).ok().and_then(|i| Self::ALL.get(i).copied())
    }
}

/// Live data about an actor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorInfo {
    pub name: String,
    pub account: AccountId,
    pub position: MapPosition,
}

/// What kind of answer a parked script waits for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputKind {
    /// "next" button
    Next,
    /// "close" button
    Close,
    /// Menu choice
    Menu,
    Number,
    Text,
}

/// An actor's answer to a dialog prompt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Answer {
    Next,
    /// Close button pressed, or the window was dismissed
    Closed,
    /// 1-based choice; 255 means cancelled
    Menu(u32),
    Number(i64),
    Text(String),
}

impl Answer {
    /// The input kind this answer satisfies
    pub fn kind(&self) -> InputKind {
        match self {
            Answer::Next => InputKind::Next,
            Answer::Closed => InputKind::Close,
            Answer::Menu(_) => InputKind::Menu,
            Answer::Number(_) => InputKind::Number,
            Answer::Text(_) => InputKind::Text,
        }
    }
}

/// Item reference by id or by name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemRef<'a> {
    Id(i64),
    Name(&'a str),
}

/// World side effects requested by natives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostAction<'a> {
    GetItem { item: ItemRef<'a>, amount: i64 },
    DelItem { item: ItemRef<'a>, amount: i64 },
    CountItem { item: ItemRef<'a> },
    Warp { map: &'a str, x: i32, y: i32 },
    StatusStart { status: i64, duration_ms: i64, value: i64 },
    Heal { hp: i64, sp: i64 },
    /// Server-wide broadcast
    Announce { text: &'a str, flags: i64 },
    /// Message in the actor's chat window
    DispBottom { text: &'a str },
    OpenShop { shop: &'a str },
}

/// Services the embedding server provides to the engine
///
/// # Purpose
/// All entity lookups are by id and return `None` once the entity is gone,
/// so a script never holds a dangling handle to the world.
///
/// # Timers
/// A sleeping script is handed over whole through [`schedule_timer`]. When
/// the timer fires the host passes it back to
/// [`ScriptEngine::wake`](crate::ScriptEngine::wake).
///
/// [`schedule_timer`]: Host::schedule_timer
pub trait Host {
    /// Current host tick
    fn now(&self) -> Tick;

    /// Resolve an actor id to its live data
    fn actor(&self, actor: ActorId) -> Option<ActorInfo>;

    fn account_of(&self, actor: ActorId) -> Option<AccountId> {
        self.actor(actor).map(|info| info.account)
    }

    /// Position of an owning entity (NPC etc.)
    fn entity_position(&self, entity: EntityId) -> Option<MapPosition>;

    // ========== Dialog ==========

    fn show_text(&mut self, actor: ActorId, owner: EntityId, text: &str);
    fn show_next(&mut self, actor: ActorId, owner: EntityId);
    fn show_close(&mut self, actor: ActorId, owner: EntityId);
    fn open_menu(&mut self, actor: ActorId, owner: EntityId, options: &[String]);
    fn open_input(&mut self, actor: ActorId, owner: EntityId, kind: InputKind);

    /// Tear down the dialog window without waiting for the actor
    fn end_dialog(&mut self, actor: ActorId, owner: EntityId);

    // ========== Actor state ==========

    fn read_attribute(&self, actor: ActorId, param: Param) -> i64;

    /// Returns false if the host refused the write
    fn write_attribute(&mut self, actor: ActorId, param: Param, value: i64) -> bool;

    /// Perform a world side effect; the result is pushed for the script
    fn perform(&mut self, actor: ActorId, owner: EntityId, action: HostAction<'_>) -> i64 {
        tracing::debug!("Unhandled host action {:?} for {} from {}", action, actor, owner);
        0
    }

    // ========== Timers ==========

    /// Keep a sleeping state until `wake_at`
    fn schedule_timer(&mut self, wake_at: Tick, state: Box<ExecutionState>) -> TimerId;

    /// Cancel a pending timer, returning its state if it had not fired
    fn cancel_timer(&mut self, timer: TimerId) -> Option<Box<ExecutionState>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_codes_roundtrip() {
        for param in Param::ALL {
            assert_eq!(Param::from_code(param.code()), Some(param));
        }
        assert_eq!(Param::from_code(-1), None);
        assert_eq!(Param::from_code(99), None);
    }

    #[test]
    fn test_answer_kind() {
        assert_eq!(Answer::Menu(2).kind(), InputKind::Menu);
        assert_eq!(Answer::Text("x".into()).kind(), InputKind::Text);
        assert_eq!(Answer::Closed.kind(), InputKind::Close);
    }
}
