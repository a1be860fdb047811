//! Console host
//!
//! One player talking to one NPC through the terminal. Dialog windows are
//! printed to stdout; sleeping scripts wait in a [`TimerQueue`] driven by
//! the event loop.

use mapscript_core::{AccountId, ActorId, EntityId, MapPosition, Tick, TimerId};
use mapscript_scripting::{ActorInfo, ExecutionState, Host, HostAction, InputKind, Param, TimerQueue};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// The console player
pub const PLAYER: ActorId = ActorId::new(1);
/// The NPC running the script
pub const NPC: EntityId = EntityId::new(1);

pub struct ConsoleHost {
    started: Instant,
    player: ActorInfo,
    npc_position: MapPosition,
    attributes: HashMap<Param, i64>,
    timers: TimerQueue<Box<ExecutionState>>,
}

impl ConsoleHost {
    pub fn new(player_name: &str) -> Self {
        let position = MapPosition::new("prontera", 150, 150);
        let attributes = [(Param::BaseLevel, 1), (Param::JobLevel, 1), (Param::Hp, 40), (Param::MaxHp, 40)]
            .into_iter()
            .collect();
        Self {
            started: Instant::now(),
            player: ActorInfo {
                name: player_name.to_string(),
                account: AccountId::new(2_000_000),
                position: position.clone(),
            },
            npc_position: position,
            attributes,
            timers: TimerQueue::new(),
        }
    }

    /// Wall-clock instant of the earliest pending timer
    pub fn next_deadline(&mut self) -> Option<Instant> {
        self.timers
            .next_due()
            .map(|tick| self.started + Duration::from_millis(tick.millis()))
    }

    /// Next state whose timer has expired
    pub fn pop_due(&mut self) -> Option<Box<ExecutionState>> {
        let now = self.now();
        self.timers.pop_due(now).map(|(_, state)| state)
    }

    pub fn has_timers(&self) -> bool {
        !self.timers.is_empty()
    }
}

impl Host for ConsoleHost {
    fn now(&self) -> Tick {
        Tick::from_millis(self.started.elapsed().as_millis() as u64)
    }

    fn actor(&self, actor: ActorId) -> Option<ActorInfo> {
        (actor == PLAYER).then(|| self.player.clone())
    }

    fn entity_position(&self, entity: EntityId) -> Option<MapPosition> {
        (entity == NPC).then(|| self.npc_position.clone())
    }

    fn show_text(&mut self, _actor: ActorId, _owner: EntityId, text: &str) {
        println!("  {}", text);
    }

    fn show_next(&mut self, _actor: ActorId, _owner: EntityId) {
        println!("  [next]");
    }

    fn show_close(&mut self, _actor: ActorId, _owner: EntityId) {
        println!("  [close]");
    }

    fn open_menu(&mut self, _actor: ActorId, _owner: EntityId, options: &[String]) {
        for (i, option) in options.iter().enumerate() {
            println!("  {}) {}", i + 1, option);
        }
        println!("  (number, or 'cancel')");
    }

    fn open_input(&mut self, _actor: ActorId, _owner: EntityId, kind: InputKind) {
        match kind {
            InputKind::Text => println!("  [enter text]"),
            _ => println!("  [enter a number]"),
        }
    }

    fn end_dialog(&mut self, _actor: ActorId, _owner: EntityId) {
        println!("  --");
    }

    fn read_attribute(&self, _actor: ActorId, param: Param) -> i64 {
        self.attributes.get(&param).copied().unwrap_or(0)
    }

    fn write_attribute(&mut self, _actor: ActorId, param: Param, value: i64) -> bool {
        self.attributes.insert(param, value);
        true
    }

    fn perform(&mut self, actor: ActorId, owner: EntityId, action: HostAction<'_>) -> i64 {
        match action {
            HostAction::Announce { text, .. } => println!("[announce] {}", text),
            HostAction::DispBottom { text } => println!("[{}] {}", self.player.name, text),
            HostAction::CountItem { .. } => return 0,
            other => tracing::info!("Host action for {} from {}: {:?}", actor, owner, other),
        }
        1
    }

    fn schedule_timer(&mut self, wake_at: Tick, state: Box<ExecutionState>) -> TimerId {
        self.timers.schedule(wake_at, state)
    }

    fn cancel_timer(&mut self, timer: TimerId) -> Option<Box<ExecutionState>> {
        self.timers.cancel(timer)
    }
}
