//! Core type definitions

use serde::{Deserialize, Serialize};
use std::fmt;

/// Attached actor (a connected character). `ActorId(0)` means "no actor".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct ActorId(pub u32);

impl ActorId {
    pub const NONE: ActorId = ActorId(0);

    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn get(&self) -> u32 {
        self.0
    }

    pub fn is_none(&self) -> bool {
        self.0 == 0
    }

    /// `None` for the detached id, `Some(self)` otherwise
    pub fn attached(self) -> Option<ActorId> {
        if self.is_none() {
            None
        } else {
            Some(self)
        }
    }
}

impl From<u32> for ActorId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "actor#{}", self.0)
    }
}

/// Owning world entity (NPC, item, trigger area...)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct EntityId(pub u32);

impl EntityId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

impl From<u32> for EntityId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entity#{}", self.0)
    }
}

/// Account owning one or more characters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(pub u32);

impl AccountId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

impl From<u32> for AccountId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// Compiled bytecode unit handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitId(pub u32);

impl From<u32> for UnitId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unit#{}", self.0)
    }
}

/// Execution state handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StateId(pub u32);

impl From<u32> for StateId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// Host timer handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimerId(pub u32);

impl From<u32> for TimerId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// Host clock in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct Tick(pub u64);

impl Tick {
    pub const fn from_millis(ms: u64) -> Self {
        Self(ms)
    }

    pub fn millis(&self) -> u64 {
        self.0
    }

    /// Tick `ms` milliseconds later, saturating at the end of time
    pub fn after(self, ms: u64) -> Tick {
        Tick(self.0.saturating_add(ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_actor_none() {
        assert!(ActorId::NONE.is_none());
        assert_eq!(ActorId::NONE.attached(), None);
        assert_eq!(ActorId::new(7).attached(), Some(ActorId(7)));
    }

    #[test]
    fn test_tick_after_saturates() {
        assert_eq!(Tick(10).after(5), Tick(15));
        assert_eq!(Tick(u64::MAX).after(1), Tick(u64::MAX));
    }
}
