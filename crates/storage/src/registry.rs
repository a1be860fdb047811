//! Shared persistent variable registry

use crate::error::Result;
use crate::record::{format_records, parse_records, RegValue, VarRecord};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

/// Key of one stored slot: lowercase name plus array index
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RegKey {
    name: String,
    index: u32,
}

/// Global-persistent variable registry
///
/// # Purpose
/// Holds every `$`-variable. Writes are visible immediately to the next
/// read; the backing file is only rewritten by [`flush_if_dirty`].
///
/// # Thread Safety
/// Slots live in a `DashMap` so the flush task can snapshot them while the
/// engine thread keeps writing. File writes are serialized by a mutex.
///
/// [`flush_if_dirty`]: PersistentRegistry::flush_if_dirty
pub struct PersistentRegistry {
    vars: DashMap<RegKey, RegValue>,
    dirty: AtomicBool,
    write_lock: Mutex<()>,
}

impl PersistentRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            vars: DashMap::new(),
            dirty: AtomicBool::new(false),
            write_lock: Mutex::new(()),
        }
    }

    /// Build a registry from parsed records (starts clean)
    pub fn from_records(records: impl IntoIterator<Item = VarRecord>) -> Self {
        let registry = Self::new();
        for record in records {
            if record.value.is_empty() {
                continue;
            }
            registry.vars.insert(
                RegKey { name: record.name.to_ascii_lowercase(), index: record.index },
                record.value,
            );
        }
        registry
    }

    /// Load a registry file; a missing file yields an empty registry
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!("No variable file at {:?}, starting empty", path);
            return Ok(Self::new());
        }
        let content = fs::read_to_string(path)?;
        let registry = Self::from_records(parse_records(&content));
        tracing::info!("Loaded {} variables from {:?}", registry.len(), path);
        Ok(registry)
    }

    /// Read a slot
    pub fn get(&self, name: &str, index: u32) -> Option<RegValue> {
        self.vars
            .get(&RegKey { name: name.to_ascii_lowercase(), index })
            .map(|entry| entry.value().clone())
    }

    /// Write a slot; empty values delete it
    pub fn set(&self, name: &str, index: u32, value: RegValue) {
        let key = RegKey { name: name.to_ascii_lowercase(), index };
        if value.is_empty() {
            if self.vars.remove(&key).is_some() {
                self.mark_dirty();
            }
            return;
        }
        let changed = self.vars.get(&key).map_or(true, |old| *old.value() != value);
        if changed {
            self.vars.insert(key, value);
            self.mark_dirty();
        }
    }

    /// Highest used index below `max_slots`
    pub fn highest_index(&self, name: &str, max_slots: u32) -> Option<u32> {
        let name = name.to_ascii_lowercase();
        (0..max_slots)
            .rev()
            .find(|&index| self.vars.contains_key(&RegKey { name: name.clone(), index }))
    }

    /// Number of stored slots
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    /// Snapshot of all slots, sorted by name then index
    pub fn records(&self) -> Vec<VarRecord> {
        let mut records: Vec<VarRecord> = self
            .vars
            .iter()
            .map(|entry| VarRecord::new(entry.key().name.clone(), entry.key().index, entry.value().clone()))
            .collect();
        records.sort_by(|a, b| a.name.cmp(&b.name).then(a.index.cmp(&b.index)));
        records
    }

    /// Rewrite the file unconditionally (write-then-rename)
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let _guard = self.write_lock.lock();

        // Clear first so writes racing with the snapshot mark it dirty again
        self.dirty.store(false, Ordering::Release);
        let content = format_records(&self.records());

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = path.with_extension("tmp");
        if let Err(e) = fs::write(&tmp, content).and_then(|_| fs::rename(&tmp, path)) {
            self.mark_dirty();
            return Err(e.into());
        }

        tracing::debug!("Saved {} variables to {:?}", self.len(), path);
        Ok(())
    }

    /// Rewrite the file only if something changed; returns whether it wrote
    pub fn flush_if_dirty<P: AsRef<Path>>(&self, path: P) -> Result<bool> {
        if !self.is_dirty() {
            return Ok(false);
        }
        self.save(path)?;
        Ok(true)
    }
}

impl Default for PersistentRegistry {
    fn default() -> Self {
        Self::new()
    }
}
