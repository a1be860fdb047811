//! # MapScript Variable Storage
//!
//! Durable storage for script variables that outlive a single run.
//!
//! ## File Format
//!
//! One record per line, `name[,index]<TAB>value`. The index is omitted for
//! element 0. Names ending in `$` hold text, everything else an integer.
//!
//! ```text
//! $event_open	1
//! $winners$,2	Alice
//! ```
//!
//! The [`PersistentRegistry`] is shared between the script engine, which
//! writes through it immediately, and a periodic flush task that rewrites
//! the file only when something changed.

mod error;
mod record;
mod registry;

pub use error::{StorageError, Result};
pub use record::{RegValue, VarRecord, parse_records, format_records};
pub use registry::PersistentRegistry;
