//! Session state shared by the core components.
//!
//! * [`SessionContext`]: explicitly constructed, injectable owner of the
//!   config, marker store, recency queue and advisory messages.
//! * [`SettingsStore`] / [`MemorySettings`] / [`JsonFileSettings`]: durable
//!   key-value persistence.
//! * [`SessionSettings`]: typed accessors over a settings store.

pub mod context;
pub mod storage;

pub use context::SessionContext;
pub use storage::{JsonFileSettings, MemorySettings, SessionSettings, SettingsStore, StorageError};
