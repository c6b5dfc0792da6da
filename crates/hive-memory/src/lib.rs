//! Shared coordination store for Hive agents.
//!
//! A hierarchical, namespaced key/value store with TTL expiry. Agents use it
//! to pass objective state, task results, and learned success/failure
//! patterns to each other and across sessions. It is the only mutable state
//! shared between concurrently running agents.
//!
//! # Main types
//!
//! - [`CoordinationStore`] — Async store trait (`store`, `get`, `query`, `delete`).
//! - [`InMemoryStore`] — Volatile backend, safe for concurrent use.
//! - [`FileStore`] — JSONL-backed persistent backend.
//! - [`Namespace`] — Validated hierarchical namespace path.
//! - [`Session`] — Store lifecycle handle for one coordinator session.

/// JSONL-backed persistent store.
pub mod file;
/// Namespace paths and agent-scoped keys.
pub mod namespace;
/// Session lifecycle on top of a store.
pub mod session;
/// Store trait, entry type, and in-memory backend.
pub mod store;

pub use file::FileStore;
pub use namespace::{scoped_key, Namespace, PatternOutcome};
pub use session::Session;
pub use store::{
    CoordinationStore, CoordinationStoreExt, InMemoryStore, MemoryEntry, QueryFilter,
};
