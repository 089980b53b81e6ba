//! Keyed state registries.
//!
//! # Data Flow
//! ```text
//! policy consults key
//!     → store.rs (get_or_create, stamp access)
//!     → policy mutates entity under its slot lock
//!     → eviction.rs (is a scan due?) → store.rs (evict_stale)
//! ```
//!
//! # Design Decisions
//! - One store per policy, owned by that policy, never global
//! - Per-entity locks, never held across a scan
//! - Scans are amortized: size above half the ceiling, at most once per interval

pub mod eviction;
pub mod store;

pub use eviction::EvictionPolicy;
pub use store::{KeyedStore, Slot};
