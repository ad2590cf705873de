//! # Persistence
//!
//! On-disk snapshots of the store.
//!
//! ## Components
//! - **Codec**: named snapshot format (JSON, YAML)
//! - **PersistenceManager**: atomic, optionally path-locked saves and loads

pub mod format;
pub mod manager;

pub use format::Codec;
pub use manager::{PersistenceManager, SaveReport};
