//! # Hierarchical Store
//!
//! Data model and storage engine.
//!
//! ## Components
//! - **Route**: validated, ordered list of segments
//! - **Value**: tagged leaf payload (null, bool, int, float, string, list, map)
//! - **RouteTree**: the in-memory branch/leaf tree
//! - **SharedStore**: the tree behind one readers-writer lock, shared by connections

pub mod route;
pub mod shared;
pub mod tree;
pub mod value;

pub use route::{IntoRoute, Route};
pub use shared::SharedStore;
pub use tree::{Node, RouteTree};
pub use value::{Value, ValueMap};
