//! # Service Layer
//!
//! The two ends of a Nemoria connection.
//!
//! ## Components
//! - **Server**: accept loop, per-connection handshake and request serving
//! - **Client**: connect/authenticate and one round trip per operation

pub mod client;
pub mod server;

pub use client::Client;
pub use server::{BoundServer, Server};
