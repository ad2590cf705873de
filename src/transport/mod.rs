//! # Transport Layer
//!
//! Framed, timed message exchange over a byte stream. Nemoria runs over plain
//! TCP; the connection type is generic so tests can drive it over in-memory
//! pipes.

pub mod connection;

pub use connection::Connection;
