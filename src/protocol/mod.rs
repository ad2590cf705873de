//! # Protocol Layer
//!
//! Messages, the namespace/password handshake, per-connection session state
//! and request dispatch.
//!
//! ## Flow
//! ```text
//! server: Hello{namespace, nonce}  ->
//!                                  <-  client: Authenticate{namespace, credential}
//! server: AuthAccepted | AuthRejected ->
//!                                  <-  client: Request(...)
//! server: Response(Ok | Error)     ->
//!   ... one response per request, no pipelining ...
//! ```

pub mod dispatcher;
pub mod handshake;
pub mod message;
pub mod session;
