//! # Nemoria
//!
//! A hierarchical key-value store served over a small framed TCP protocol.
//!
//! A [`Server`] owns one namespace, one password and one route tree.
//! [`Client`]s connect, prove they know the namespace/password pair, and then
//! read and write values addressed by [`Route`]s such as `user/profile/name`.
//! The server can load its tree from a JSON or YAML backing file on startup
//! and write it back on shutdown or on request.
//!
//! ## Modules
//! - [`store`]: routes, values and the route tree
//! - [`persistence`]: snapshot codecs and atomic file saves
//! - [`core`]: packet framing
//! - [`protocol`]: messages, handshake, sessions and request dispatch
//! - [`transport`]: framed, timed connections
//! - [`service`]: server and client
//! - [`config`], [`error`], [`utils`]: configuration, errors, logging, metrics, timeouts
//!
//! ## Example
//! ```no_run
//! use nemoria::{Client, Server, ServerConfig};
//! use tokio::sync::mpsc;
//!
//! # async fn demo() -> nemoria::Result<()> {
//! let config = ServerConfig::new("127.0.0.1", 0, "Nemoria", "12345678");
//! let server = Server::new(config)?.bind().await?;
//! let port = server.local_addr().port();
//!
//! let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
//! let handle = tokio::spawn(server.serve(shutdown_rx, false));
//!
//! let mut client = Client::new("127.0.0.1", port, "12345678");
//! assert!(client.connect().await);
//! client.set("user/profile/age", 30).await?;
//! println!("{}", client.all().await?);
//!
//! client.close().await;
//! let _ = shutdown_tx.send(()).await;
//! handle.await.ok();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod persistence;
pub mod protocol;
pub mod service;
pub mod store;
pub mod transport;
pub mod utils;

pub use config::{ClientConfig, LoggingConfig, NemoriaConfig, Secret, ServerConfig};
pub use error::{ErrorKind, NemoriaError, Result};
pub use persistence::{Codec, PersistenceManager};
pub use protocol::message::SaveOptions;
pub use service::{BoundServer, Client, Server};
pub use store::{IntoRoute, Route, RouteTree, SharedStore, Value, ValueMap};
