//! # Server
//!
//! Accepts TCP connections, authenticates them against the configured
//! namespace and password, and serves requests against one shared store.
//!
//! ## Lifecycle
//! 1. [`Server::new`] validates the configuration.
//! 2. [`Server::bind`] loads the backing file (missing: start empty, corrupt:
//!    fail) and binds the listener.
//! 3. [`BoundServer::serve`] accepts until the shutdown channel fires, with one
//!    task per connection.
//! 4. On shutdown, open connections get a `Disconnect`, the server waits up to
//!    `shutdown_timeout` for them, and the store is written back to the
//!    backing file if one is configured.
//!
//! [`Server::run_forever`] wires Ctrl-C to the shutdown channel and runs all
//! of the above.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

use crate::config::{Secret, ServerConfig};
use crate::error::{constants, NemoriaError, Result};
use crate::persistence::PersistenceManager;
use crate::protocol::dispatcher::{get_opcode, Dispatcher};
use crate::protocol::handshake::{server_hello, server_verify};
use crate::protocol::message::{Message, Response};
use crate::protocol::session::{Session, SessionState};
use crate::store::{RouteTree, SharedStore};
use crate::transport::Connection;
use crate::utils::metrics::Metrics;

/// A configured, not yet listening server.
#[derive(Debug)]
pub struct Server {
    config: ServerConfig,
    store: Arc<SharedStore>,
    persistence: Arc<PersistenceManager>,
    metrics: Arc<Metrics>,
}

impl Server {
    /// Validate `config` and create an empty server.
    pub fn new(config: ServerConfig) -> Result<Self> {
        config.validate_strict()?;
        Ok(Self {
            config,
            store: Arc::new(SharedStore::new()),
            persistence: Arc::new(PersistenceManager::new()),
            metrics: Arc::new(Metrics::new()),
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Handle to the store, for embedded use alongside the network surface.
    pub fn store(&self) -> Arc<SharedStore> {
        self.store.clone()
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        self.metrics.clone()
    }

    /// Load the backing file, if any, and bind the listener.
    #[instrument(skip(self), fields(address = %self.config.address(), namespace = %self.config.namespace))]
    pub async fn bind(self) -> Result<BoundServer> {
        if let (Some(file), Some(codec)) = (&self.config.file, self.config.file_codec()?) {
            if let Some(snapshot) = self.persistence.load_or_empty(codec, file).await? {
                let tree = RouteTree::from_snapshot(snapshot)?;
                info!(path = %file.display(), entries = tree.len(), "Loaded store from backing file");
                self.store.replace(tree)?;
            }
        }

        let listener = TcpListener::bind(self.config.address()).await?;
        let local_addr = listener.local_addr()?;
        info!(%local_addr, "Listening");

        Ok(BoundServer {
            server: self,
            listener,
            local_addr,
        })
    }

    /// Bind and serve until Ctrl-C.
    ///
    /// With `raise_on_error`, the first failed request stops the server and
    /// its error is returned.
    pub async fn run_forever(self, raise_on_error: bool) -> Result<()> {
        let bound = self.bind().await?;

        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
        tokio::spawn(forward_shutdown(tokio::signal::ctrl_c(), shutdown_tx));

        bound.serve(shutdown_rx, raise_on_error).await
    }
}

/// Fire `shutdown_tx` once `signal` arrives.
///
/// If the signal cannot be listened for, the sender is held forever so the
/// server keeps running until stopped some other way.
async fn forward_shutdown<F>(signal: F, shutdown_tx: mpsc::Sender<()>)
where
    F: Future<Output = std::io::Result<()>>,
{
    match signal.await {
        Ok(()) => {
            info!("Received CTRL+C signal, shutting down");
            let _ = shutdown_tx.send(()).await;
        }
        Err(e) => {
            error!(error = %e, "Unable to listen for CTRL+C, serving until stopped");
            std::future::pending::<()>().await;
        }
    }
}

/// Everything a connection task needs.
#[derive(Clone)]
struct ConnectionContext {
    dispatcher: Dispatcher,
    namespace: Arc<str>,
    password: Arc<Secret>,
    metrics: Arc<Metrics>,
    handshake_timeout: Duration,
    idle_timeout: Duration,
    write_timeout: Duration,
    raise_on_error: bool,
}

/// A server with a bound listener.
#[derive(Debug)]
pub struct BoundServer {
    server: Server,
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl BoundServer {
    /// Address actually bound (useful with port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn store(&self) -> Arc<SharedStore> {
        self.server.store()
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        self.server.metrics()
    }

    /// Accept connections until `shutdown_rx` yields or is closed.
    #[instrument(skip(self, shutdown_rx), fields(address = %self.local_addr))]
    pub async fn serve(self, mut shutdown_rx: mpsc::Receiver<()>, raise_on_error: bool) -> Result<()> {
        let BoundServer {
            server, listener, ..
        } = self;
        let config = &server.config;

        let ctx = ConnectionContext {
            dispatcher: Dispatcher::new(
                server.store.clone(),
                server.persistence.clone(),
                server.metrics.clone(),
            ),
            namespace: Arc::from(config.namespace.as_str()),
            password: Arc::new(config.password.clone()),
            metrics: server.metrics.clone(),
            handshake_timeout: config.handshake_timeout,
            idle_timeout: config.idle_timeout,
            write_timeout: config.write_timeout,
            raise_on_error,
        };

        let limiter = Arc::new(Semaphore::new(config.max_connections));
        let (closing_tx, closing_rx) = watch::channel(false);
        let mut tasks: JoinSet<Result<()>> = JoinSet::new();

        let outcome = loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Shutting down server. Waiting for connections to close...");
                    break Ok(());
                }

                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    match joined {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => {
                            error!(error = %e, "Request failed with raise_on_error set, stopping server");
                            break Err(e);
                        }
                        Err(e) => error!(error = %e, "Connection task panicked"),
                    }
                }

                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, peer)) => {
                            let Ok(permit) = limiter.clone().try_acquire_owned() else {
                                warn!(%peer, "Connection limit reached, refusing");
                                server.metrics.connection_refused();
                                drop(stream);
                                continue;
                            };
                            let ctx = ctx.clone();
                            let closing = closing_rx.clone();
                            tasks.spawn(async move {
                                let result = handle_connection(stream, peer, ctx, closing).await;
                                drop(permit);
                                result
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "Error accepting connection");
                        }
                    }
                }
            }
        };

        drop(listener);
        let _ = closing_tx.send(true);
        drain(&mut tasks, config.shutdown_timeout).await;

        if let (Some(file), Some(codec)) = (&config.file, config.file_codec()?) {
            let snapshot = server.store.all()?;
            match server.persistence.save(&snapshot, codec, file, true).await {
                Ok(report) => info!(path = %report.path.display(), "Store written to backing file"),
                Err(e) => {
                    error!(error = %e, "Failed to write backing file on shutdown");
                    if outcome.is_ok() {
                        return Err(e);
                    }
                }
            }
        }

        server.metrics.log_metrics();
        outcome
    }
}

async fn drain(tasks: &mut JoinSet<Result<()>>, limit: Duration) {
    let deadline = tokio::time::sleep(limit);
    tokio::pin!(deadline);

    while !tasks.is_empty() {
        tokio::select! {
            _ = &mut deadline => {
                warn!(remaining = tasks.len(), "Shutdown timeout reached, aborting connections");
                tasks.abort_all();
                break;
            }
            joined = tasks.join_next() => {
                if let Some(Ok(Err(e))) = joined {
                    debug!(error = %e, "Connection ended with error during shutdown");
                }
            }
        }
    }
    info!("All connections closed");
}

/// Serve one client.
///
/// Returns `Err` only when a request failed and `raise_on_error` is set;
/// handshake failures and protocol errors close this connection and return
/// `Ok`.
#[instrument(skip(stream, ctx, closing))]
async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    ctx: ConnectionContext,
    mut closing: watch::Receiver<bool>,
) -> Result<()> {
    let _ = stream.set_nodelay(true);
    ctx.metrics.connection_established();
    info!("New connection established");

    let mut conn = Connection::new(stream)
        .with_timeouts(ctx.write_timeout, ctx.handshake_timeout)
        .with_metrics(ctx.metrics.clone());
    let mut session = Session::new(peer.to_string());

    let result = serve_session(&mut conn, &mut session, &ctx, &mut closing).await;

    session.close();
    let _ = conn.close().await;
    ctx.metrics.connection_closed();
    info!("Connection closed");
    result
}

async fn serve_session(
    conn: &mut Connection<TcpStream>,
    session: &mut Session,
    ctx: &ConnectionContext,
    closing: &mut watch::Receiver<bool>,
) -> Result<()> {
    if !authenticate(conn, session, ctx).await {
        return Ok(());
    }

    conn.set_recv_timeout(ctx.idle_timeout);

    loop {
        let next = tokio::select! {
            msg = conn.recv() => Some(msg),
            _ = closing.changed() => None,
        };
        let Some(msg) = next else {
            debug!("Server closing, disconnecting client");
            let _ = conn.send(&Message::Disconnect).await;
            return Ok(());
        };

        let request = match msg {
            Ok(Message::Request(request)) => request,
            Ok(Message::Disconnect) => {
                debug!("Client disconnected");
                return Ok(());
            }
            Ok(other) => {
                ctx.metrics.protocol_error();
                warn!(msg = other.name(), "{}, closing connection", constants::ERR_EXPECTED_REQUEST);
                return Ok(());
            }
            Err(NemoriaError::ConnectionClosed) => return Ok(()),
            Err(NemoriaError::Timeout) => {
                info!("Connection idle too long, closing");
                return Ok(());
            }
            Err(e) => {
                ctx.metrics.protocol_error();
                warn!(error = %e, "Protocol error, closing connection");
                return Ok(());
            }
        };

        session.advance(SessionState::Serving)?;
        let op = get_opcode(&request);
        let result = ctx.dispatcher.dispatch(request).await;
        ctx.metrics.request_processed(result.is_err());

        let (response, failure) = match result {
            Ok(reply) => (Response::Ok(reply), None),
            Err(e) => {
                warn!(op, error = %e, "Request failed");
                (Response::Error(e.to_descriptor()), Some(e))
            }
        };

        if let Err(e) = conn.send(&Message::Response(response)).await {
            warn!(error = %e, "Failed to send response, closing connection");
            return Ok(());
        }
        session.advance(SessionState::Authenticated)?;

        if let Some(e) = failure {
            if ctx.raise_on_error {
                return Err(e);
            }
        }
    }
}

/// Run the server side of the handshake. Returns whether the client got in.
async fn authenticate(
    conn: &mut Connection<TcpStream>,
    session: &mut Session,
    ctx: &ConnectionContext,
) -> bool {
    ctx.metrics.handshake_attempt();
    if session.advance(SessionState::Authenticating).is_err() {
        return false;
    }

    let (state, hello) = server_hello(&ctx.namespace);
    let answer = match conn.send(&hello).await {
        Ok(()) => conn.recv().await,
        Err(e) => Err(e),
    };

    let verdict = answer.and_then(|answer| server_verify(state, &ctx.password, answer));
    match verdict {
        Ok(()) => {
            if let Err(e) = conn.send(&Message::AuthAccepted).await {
                ctx.metrics.handshake_failed();
                warn!(error = %e, "Failed to confirm authentication");
                return false;
            }
            ctx.metrics.handshake_success();
            session.advance(SessionState::Authenticated).is_ok()
        }
        Err(NemoriaError::AuthenticationFailed) => {
            ctx.metrics.handshake_failed();
            let _ = conn.send(&Message::AuthRejected).await;
            false
        }
        Err(e) => {
            ctx.metrics.handshake_failed();
            ctx.metrics.protocol_error();
            warn!(error = %e, "Handshake failed");
            false
        }
    }
}
