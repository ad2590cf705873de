use tokio::net::TcpStream;
use tracing::{debug, info, instrument, warn};

use crate::config::{ClientConfig, Secret};
use crate::error::{constants, NemoriaError, Result};
use crate::protocol::handshake::{client_authenticate, client_finish};
use crate::protocol::message::{Message, Reply, Request, Response, SaveOptions};
use crate::store::{IntoRoute, Value};
use crate::transport::Connection;
use crate::utils::timeout::with_timeout_error;

/// Client for a Nemoria server.
///
/// One outbound connection, one request in flight at a time. Every
/// operation suspends until its response arrives, the connection is lost,
/// or `response_timeout` passes.
///
/// ```no_run
/// # async fn demo() -> nemoria::Result<()> {
/// use nemoria::Client;
///
/// let mut client = Client::new("127.0.0.1", 1234, "12345678");
/// if !client.connect().await {
///     return Ok(());
/// }
/// client.set("user/profile/name", "Alice").await?;
/// let name = client.get("user/profile/name").await?;
/// assert_eq!(name.as_str(), Some("Alice"));
/// # Ok(())
/// # }
/// ```
pub struct Client {
    config: ClientConfig,
    conn: Option<Connection<TcpStream>>,
    /// Namespace accepted by the server
    namespace: Option<String>,
}

impl Client {
    pub fn new(host: impl Into<String>, port: u16, password: impl Into<Secret>) -> Self {
        Self::with_config(ClientConfig::new(host, port, password))
    }

    pub fn with_config(config: ClientConfig) -> Self {
        Self {
            config,
            conn: None,
            namespace: None,
        }
    }

    /// Claim `namespace` instead of the one the server advertises.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.config.namespace = Some(namespace.into());
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Connect and authenticate, logging the reason on failure.
    pub async fn connect(&mut self) -> bool {
        match self.try_connect().await {
            Ok(()) => true,
            Err(e) => {
                warn!(address = %self.config.address(), error = %e, "Failed to connect");
                false
            }
        }
    }

    /// Connect and authenticate. A previous connection is closed first.
    #[instrument(skip(self), fields(address = %self.config.address()))]
    pub async fn try_connect(&mut self) -> Result<()> {
        let problems = self.config.validate();
        if !problems.is_empty() {
            return Err(NemoriaError::ConfigError(problems.join("; ")));
        }
        self.close().await;

        let address = self.config.address();
        let stream = with_timeout_error(
            async { Ok(TcpStream::connect(&address).await?) },
            self.config.connection_timeout,
        )
        .await?;
        let _ = stream.set_nodelay(true);

        let mut conn = Connection::new(stream)
            .with_timeouts(self.config.response_timeout, self.config.connection_timeout);

        let hello = conn.recv().await?;
        let (namespace, answer) =
            client_authenticate(hello, self.config.namespace.as_deref(), &self.config.password)?;
        conn.send(&answer).await?;
        client_finish(conn.recv().await?)?;

        conn.set_recv_timeout(self.config.response_timeout);
        info!(%namespace, "Connected");
        self.conn = Some(conn);
        self.namespace = Some(namespace);
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// Namespace of the current connection, or the configured one before
    /// connecting.
    pub fn namespace(&self) -> Option<&str> {
        self.namespace
            .as_deref()
            .or(self.config.namespace.as_deref())
    }

    /// Send `Disconnect` and drop the connection. No-op when not connected.
    pub async fn close(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            let _ = conn.send(&Message::Disconnect).await;
            let _ = conn.close().await;
            debug!("Connection closed");
        }
        self.namespace = None;
    }

    /// Store `value` at `route` and return the value now stored.
    pub async fn set(&mut self, route: impl IntoRoute, value: impl Into<Value>) -> Result<Value> {
        self.store(route, value.into(), None).await
    }

    /// `set`, then save the whole store with `save`.
    pub async fn set_with(
        &mut self,
        route: impl IntoRoute,
        value: impl Into<Value>,
        save: SaveOptions,
    ) -> Result<Value> {
        self.store(route, value.into(), Some(save)).await
    }

    pub async fn get(&mut self, route: impl IntoRoute) -> Result<Value> {
        let route = route.into_route()?;
        match self.call(Request::Get { route }).await? {
            Reply::Value(value) => Ok(value),
            other => Err(unexpected(&other)),
        }
    }

    /// Remove the node at `route` with its descendants.
    ///
    /// `Ok(false)` when nothing was stored there.
    pub async fn delete(&mut self, route: impl IntoRoute) -> Result<bool> {
        let route = route.into_route()?;
        self.removed(Request::Delete { route, save: None }).await
    }

    pub async fn delete_with(&mut self, route: impl IntoRoute, save: SaveOptions) -> Result<bool> {
        let route = route.into_route()?;
        self.removed(Request::Delete {
            route,
            save: Some(save),
        })
        .await
    }

    /// Same contract as [`delete`](Self::delete), for top-level routes.
    pub async fn drop_route(&mut self, route: impl IntoRoute) -> Result<bool> {
        let route = route.into_route()?;
        self.removed(Request::Drop { route, save: None }).await
    }

    pub async fn drop_with(&mut self, route: impl IntoRoute, save: SaveOptions) -> Result<bool> {
        let route = route.into_route()?;
        self.removed(Request::Drop {
            route,
            save: Some(save),
        })
        .await
    }

    /// Copy of the whole store.
    pub async fn all(&mut self) -> Result<Value> {
        self.snapshot(Request::All { route: None }).await
    }

    /// Copy of the subtree (or leaf) at `route`.
    pub async fn subtree(&mut self, route: impl IntoRoute) -> Result<Value> {
        let route = route.into_route()?;
        self.snapshot(Request::All { route: Some(route) }).await
    }

    /// Save the store on the server. Returns the number of bytes written.
    pub async fn save(
        &mut self,
        codec: impl Into<String>,
        path: impl Into<String>,
        threadsafe: bool,
    ) -> Result<u64> {
        let options = SaveOptions::new(codec, path, threadsafe);
        match self.call(Request::Save(options)).await? {
            Reply::Saved { bytes } => Ok(bytes),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn ping(&mut self) -> Result<()> {
        match self.call(Request::Ping).await? {
            Reply::Pong => Ok(()),
            other => Err(unexpected(&other)),
        }
    }

    async fn store(
        &mut self,
        route: impl IntoRoute,
        value: Value,
        save: Option<SaveOptions>,
    ) -> Result<Value> {
        let route = route.into_route()?;
        match self.call(Request::Set { route, value, save }).await? {
            Reply::Stored { value, .. } => Ok(value),
            other => Err(unexpected(&other)),
        }
    }

    async fn removed(&mut self, request: Request) -> Result<bool> {
        match self.call(request).await {
            Ok(Reply::Removed) => Ok(true),
            Ok(other) => Err(unexpected(&other)),
            Err(NemoriaError::RouteNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn snapshot(&mut self, request: Request) -> Result<Value> {
        match self.call(request).await? {
            Reply::Snapshot(value) => Ok(value),
            other => Err(unexpected(&other)),
        }
    }

    /// One request/response round trip.
    async fn call(&mut self, request: Request) -> Result<Reply> {
        let conn = self.conn.as_mut().ok_or(NemoriaError::NotConnected)?;

        let result = match conn.send(&Message::Request(request)).await {
            Ok(()) => conn.recv().await,
            Err(e) => Err(e),
        };

        let failure = match result {
            Ok(Message::Response(Response::Ok(reply))) => return Ok(reply),
            Ok(Message::Response(Response::Error(descriptor))) => {
                return Err(NemoriaError::from_descriptor(descriptor))
            }
            Ok(Message::Disconnect) => NemoriaError::ConnectionClosed,
            Ok(other) => NemoriaError::UnexpectedMessage(format!(
                "{}, got {}",
                constants::ERR_EXPECTED_RESPONSE,
                other.name()
            )),
            Err(e) => e,
        };

        // the stream is no longer in a known state
        if matches!(failure, NemoriaError::Io(_)) || failure.is_fatal_to_connection() {
            warn!(error = %failure, "Connection lost");
            self.conn = None;
            self.namespace = None;
        }
        Err(failure)
    }
}

fn unexpected(reply: &Reply) -> NemoriaError {
    NemoriaError::ProtocolViolation(format!("{}: {reply:?}", constants::ERR_REPLY_MISMATCH))
}
