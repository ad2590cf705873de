use crate::core::codec::PacketCodec;
use crate::core::packet::Packet;
use crate::error::{NemoriaError, Result};
use crate::protocol::message::Message;
use crate::utils::metrics::Metrics;
use crate::utils::timeout::{with_timeout_error, DEFAULT_TIMEOUT};

use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;
use tracing::{debug, instrument, trace};

/// Framed, timed message stream over any byte stream.
///
/// Each `send`/`recv` is bounded by its own timeout so a stalled peer only
/// ever blocks the task that owns this connection.
pub struct Connection<S> {
    framed: Framed<S, PacketCodec>,
    send_timeout: Duration,
    recv_timeout: Duration,
    metrics: Option<Arc<Metrics>>,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self {
            framed: Framed::new(stream, PacketCodec),
            send_timeout: DEFAULT_TIMEOUT,
            recv_timeout: DEFAULT_TIMEOUT,
            metrics: None,
        }
    }

    /// Set custom timeout durations
    pub fn with_timeouts(mut self, send_timeout: Duration, recv_timeout: Duration) -> Self {
        self.send_timeout = send_timeout;
        self.recv_timeout = recv_timeout;
        self
    }

    /// Count frames and bytes into `metrics`
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn set_recv_timeout(&mut self, recv_timeout: Duration) {
        self.recv_timeout = recv_timeout;
    }

    #[instrument(skip(self, msg), fields(msg = msg.name()), level = "debug")]
    pub async fn send(&mut self, msg: &Message) -> Result<()> {
        let payload = bincode::serialize(msg)?;
        let len = payload.len() as u64;
        let packet = Packet::new(payload);

        trace!(timeout_ms = ?self.send_timeout.as_millis(), bytes = len, "Sending packet");

        with_timeout_error(
            async {
                self.framed.send(packet).await?;
                Ok(())
            },
            self.send_timeout,
        )
        .await?;

        if let Some(metrics) = &self.metrics {
            metrics.message_sent(len);
        }
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    pub async fn recv(&mut self) -> Result<Message> {
        trace!(timeout_ms = ?self.recv_timeout.as_millis(), "Receiving packet");

        let packet = with_timeout_error(
            async {
                self.framed
                    .next()
                    .await
                    .ok_or(NemoriaError::ConnectionClosed)?
            },
            self.recv_timeout,
        )
        .await?;

        if let Some(metrics) = &self.metrics {
            metrics.message_received(packet.payload.len() as u64);
        }

        let msg: Message = bincode::deserialize(&packet.payload)?;
        debug!(msg = msg.name(), "Received message");
        Ok(msg)
    }

    /// Flush and shut down the write half.
    pub async fn close(&mut self) -> Result<()> {
        with_timeout_error(
            async {
                self.framed.close().await?;
                Ok(())
            },
            self.send_timeout,
        )
        .await
    }
}
