//! Request listener: accept, parse, dispatch, respond, close
//!
//! Connections are served one at a time. Each gets a fresh envelope; the
//! next client is accepted only after the previous one has been answered
//! and closed.

use crate::command::CommandExecutor;
use crate::transport::{TransportListener, TransportStream};
use anyhow::{Context, Result};
use bytes::BytesMut;
use incubator_shared::{CommandEnvelope, EnvelopeState, Response, Status, MALFORMED_REQUEST_BODY};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::{timeout, Instant};
use tracing::{debug, error, info, warn};

const READ_CHUNK_BYTES: usize = 512;

/// Pause after a failed accept before trying again
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Time limits applied to every connection
#[derive(Debug, Clone, Copy)]
pub struct ListenerTimeouts {
    /// Longest wait for any single read
    pub read: Duration,
    /// Budget for receiving the whole request, however it is split
    pub request: Duration,
    pub write: Duration,
}

pub struct RequestListener<L: TransportListener> {
    listener: L,
    executor: Arc<CommandExecutor>,
    timeouts: ListenerTimeouts,
}

impl<L: TransportListener> RequestListener<L> {
    pub fn new(listener: L, executor: Arc<CommandExecutor>, timeouts: ListenerTimeouts) -> Self {
        Self {
            listener,
            executor,
            timeouts,
        }
    }

    /// Serve clients until the task is cancelled
    pub async fn run(&self) -> Result<()> {
        info!(
            "Listening for commands on {} ({})",
            self.listener.local_addr()?,
            self.listener.name()
        );

        loop {
            if let Err(e) = self.serve_next().await {
                error!("Connection error: {:#}", e);
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }

    /// Accept one client and serve it. Returns the answered envelope, or
    /// `None` when the client left before a request could be resolved.
    pub async fn serve_next(&self) -> Result<Option<CommandEnvelope>> {
        let stream = self.listener.accept().await.context("Accept failed")?;
        self.serve_connection(stream).await
    }

    pub async fn serve_connection(&self, mut stream: L::Stream) -> Result<Option<CommandEnvelope>> {
        let peer = stream.peer();
        debug!("Connection from {}", peer);

        let Some(mut envelope) = self.receive(&mut stream, &peer).await? else {
            close(&mut stream, &peer).await;
            return Ok(None);
        };

        if envelope.is_resolved() {
            self.executor.execute(&mut envelope).await;
        }

        let Some(response) = envelope.response() else {
            // execute() answers every resolved envelope and parse errors answer themselves
            warn!("No response produced for {}", peer);
            close(&mut stream, &peer).await;
            return Ok(None);
        };

        if let Some(e) = envelope.parse_error() {
            warn!("Malformed request from {}: {}", peer, e);
        }

        let encoded = response.encode();
        let write_timeout = self.timeouts.write;
        match timeout(write_timeout, stream.write_all(&encoded)).await {
            Ok(result) => result.with_context(|| format!("Write to {} failed", peer))?,
            Err(_) => anyhow::bail!("Write to {} timed out after {:?}", peer, write_timeout),
        }

        debug!("Responded {} to {}", response.status, peer);
        close(&mut stream, &peer).await;

        Ok(Some(envelope))
    }

    /// Read until the envelope leaves the receiving states or the request
    /// budget runs out. `None` means the envelope was discarded.
    async fn receive(
        &self,
        stream: &mut L::Stream,
        peer: &str,
    ) -> Result<Option<CommandEnvelope>> {
        let mut envelope = CommandEnvelope::new();
        let mut buf = BytesMut::with_capacity(READ_CHUNK_BYTES);
        let mut received = 0usize;
        let deadline = Instant::now() + self.timeouts.request;

        while is_receiving(envelope.state()) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                if received == 0 {
                    return Ok(None);
                }
                // A request that never completed is not acted on
                warn!(
                    "Client {} still sending after {:?}, rejecting request",
                    peer, self.timeouts.request
                );
                envelope.fail(Response::new(Status::BadRequest, MALFORMED_REQUEST_BODY))?;
                return Ok(Some(envelope));
            }

            buf.clear();
            match timeout(self.timeouts.read.min(remaining), stream.read_buf(&mut buf)).await {
                Ok(Ok(0)) => {
                    if received > 0 {
                        info!(
                            "Client {} closed after {} bytes, discarding request",
                            peer, received
                        );
                    } else {
                        debug!("Client {} closed without sending", peer);
                    }
                    return Ok(None);
                }
                Ok(Ok(n)) => {
                    received += n;
                    envelope.feed(&buf);
                }
                Ok(Err(e)) => {
                    return Err(e).with_context(|| format!("Read from {} failed", peer));
                }
                // Out of request budget; handled at the top of the loop
                Err(_) if Instant::now() >= deadline => {}
                Err(_) => {
                    debug!("Client {} idle after {} bytes", peer, received);
                    return finish_partial(envelope, received);
                }
            }
        }

        Ok(Some(envelope))
    }
}

/// Resolve whatever arrived before the client went quiet; an envelope that
/// still cannot resolve is answered with a 400. Nothing received means
/// nothing to answer.
fn finish_partial(mut envelope: CommandEnvelope, received: usize) -> Result<Option<CommandEnvelope>> {
    if received == 0 {
        return Ok(None);
    }

    envelope.finish();
    if is_receiving(envelope.state()) {
        envelope.fail(Response::new(Status::BadRequest, MALFORMED_REQUEST_BODY))?;
    }
    Ok(Some(envelope))
}

async fn close<S: TransportStream>(stream: &mut S, peer: &str) {
    if let Err(e) = TransportStream::shutdown(stream).await {
        debug!("Shutdown of {} failed: {}", peer, e);
    }
}

fn is_receiving(state: EnvelopeState) -> bool {
    matches!(
        state,
        EnvelopeState::Empty | EnvelopeState::ReceivingHeaders | EnvelopeState::ReceivingBody
    )
}
