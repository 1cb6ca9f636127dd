//! Transport abstraction for the inbound command channel

use anyhow::Result;
use async_trait::async_trait;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncWrite};

/// One accepted client connection
#[async_trait]
pub trait TransportStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {
    /// Flush and close the write half
    async fn shutdown(&mut self) -> Result<()>;

    /// Remote address, for logging
    fn peer(&self) -> String;
}

/// Source of inbound connections
#[async_trait]
pub trait TransportListener: Send + Sync {
    /// The stream type this listener produces
    type Stream: TransportStream;

    /// Wait for the next client
    async fn accept(&self) -> Result<Self::Stream>;

    /// Address the listener is bound to
    fn local_addr(&self) -> Result<SocketAddr>;

    /// Human-readable name for this transport
    fn name(&self) -> &'static str;
}
