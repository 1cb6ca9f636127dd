//! TCP transport for the command listener

use crate::transport::traits::{TransportListener, TransportStream};
use anyhow::{Context as _, Result};
use async_trait::async_trait;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::{TcpListener, TcpStream};

/// Accepted TCP client
pub struct TcpTransportStream {
    inner: TcpStream,
    peer: SocketAddr,
}

impl TcpTransportStream {
    pub fn new(inner: TcpStream, peer: SocketAddr) -> Self {
        Self { inner, peer }
    }
}

impl AsyncRead for TcpTransportStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for TcpTransportStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

#[async_trait]
impl TransportStream for TcpTransportStream {
    async fn shutdown(&mut self) -> Result<()> {
        self.inner.flush().await?;
        AsyncWriteExt::shutdown(&mut self.inner).await?;
        Ok(())
    }

    fn peer(&self) -> String {
        self.peer.to_string()
    }
}

/// Listening socket for command clients
pub struct TcpTransportListener {
    inner: TcpListener,
}

impl TcpTransportListener {
    pub async fn bind(address: SocketAddr) -> Result<Self> {
        let inner = TcpListener::bind(address)
            .await
            .with_context(|| format!("Failed to bind {}", address))?;
        Ok(Self { inner })
    }
}

#[async_trait]
impl TransportListener for TcpTransportListener {
    type Stream = TcpTransportStream;

    async fn accept(&self) -> Result<Self::Stream> {
        let (stream, peer) = self.inner.accept().await?;
        Ok(TcpTransportStream::new(stream, peer))
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.inner.local_addr()?)
    }

    fn name(&self) -> &'static str {
        "TCP"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_accept_and_shutdown() {
        let listener = TcpTransportListener::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();
        assert_eq!(listener.name(), "TCP");

        let client = tokio::spawn(async move {
            let mut client = TcpStream::connect(addr).await.unwrap();
            let mut received = Vec::new();
            client.read_to_end(&mut received).await.unwrap();
            received
        });

        let mut stream = listener.accept().await.unwrap();
        assert!(stream.peer().starts_with("127.0.0.1:"));
        stream.write_all(b"bye").await.unwrap();
        TransportStream::shutdown(&mut stream).await.unwrap();

        assert_eq!(client.await.unwrap(), b"bye");
    }
}
