//! TCP transport
//!
//! The ACM200 exposes a telnet-style ASCII console. Frames are lines
//! terminated by `\r\n` (a bare `\n` is accepted too); terminators are
//! stripped and blank lines skipped.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, trace, warn};

use acm200_core::constants::DEFAULT_CONNECT_TIMEOUT;
use acm200_core::MAX_LINE_LENGTH;

use crate::{error::*, Transport};

/// TCP transport for the ACM200 control port
pub struct TcpTransport {
    addr: String,
    port: u16,
    socket_addr: Option<SocketAddr>,
    stream: Option<TcpStream>,
    connect_timeout: Duration,
    buffer: BytesMut,
}

impl TcpTransport {
    /// Create new TCP transport
    pub fn new(addr: impl Into<String>, port: u16) -> Self {
        Self {
            addr: addr.into(),
            port,
            socket_addr: None,
            stream: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            buffer: BytesMut::with_capacity(1024),
        }
    }

    /// Set connection timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Resolve address to SocketAddr
    async fn resolve_addr(&mut self) -> Result<SocketAddr> {
        if let Some(addr) = self.socket_addr {
            return Ok(addr);
        }

        let addr_str = format!("{}:{}", self.addr, self.port);

        let addrs: Vec<SocketAddr> = tokio::net::lookup_host(&addr_str)
            .await
            .map_err(|e| Error::InvalidAddress(format!("{}: {}", addr_str, e)))?
            .collect();

        let addr = addrs
            .first()
            .ok_or_else(|| Error::InvalidAddress(format!("No addresses found for {}", addr_str)))?;

        self.socket_addr = Some(*addr);
        Ok(*addr)
    }

    /// Drop the stream after an I/O failure
    fn close_stream(&mut self) {
        if self.stream.take().is_some() {
            debug!("Connection to {} closed", self.remote_addr());
        }
        self.buffer.clear();
    }

    /// Split the next complete line off the buffer
    fn next_line(&mut self) -> Result<Option<BytesMut>> {
        loop {
            let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') else {
                if self.buffer.len() > MAX_LINE_LENGTH {
                    self.close_stream();
                    return Err(Error::FrameTooLong { max: MAX_LINE_LENGTH });
                }
                return Ok(None);
            };

            let mut line = self.buffer.split_to(pos + 1);
            line.truncate(pos);
            if line.last() == Some(&b'\r') {
                line.truncate(pos - 1);
            }

            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            if line.len() > MAX_LINE_LENGTH {
                self.close_stream();
                return Err(Error::FrameTooLong { max: MAX_LINE_LENGTH });
            }

            return Ok(Some(line));
        }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            return Err(Error::AlreadyConnected);
        }

        let addr = self.resolve_addr().await?;

        debug!("Connecting to {}...", addr);

        let stream = timeout(self.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| Error::ConnectionTimeout)?
            .map_err(Error::Io)?;

        // Disable Nagle's algorithm for low latency
        stream.set_nodelay(true)?;

        debug!("Connected to {}", addr);

        self.buffer.clear();
        self.stream = Some(stream);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            debug!("Disconnecting from {}...", self.remote_addr());

            // Graceful shutdown
            let _ = stream.shutdown().await;
        }

        self.buffer.clear();
        self.socket_addr = None;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;

        trace!("Sending {} bytes: {:?}", data.len(), String::from_utf8_lossy(data));

        let written = match stream.write_all(data).await {
            Ok(()) => stream.flush().await,
            Err(e) => Err(e),
        };

        if let Err(e) = written {
            self.close_stream();
            return Err(Error::Io(e));
        }

        Ok(())
    }

    async fn receive(&mut self, timeout: Duration) -> Result<BytesMut> {
        let deadline = Instant::now() + timeout;

        loop {
            if let Some(line) = self.next_line()? {
                trace!("Received line: {:?}", String::from_utf8_lossy(&line));
                return Ok(line);
            }

            let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;

            let read = timeout_at(deadline, stream.read_buf(&mut self.buffer)).await;

            match read {
                Err(_) => return Err(Error::ReadTimeout),
                Ok(Ok(0)) => {
                    self.close_stream();
                    return Err(Error::ConnectionClosed);
                }
                Ok(Ok(n)) => trace!("Read {} bytes", n),
                Ok(Err(e)) => {
                    self.close_stream();
                    return Err(Error::Io(e));
                }
            }
        }
    }

    fn remote_addr(&self) -> String {
        self.socket_addr
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| format!("{}:{}", self.addr, self.port))
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        if self.is_connected() {
            warn!("TCP transport dropped while still connected");
        }
    }
}
