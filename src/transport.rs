//! One query/response exchange with a recursive server.

use std::fmt::Display;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::timeout;

/// Reply budget for a plain UDP exchange.
const UDP_BUF_LEN: usize = 512;

#[derive(Debug)]
pub enum ExchangeError {
    /// No matching reply within the attempt budget.
    Timeout,
    Io(std::io::Error),
}

impl Display for ExchangeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout => write!(f, "no reply within the attempt budget"),
            Self::Io(err) => write!(f, "exchange failed: {err}"),
        }
    }
}

impl std::error::Error for ExchangeError {}

impl From<std::io::Error> for ExchangeError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

/// A single request/response round trip. One implementation talks to real
/// servers; tests swap in a scripted one.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn exchange(
        &self,
        server: SocketAddr,
        query: &[u8],
        wait: Duration,
    ) -> Result<Vec<u8>, ExchangeError>;
}

pub struct UdpTransport {
    force_tcp: bool,
    tcp_buf_len: usize,
}

impl UdpTransport {
    pub fn new(force_tcp: bool, tcp_buf_len: usize) -> Self {
        Self {
            force_tcp,
            tcp_buf_len,
        }
    }

    async fn exchange_tcp(
        &self,
        server: SocketAddr,
        query: &[u8],
        wait: Duration,
    ) -> Result<Vec<u8>, ExchangeError> {
        let exchange = async {
            let mut stream = TcpStream::connect(server).await?;

            stream.write_all(&(query.len() as u16).to_be_bytes()).await?;
            stream.write_all(query).await?;
            stream.flush().await?;

            let mut length_buf = [0u8; 2];
            stream.read_exact(&mut length_buf).await?;
            let length = u16::from_be_bytes(length_buf) as usize;
            if length > self.tcp_buf_len {
                return Err(ExchangeError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "tcp reply larger than the receive buffer",
                )));
            }

            let mut buffer = vec![0u8; length];
            stream.read_exact(&mut buffer).await?;
            Ok(buffer)
        };

        timeout(wait, exchange)
            .await
            .map_err(|_| ExchangeError::Timeout)?
    }
}

#[async_trait::async_trait]
impl Transport for UdpTransport {
    #[tracing::instrument(skip(self, query))]
    async fn exchange(
        &self,
        server: SocketAddr,
        query: &[u8],
        wait: Duration,
    ) -> Result<Vec<u8>, ExchangeError> {
        if self.force_tcp {
            return self.exchange_tcp(server, query, wait).await;
        }

        let exchange = async {
            let bind_addr = if server.is_ipv4() {
                SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
            } else {
                SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
            };
            let socket = UdpSocket::bind(bind_addr).await?;
            socket.connect(server).await?;
            socket.send(query).await?;

            let mut buffer = [0u8; UDP_BUF_LEN];
            loop {
                let size = socket.recv(&mut buffer).await?;
                // A reply with a foreign id is not ours; keep waiting.
                if size >= 2 && buffer[..2] == query[..2] {
                    tracing::debug!("received {size} bytes from server");
                    return Ok::<_, ExchangeError>(buffer[..size].to_vec());
                }
            }
        };

        let response = timeout(wait, exchange)
            .await
            .map_err(|_| ExchangeError::Timeout)??;

        // Truncated reply: ask again over TCP.
        if response.len() > 2 && response[2] & 0x02 != 0 {
            tracing::debug!("response truncated, retrying over tcp");
            return self.exchange_tcp(server, query, wait).await;
        }

        Ok(response)
    }
}

#[cfg(test)]
pub(crate) use mock::MockTransport;
