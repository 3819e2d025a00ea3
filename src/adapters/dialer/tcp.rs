use async_trait::async_trait;
use std::io;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::ports::DialerPort;

/// Dials destinations directly over TCP.
#[derive(Debug, Clone, Default)]
pub struct TcpDialer {
    nodelay: bool,
    connect_timeout: Option<Duration>,
}

impl TcpDialer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Disable Nagle on dialed sockets. Interactive tunnels want this.
    pub fn with_nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Option<Duration>) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }
}

#[async_trait]
impl DialerPort for TcpDialer {
    async fn dial(&self, destination: &str) -> io::Result<TcpStream> {
        let stream = match self.connect_timeout {
            Some(limit) => match timeout(limit, TcpStream::connect(destination)).await {
                Ok(result) => result,
                Err(_) => {
                    log::debug!("Timeout connecting to {}", destination);
                    return Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("connecting to {} took longer than {:?}", destination, limit),
                    ));
                }
            },
            None => TcpStream::connect(destination).await,
        }
        .map_err(|e| {
            log::debug!("Failed to connect to {}: {}", destination, e);
            e
        })?;

        if self.nodelay {
            stream.set_nodelay(true)?;
        }
        log::debug!("connected to {} via {}", destination, stream.local_addr()?);
        Ok(stream)
    }
}
