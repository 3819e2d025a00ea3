use async_trait::async_trait;
use std::io;
use tokio::net::TcpStream;

/// Port for establishing outbound connections
#[async_trait]
pub trait DialerPort: Send + Sync {
    /// Connect to a `host:port` destination
    ///
    /// The caller races this future against the client's cancellation and
    /// drops it when the client goes away.
    async fn dial(&self, destination: &str) -> io::Result<TcpStream>;
}
