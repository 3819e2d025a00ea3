use std::io;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;

use crate::domain::ProtocolVersion;

/// Port for the inbound side of a tunnel: an in-flight request whose body is
/// still being read while its response is being written.
pub trait DuplexClient: Send {
    type Body: AsyncRead + Unpin + Send;
    type Response: AsyncWrite + Unpin + Send;

    /// Protocol the exchange arrived on
    fn protocol(&self) -> ProtocolVersion;

    /// Ask the transport to allow writing the response while the body is
    /// still being read. Only needed below HTTP/2.
    fn enable_full_duplex(&mut self) -> io::Result<()>;

    /// Cancelled when the client goes away
    fn cancellation(&self) -> CancellationToken;

    /// Borrow the request body and the response at the same time
    fn streams(&mut self) -> (&mut Self::Body, &mut Self::Response);
}
