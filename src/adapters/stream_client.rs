use std::io;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;

use crate::domain::ProtocolVersion;
use crate::ports::DuplexClient;

/// A client exchange made of any reader/writer pair: an upgraded HTTP
/// connection split in two, stdin/stdout, or in-memory pipes.
pub struct StreamClient<R, W> {
    body: R,
    response: W,
    protocol: ProtocolVersion,
    full_duplex: bool,
    cancel: CancellationToken,
}

impl<R, W> StreamClient<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    /// Defaults to HTTP/2 framing, which needs no full-duplex opt-in.
    pub fn new(body: R, response: W) -> Self {
        Self {
            body,
            response,
            protocol: ProtocolVersion::Http2,
            full_duplex: true,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_protocol(mut self, protocol: ProtocolVersion) -> Self {
        self.protocol = protocol;
        self.full_duplex = protocol.is_full_duplex();
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn is_full_duplex(&self) -> bool {
        self.full_duplex
    }
}

impl<R, W> DuplexClient for StreamClient<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    type Body = R;
    type Response = W;

    fn protocol(&self) -> ProtocolVersion {
        self.protocol
    }

    fn enable_full_duplex(&mut self) -> io::Result<()> {
        if self.protocol == ProtocolVersion::Http10 {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "HTTP/1.0 exchanges cannot stream a response while reading the body",
            ));
        }
        self.full_duplex = true;
        Ok(())
    }

    fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn streams(&mut self) -> (&mut R, &mut W) {
        (&mut self.body, &mut self.response)
    }
}
