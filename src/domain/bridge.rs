use std::io;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::connection::{CloseHandle, OutboundConnection};
use super::errors::connection_closed;
use super::{Direction, Result, TunnelError, TunnelState, TunnelStats};
use crate::ports::{DialerPort, DuplexClient, TrackingPort};

const COPY_BUFFER_SIZE: usize = 32 * 1024;

/// Relays a duplex client exchange to a freshly dialed TCP destination.
#[derive(Clone)]
pub struct TunnelBridge {
    dialer: Arc<dyn DialerPort>,
    tracker: Arc<dyn TrackingPort>,
}

impl TunnelBridge {
    pub fn new(dialer: Arc<dyn DialerPort>, tracker: Arc<dyn TrackingPort>) -> Self {
        Self { dialer, tracker }
    }

    /// Run one tunnel to completion.
    ///
    /// Returns once both directions are finished. The outbound connection is
    /// closed on every path, including when this future is dropped.
    pub async fn bridge<C: DuplexClient>(&self, client: &mut C, destination: &str) -> Result<TunnelStats> {
        let mut lifecycle = Lifecycle::new(destination, TunnelState::Idle);
        let result = self.run(client, destination, &mut lifecycle).await;
        lifecycle.finish(&result);
        result
    }

    async fn run<C: DuplexClient>(
        &self,
        client: &mut C,
        destination: &str,
        lifecycle: &mut Lifecycle<'_>,
    ) -> Result<TunnelStats> {
        lifecycle.advance(TunnelState::Negotiating);
        negotiate(client)?;

        lifecycle.advance(TunnelState::Dialing);
        let connection = self.connect(client.cancellation(), destination).await?;

        lifecycle.advance(TunnelState::Relaying);
        relay(client, connection).await
    }

    /// Dial `destination` ahead of the client exchange, e.g. while a CONNECT
    /// request still waits for its status line. Canceling `cancel` aborts the
    /// dial with an `Interrupted` error.
    pub async fn connect(&self, cancel: CancellationToken, destination: &str) -> Result<OutboundConnection> {
        let dialed = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(io::Error::new(io::ErrorKind::Interrupted, "dial canceled by client")),
            dialed = self.dialer.dial(destination) => dialed,
        };
        let stream = dialed.map_err(|source| TunnelError::Dial {
            destination: destination.to_string(),
            source,
        })?;

        Ok(OutboundConnection::new(stream, destination, self.tracker.clone()))
    }

    /// Negotiate with `client` and relay over a connection returned by
    /// [`connect`](Self::connect). The connection is closed on every path.
    pub async fn relay<C: DuplexClient>(&self, client: &mut C, connection: OutboundConnection) -> Result<TunnelStats> {
        let destination = connection.destination().to_string();
        let mut lifecycle = Lifecycle::new(&destination, TunnelState::Dialing);

        let result = match negotiate(client) {
            Ok(()) => {
                lifecycle.advance(TunnelState::Relaying);
                relay(client, connection).await
            }
            Err(e) => Err(e),
        };
        lifecycle.finish(&result);
        result
    }
}

/// Make sure the client can stream its response while its body is still
/// being read. A no-op for protocols that are full duplex by construction.
pub fn negotiate<C: DuplexClient + ?Sized>(client: &mut C) -> Result<()> {
    let version = client.protocol();
    if version.is_full_duplex() {
        return Ok(());
    }
    client.enable_full_duplex().map_err(|e| TunnelError::Capability {
        version,
        reason: e.to_string(),
    })
}

struct Lifecycle<'a> {
    destination: &'a str,
    state: TunnelState,
}

impl<'a> Lifecycle<'a> {
    fn new(destination: &'a str, state: TunnelState) -> Self {
        Self { destination, state }
    }

    fn advance(&mut self, next: TunnelState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "invalid tunnel transition {:?} -> {:?}",
            self.state,
            next
        );
        debug!("tunnel to {}: {:?} -> {:?}", self.destination, self.state, next);
        self.state = next;
    }

    fn finish(&mut self, result: &Result<TunnelStats>) {
        match result {
            Ok(stats) => {
                self.advance(TunnelState::ClosedSuccess);
                info!(
                    "tunnel to {} closed: sent={} received={}",
                    self.destination, stats.sent, stats.received
                );
            }
            Err(e) => {
                self.advance(TunnelState::ClosedFailure);
                warn!("tunnel to {} failed during {}: {}", self.destination, e.phase(), e);
            }
        }
    }
}

/// A relay loop failure. `primary` is set on the loop that force-closed the
/// connection first.
struct Failure {
    error: TunnelError,
    primary: bool,
}

impl Failure {
    fn new(error: TunnelError, handle: &CloseHandle) -> Self {
        Self {
            primary: handle.close(),
            error,
        }
    }
}

async fn relay<C: DuplexClient>(client: &mut C, connection: OutboundConnection) -> Result<TunnelStats> {
    let connection_id = connection.id();
    let handle = connection.close_handle();
    let (mut reader, mut writer) = connection.split();
    let (body, response) = client.streams();

    let mut sent = 0u64;
    let mut received = 0u64;

    let upstream = async {
        if let Err(source) = pump(body, &mut writer, &handle, false, &mut sent).await {
            return Err(Failure::new(TunnelError::UpstreamWrite { source }, &handle));
        }
        if let Err(source) = writer.close_write().await {
            let error = TunnelError::HalfClose {
                direction: Direction::Upstream,
                source,
            };
            return Err(Failure::new(error, &handle));
        }
        Ok(())
    };

    let downstream = async {
        if let Err(source) = pump(&mut reader, response, &handle, true, &mut received).await {
            return Err(Failure::new(TunnelError::ClientWrite { source }, &handle));
        }
        if let Err(source) = response.shutdown().await {
            return Err(Failure::new(TunnelError::ClientWrite { source }, &handle));
        }
        if let Err(source) = reader.close_read() {
            let error = TunnelError::HalfClose {
                direction: Direction::Downstream,
                source,
            };
            return Err(Failure::new(error, &handle));
        }
        Ok(())
    };

    let (upstream, downstream) = tokio::join!(upstream, downstream);

    drop(reader);
    drop(writer);

    settle(upstream, downstream)?;
    Ok(TunnelStats {
        connection_id,
        sent,
        received,
        read_closed: handle.read_closed(),
        write_closed: handle.write_closed(),
    })
}

/// Copy until end of input, waking up as soon as the connection is
/// force-closed by the sibling loop.
async fn pump<R, W>(reader: &mut R, writer: &mut W, handle: &CloseHandle, flush: bool, copied: &mut u64) -> io::Result<()>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buf = vec![0u8; COPY_BUFFER_SIZE];
    loop {
        let n = tokio::select! {
            biased;
            _ = handle.closed() => return Err(connection_closed()),
            read = reader.read(&mut buf) => read?,
        };
        if n == 0 {
            return Ok(());
        }

        tokio::select! {
            biased;
            _ = handle.closed() => return Err(connection_closed()),
            written = write_chunk(writer, &buf[..n], flush) => written?,
        }
        *copied += n as u64;
    }
}

async fn write_chunk<W: AsyncWrite + Unpin + ?Sized>(writer: &mut W, chunk: &[u8], flush: bool) -> io::Result<()> {
    writer.write_all(chunk).await?;
    if flush {
        writer.flush().await?;
    }
    Ok(())
}

fn settle(
    upstream: std::result::Result<(), Failure>,
    downstream: std::result::Result<(), Failure>,
) -> Result<()> {
    let mut failures: Vec<Failure> = [upstream.err(), downstream.err()]
        .into_iter()
        .flatten()
        .filter(|failure| {
            if failure.error.is_benign_shutdown() {
                debug!("ignoring shutdown race: {}", failure.error);
                return false;
            }
            true
        })
        .collect();

    // The loop that closed the connection first holds the root cause.
    failures.sort_by_key(|failure| !failure.primary);

    let mut failures = failures.into_iter();
    match failures.next() {
        None => Ok(()),
        Some(first) => {
            for other in failures {
                debug!("suppressing secondary tunnel failure: {}", other.error);
            }
            Err(first.error)
        }
    }
}
