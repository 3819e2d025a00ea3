use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::errors::connection_closed;
use super::ConnectionInfo;
use crate::ports::TrackingPort;

/// Shared close state of one outbound connection.
///
/// `close` may be called any number of times from either relay loop; only the
/// first call does anything.
#[derive(Clone)]
pub struct CloseHandle {
    inner: Arc<CloseState>,
}

struct CloseState {
    token: CancellationToken,
    closed: AtomicBool,
    requests: AtomicUsize,
    read_closed: AtomicBool,
    write_closed: AtomicBool,
}

impl CloseHandle {
    fn new() -> Self {
        Self {
            inner: Arc::new(CloseState {
                token: CancellationToken::new(),
                closed: AtomicBool::new(false),
                requests: AtomicUsize::new(0),
                read_closed: AtomicBool::new(false),
                write_closed: AtomicBool::new(false),
            }),
        }
    }

    /// Force-close the connection. Returns `true` for the first caller only.
    pub fn close(&self) -> bool {
        self.inner.requests.fetch_add(1, Ordering::SeqCst);
        let first = !self.inner.closed.swap(true, Ordering::SeqCst);
        self.inner.token.cancel();
        first
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Resolves once the connection has been force-closed
    pub async fn closed(&self) {
        self.inner.token.cancelled().await
    }

    pub fn close_count(&self) -> usize {
        self.inner.requests.load(Ordering::SeqCst)
    }

    pub fn read_closed(&self) -> bool {
        self.inner.read_closed.load(Ordering::SeqCst)
    }

    pub fn write_closed(&self) -> bool {
        self.inner.write_closed.load(Ordering::SeqCst)
    }
}

/// Releases the socket bookkeeping once both halves are gone.
struct Release {
    id: Uuid,
    handle: CloseHandle,
    tracker: Arc<dyn TrackingPort>,
}

impl Drop for Release {
    fn drop(&mut self) {
        self.handle.close();
        self.tracker.close_connection(self.id);
    }
}

/// An outbound TCP connection owned by exactly one tunnel.
pub struct OutboundConnection {
    stream: TcpStream,
    destination: String,
    handle: CloseHandle,
    release: Arc<Release>,
}

impl OutboundConnection {
    pub fn new(stream: TcpStream, destination: &str, tracker: Arc<dyn TrackingPort>) -> Self {
        let info = ConnectionInfo::new(destination.to_string());
        let id = info.id;
        tracker.track_connection(info);

        let handle = CloseHandle::new();
        Self {
            stream,
            destination: destination.to_string(),
            release: Arc::new(Release {
                id,
                handle: handle.clone(),
                tracker,
            }),
            handle,
        }
    }

    pub fn id(&self) -> Uuid {
        self.release.id
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn close_handle(&self) -> CloseHandle {
        self.handle.clone()
    }

    /// Split into independently closable halves. The socket is released when
    /// both halves have been dropped.
    pub fn split(self) -> (OutboundReader, OutboundWriter) {
        let (read, write) = self.stream.into_split();
        (
            OutboundReader {
                half: Some(read),
                handle: self.handle.clone(),
                _release: self.release.clone(),
            },
            OutboundWriter {
                half: write,
                handle: self.handle,
                _release: self.release,
            },
        )
    }
}

pub struct OutboundReader {
    half: Option<OwnedReadHalf>,
    handle: CloseHandle,
    _release: Arc<Release>,
}

impl OutboundReader {
    /// Stop reading from the destination: the read half is released and any
    /// later read fails as closed. No shutdown is issued on the socket itself,
    /// the write half keeps working until it is closed or dropped.
    ///
    /// Fails with a closed-connection error once the connection has been
    /// force-closed.
    pub fn close_read(&mut self) -> io::Result<()> {
        if self.handle.is_closed() {
            return Err(connection_closed());
        }
        self.half.take();
        self.handle.inner.read_closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

impl AsyncRead for OutboundReader {
    fn poll_read(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        match self.half.as_mut() {
            Some(half) => Pin::new(half).poll_read(cx, buf),
            None => Poll::Ready(Err(connection_closed())),
        }
    }
}

pub struct OutboundWriter {
    half: OwnedWriteHalf,
    handle: CloseHandle,
    _release: Arc<Release>,
}

impl OutboundWriter {
    /// Send FIN to the destination while keeping the read side open.
    pub async fn close_write(&mut self) -> io::Result<()> {
        if self.handle.is_closed() {
            return Err(connection_closed());
        }
        self.half.shutdown().await?;
        self.handle.inner.write_closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

impl AsyncWrite for OutboundWriter {
    fn poll_write(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        if self.handle.is_closed() {
            return Poll::Ready(Err(connection_closed()));
        }
        Pin::new(&mut self.half).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.half).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.half).poll_shutdown(cx)
    }
}
