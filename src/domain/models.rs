use std::fmt;
use tokio::time::Instant;

use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolVersion {
    Http10,
    Http11,
    Http2,
    Http3,
}

impl ProtocolVersion {
    /// HTTP/2 and later carry request and response on independent streams, so
    /// a tunnel over them is full duplex by construction.
    pub fn is_full_duplex(&self) -> bool {
        matches!(self, ProtocolVersion::Http2 | ProtocolVersion::Http3)
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolVersion::Http10 => write!(f, "HTTP/1.0"),
            ProtocolVersion::Http11 => write!(f, "HTTP/1.1"),
            ProtocolVersion::Http2 => write!(f, "HTTP/2"),
            ProtocolVersion::Http3 => write!(f, "HTTP/3"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelState {
    Idle,
    Negotiating,
    Dialing,
    Relaying,
    ClosedSuccess,
    ClosedFailure,
}

impl TunnelState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TunnelState::ClosedSuccess | TunnelState::ClosedFailure)
    }

    /// Transitions allowed by the tunnel lifecycle. Any live state may fail.
    pub fn can_advance_to(&self, next: TunnelState) -> bool {
        use TunnelState::*;
        match (self, next) {
            (Idle, Negotiating) | (Negotiating, Dialing) | (Dialing, Relaying) | (Relaying, ClosedSuccess) => true,
            (current, ClosedFailure) => !current.is_terminal(),
            _ => false,
        }
    }
}

/// Outcome of a tunnel that ended normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TunnelStats {
    pub connection_id: Uuid,
    /// Bytes copied from the client body to the destination.
    pub sent: u64,
    /// Bytes copied from the destination into the client response.
    pub received: u64,
    /// The destination's read half was closed after its end of stream.
    pub read_closed: bool,
    /// End of stream was forwarded to the destination's write half.
    pub write_closed: bool,
}

#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub id: Uuid,
    pub destination: String,
    pub opened_at: Instant,
    pub closed_at: Option<Instant>,
}

impl ConnectionInfo {
    pub fn new(destination: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            destination,
            opened_at: Instant::now(),
            closed_at: None,
        }
    }

    pub fn close(&mut self) {
        if self.closed_at.is_none() {
            self.closed_at = Some(Instant::now());
        }
    }

    pub fn is_open(&self) -> bool {
        self.closed_at.is_none()
    }
}
