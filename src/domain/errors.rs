use std::fmt;
use std::io;

use super::ProtocolVersion;

/// Phase of a tunnel in which an error was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Negotiate,
    Dial,
    Relay,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Negotiate => write!(f, "negotiate"),
            Phase::Dial => write!(f, "dial"),
            Phase::Relay => write!(f, "relay"),
        }
    }
}

/// Direction of a relay loop.
///
/// `Upstream` carries the client body to the destination, `Downstream` carries
/// destination bytes back into the client response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Upstream,
    Downstream,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Upstream => write!(f, "client to destination"),
            Direction::Downstream => write!(f, "destination to client"),
        }
    }
}

#[derive(Debug)]
pub enum TunnelError {
    Capability { version: ProtocolVersion, reason: String },
    Dial { destination: String, source: io::Error },
    UpstreamWrite { source: io::Error },
    ClientWrite { source: io::Error },
    HalfClose { direction: Direction, source: io::Error },
}

impl TunnelError {
    pub fn phase(&self) -> Phase {
        match self {
            TunnelError::Capability { .. } => Phase::Negotiate,
            TunnelError::Dial { .. } => Phase::Dial,
            TunnelError::UpstreamWrite { .. }
            | TunnelError::ClientWrite { .. }
            | TunnelError::HalfClose { .. } => Phase::Relay,
        }
    }

    pub fn direction(&self) -> Option<Direction> {
        match self {
            TunnelError::UpstreamWrite { .. } => Some(Direction::Upstream),
            TunnelError::ClientWrite { .. } => Some(Direction::Downstream),
            TunnelError::HalfClose { direction, .. } => Some(*direction),
            TunnelError::Capability { .. } | TunnelError::Dial { .. } => None,
        }
    }

    /// Whether this error only says that the outbound connection was already
    /// closed by the sibling loop. Negotiation and dial errors never are.
    pub fn is_benign_shutdown(&self) -> bool {
        match self {
            TunnelError::UpstreamWrite { source }
            | TunnelError::ClientWrite { source }
            | TunnelError::HalfClose { source, .. } => is_benign_shutdown(source),
            TunnelError::Capability { .. } | TunnelError::Dial { .. } => false,
        }
    }
}

impl fmt::Display for TunnelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TunnelError::Capability { version, reason } => {
                write!(f, "cannot enable full duplex on {} stream: {}", version, reason)
            }
            TunnelError::Dial { destination, source } => write!(f, "dialing {}: {}", destination, source),
            TunnelError::UpstreamWrite { source } => {
                write!(f, "copying data to destination from client: {}", source)
            }
            TunnelError::ClientWrite { source } => {
                write!(f, "copying data to client from destination: {}", source)
            }
            TunnelError::HalfClose { direction, source } => {
                write!(f, "half-closing {} side of destination: {}", side(*direction), source)
            }
        }
    }
}

fn side(direction: Direction) -> &'static str {
    match direction {
        Direction::Upstream => "write",
        Direction::Downstream => "read",
    }
}

impl std::error::Error for TunnelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TunnelError::Capability { .. } => None,
            TunnelError::Dial { source, .. }
            | TunnelError::UpstreamWrite { source }
            | TunnelError::ClientWrite { source }
            | TunnelError::HalfClose { source, .. } => Some(source),
        }
    }
}

pub type Result<T> = std::result::Result<T, TunnelError>;

/// Marker carried by io errors raised on an outbound connection that has
/// already been force-closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionClosed;

impl fmt::Display for ConnectionClosed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "use of closed network connection")
    }
}

impl std::error::Error for ConnectionClosed {}

pub fn connection_closed() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, ConnectionClosed)
}

/// "Connection already closed" or "socket not connected".
pub fn is_benign_shutdown(err: &io::Error) -> bool {
    if err.kind() == io::ErrorKind::NotConnected {
        return true;
    }
    err.get_ref().map_or(false, |inner| inner.is::<ConnectionClosed>())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_marker_is_benign() {
        assert!(is_benign_shutdown(&connection_closed()));
        assert!(is_benign_shutdown(&io::Error::new(io::ErrorKind::NotConnected, "ENOTCONN")));
        assert!(is_benign_shutdown(&io::Error::new(io::ErrorKind::Other, ConnectionClosed)));
    }

    #[test]
    fn test_resets_are_not_benign() {
        assert!(!is_benign_shutdown(&io::Error::from(io::ErrorKind::ConnectionReset)));
        assert!(!is_benign_shutdown(&io::Error::from(io::ErrorKind::BrokenPipe)));

        let err = TunnelError::ClientWrite {
            source: io::Error::from(io::ErrorKind::ConnectionReset),
        };
        assert!(!err.is_benign_shutdown());
    }

    #[test]
    fn test_dial_errors_are_never_benign() {
        let err = TunnelError::Dial {
            destination: "127.0.0.1:1".to_string(),
            source: io::Error::new(io::ErrorKind::NotConnected, "not connected"),
        };
        assert!(!err.is_benign_shutdown());
        assert_eq!(err.phase(), Phase::Dial);
        assert_eq!(err.direction(), None);
    }

    #[test]
    fn test_relay_errors_report_direction() {
        let up = TunnelError::UpstreamWrite { source: connection_closed() };
        let down = TunnelError::HalfClose {
            direction: Direction::Downstream,
            source: io::Error::from(io::ErrorKind::Other),
        };

        assert!(up.is_benign_shutdown());
        assert_eq!(up.phase(), Phase::Relay);
        assert_eq!(up.direction(), Some(Direction::Upstream));
        assert_eq!(down.direction(), Some(Direction::Downstream));
        assert!(down.to_string().starts_with("half-closing read side"));
    }

    #[test]
    fn test_capability_error_message() {
        let err = TunnelError::Capability {
            version: ProtocolVersion::Http10,
            reason: "no upgrade support".to_string(),
        };
        assert_eq!(err.phase(), Phase::Negotiate);
        assert_eq!(
            err.to_string(),
            "cannot enable full duplex on HTTP/1.0 stream: no upgrade support"
        );
    }
}
