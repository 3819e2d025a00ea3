use crate::domain::ConnectionInfo;
use uuid::Uuid;

/// Port for tracking outbound connections
///
/// Calls are synchronous so a connection can report its own close from `Drop`.
pub trait TrackingPort: Send + Sync {
    /// Register a new connection
    fn track_connection(&self, info: ConnectionInfo);

    /// Mark a connection as closed
    fn close_connection(&self, id: Uuid);

    /// Get all active connections
    fn get_active_connections(&self) -> Vec<ConnectionInfo>;
}
