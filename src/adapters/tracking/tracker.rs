use crate::domain::ConnectionInfo;
use crate::ports::TrackingPort;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::time::Instant;
use tokio::time::interval;
use tracing::{debug, info};
use uuid::Uuid;

/// How long a closed connection stays listed
const CLOSED_RETENTION: Duration = Duration::from_secs(4);

/// Connection tracker implementation
pub struct ConnectionTracker {
    connections: Arc<RwLock<Vec<ConnectionInfo>>>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self {
            connections: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Start background cleanup task
    pub fn start_cleanup(&self) -> tokio::task::JoinHandle<()> {
        let connections = self.connections.clone();

        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_millis(250));

            loop {
                ticker.tick().await;
                let now = Instant::now();
                write(&connections).retain(|conn| match conn.closed_at {
                    Some(closed_at) => now.duration_since(closed_at) < CLOSED_RETENTION,
                    None => true,
                });
            }
        })
    }

    /// Every connection still listed, open or recently closed
    pub fn snapshot(&self) -> Vec<ConnectionInfo> {
        read(&self.connections).clone()
    }
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}

// Poisoning is ignored: every write leaves the list consistent.
fn read(lock: &RwLock<Vec<ConnectionInfo>>) -> RwLockReadGuard<'_, Vec<ConnectionInfo>> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write(lock: &RwLock<Vec<ConnectionInfo>>) -> RwLockWriteGuard<'_, Vec<ConnectionInfo>> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl TrackingPort for ConnectionTracker {
    fn track_connection(&self, info: ConnectionInfo) {
        info!("CONNECT {} ({})", info.destination, info.id);
        write(&self.connections).push(info);
    }

    fn close_connection(&self, id: Uuid) {
        let mut conns = write(&self.connections);

        if let Some(conn) = conns.iter_mut().find(|c| c.id == id) {
            conn.close();
            debug!(
                "closed {} ({}) after {:?}",
                conn.destination,
                id,
                conn.opened_at.elapsed()
            );
        }
    }

    fn get_active_connections(&self) -> Vec<ConnectionInfo> {
        read(&self.connections).iter().filter(|c| c.is_open()).cloned().collect()
    }
}
