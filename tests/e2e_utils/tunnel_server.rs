#![cfg(test)]
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use h2nc::adapters::{serve, ConnectionTracker, HyperTunnelAdapter, TcpDialer};
use h2nc::domain::TunnelBridge;
use h2nc::ports::DialerPort;

pub struct TestTunnelServer {
    addr: SocketAddr,
    tracker: Arc<ConnectionTracker>,
    shutdown: CancellationToken,
}

impl TestTunnelServer {
    pub async fn start(destination: Option<String>) -> Result<Self, Box<dyn std::error::Error>> {
        Self::start_with_dialer(Arc::new(TcpDialer::new().with_nodelay(true)), destination).await
    }

    pub async fn start_with_dialer(
        dialer: Arc<dyn DialerPort>,
        destination: Option<String>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let tracker = Arc::new(ConnectionTracker::new());
        let bridge = Arc::new(TunnelBridge::new(dialer, tracker.clone()));

        let shutdown = CancellationToken::new();
        let adapter = Arc::new(HyperTunnelAdapter::new(bridge, shutdown.clone()).with_destination(destination));

        tokio::spawn(serve(listener, adapter, shutdown.clone()));

        Ok(Self {
            addr,
            tracker,
            shutdown,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn tracker(&self) -> &ConnectionTracker {
        &self.tracker
    }
}

impl Drop for TestTunnelServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
