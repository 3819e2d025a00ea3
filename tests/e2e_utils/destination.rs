#![cfg(test)]
#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::{duplex, AsyncWriteExt, DuplexStream};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use uuid::Uuid;

use h2nc::adapters::{ConnectionTracker, StreamClient};
use h2nc::domain::{ConnectionInfo, ProtocolVersion};
use h2nc::ports::{DialerPort, TrackingPort};

const PIPE_CAPACITY: usize = 16 * 1024;

/// Accept connections forever, handing each one to `handler`.
pub async fn spawn_destination<F, Fut>(handler: F) -> SocketAddr
where
    F: Fn(TcpStream) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind destination");
    let addr = listener.local_addr().expect("destination address");

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(handler(stream));
        }
    });

    addr
}

/// Echo every byte back, then half-close once the peer has.
pub async fn spawn_echo() -> SocketAddr {
    spawn_destination(|stream| async move {
        let (mut reader, mut writer) = stream.into_split();
        let _ = tokio::io::copy(&mut reader, &mut writer).await;
        let _ = writer.shutdown().await;
    })
    .await
}

/// A client exchange over in-memory pipes, plus the test's ends of them:
/// write the request body into the first, read the response from the second.
pub fn client_pipe(
    protocol: ProtocolVersion,
) -> (StreamClient<DuplexStream, DuplexStream>, DuplexStream, DuplexStream) {
    let (body, body_tx) = duplex(PIPE_CAPACITY);
    let (response_rx, response) = duplex(PIPE_CAPACITY);
    let client = StreamClient::new(body, response).with_protocol(protocol);
    (client, body_tx, response_rx)
}

pub fn payload(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| ((i * 31 + seed as usize) % 251) as u8).collect()
}

/// Tracker that also counts how often each connection was reported closed.
#[derive(Default)]
pub struct CountingTracker {
    inner: ConnectionTracker,
    closes: Mutex<HashMap<Uuid, usize>>,
}

impl CountingTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn closes(&self) -> HashMap<Uuid, usize> {
        self.closes.lock().unwrap().clone()
    }
}

impl TrackingPort for CountingTracker {
    fn track_connection(&self, info: ConnectionInfo) {
        self.inner.track_connection(info);
    }

    fn close_connection(&self, id: Uuid) {
        *self.closes.lock().unwrap().entry(id).or_insert(0) += 1;
        self.inner.close_connection(id);
    }

    fn get_active_connections(&self) -> Vec<ConnectionInfo> {
        self.inner.get_active_connections()
    }
}

/// Dialer whose connects never complete, like a blackholed destination.
#[derive(Default)]
pub struct StallingDialer {
    started: Notify,
    abandoned: Notify,
}

impl StallingDialer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Resolves once a dial is in progress.
    pub async fn started(&self) {
        self.started.notified().await
    }

    /// Resolves once a pending dial has been dropped.
    pub async fn abandoned(&self) {
        self.abandoned.notified().await
    }
}

struct Abandon<'a>(&'a Notify);

impl Drop for Abandon<'_> {
    fn drop(&mut self) {
        self.0.notify_one();
    }
}

#[async_trait]
impl DialerPort for StallingDialer {
    async fn dial(&self, _: &str) -> std::io::Result<TcpStream> {
        let _abandon = Abandon(&self.abandoned);
        self.started.notify_one();
        std::future::pending().await
    }
}
