pub mod dialer;
pub mod hyper_server;
pub mod stream_client;
pub mod tracking;

pub use dialer::TcpDialer;
pub use hyper_server::{serve, status_for, HyperTunnelAdapter};
pub use stream_client::StreamClient;
pub use tracking::ConnectionTracker;
