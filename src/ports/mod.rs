pub mod client;
pub mod dialer;
pub mod tracking;

pub use client::DuplexClient;
pub use dialer::DialerPort;
pub use tracking::TrackingPort;
