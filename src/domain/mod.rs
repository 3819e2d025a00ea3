pub mod bridge;
pub mod connection;
pub mod errors;
pub mod models;

pub use bridge::{negotiate, TunnelBridge};
pub use connection::{CloseHandle, OutboundConnection, OutboundReader, OutboundWriter};
pub use errors::*;
pub use models::*;
