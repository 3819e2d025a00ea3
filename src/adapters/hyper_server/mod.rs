mod adapter;
mod server;

pub use adapter::{status_for, HyperTunnelAdapter};
pub use server::serve;
