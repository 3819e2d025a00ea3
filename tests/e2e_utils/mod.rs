#![cfg(test)]
#![allow(dead_code)]
#![allow(unused_imports)]

pub mod destination;
pub mod tunnel_server;

pub use destination::{client_pipe, payload, spawn_destination, spawn_echo, CountingTracker, StallingDialer};
pub use tunnel_server::TestTunnelServer;
