mod tcp;

pub use tcp::TcpDialer;
