//! The push socket: authentication handshake, session store, and broker
//! fan-out.

pub mod events;
pub mod fanout;
pub mod handshake;
pub mod registry;
pub mod server;
pub mod session;
pub mod tls;
