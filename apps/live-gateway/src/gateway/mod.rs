pub mod connection;
pub mod events;
pub mod handshake;
pub mod hub;
pub mod registry;
pub mod relay;
pub mod server;
pub mod session;
