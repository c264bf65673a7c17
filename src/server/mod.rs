//! HTTP side of the relay

pub mod config;
pub mod config_store;
pub mod listener;
pub mod routes;

pub use config::RelayConfig;
pub use config_store::ConfigStore;
pub use listener::RelayServer;
