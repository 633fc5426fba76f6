pub mod backends;
pub mod config_loader;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod service;
pub mod transport;
