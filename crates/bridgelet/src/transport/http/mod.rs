//! HTTP transport: listener setup and the forwarding handler.

pub mod routes;
pub mod server;

pub use server::{ServerConfig, serve};
