//! Transport layer for bridgelet.
//!
//! Currently provides the HTTP listener via axum. The stdio side of the
//! bridge lives in [`crate::bridge`].

pub mod http;

pub use http::{ServerConfig, serve};
