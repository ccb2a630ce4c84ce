//! Streamgate - HTTP range streaming gateway
//!
//! This library crate exposes the core functionality for integration testing.

pub mod backend;
pub mod config;
pub mod server;
pub mod streaming;
