//! onesync Core - Data model, ports and configuration
//!
//! This crate holds everything the Graph data-plane shares with its callers:
//! - **Domain types** - `Item`, `DeltaPage`, `UploadSession`, `UploadSessionStatus`
//! - **Ports** - `TokenSupplier`, the only way the data-plane obtains credentials
//! - **Configuration** - YAML-backed `Config` with validation
//! - **Logging** - `tracing` subscriber setup

pub mod config;
pub mod domain;
pub mod logging;
pub mod ports;
