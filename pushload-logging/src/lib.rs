//! Logging initialisation for pushload
//!
//! Every pushload crate logs through the `tracing` macros. This crate installs
//! the global `tracing-subscriber` exactly once per process, driven by the
//! `logging` domain of the configuration.

pub mod init;

pub use init::{init_logging, init_simple_tracing, is_initialized};
