//! Protocol engine for pushload
//!
//! This crate holds everything one virtual client does between connect and
//! close: the wire messages, the weighted behavior mix, the
//! [`ProtocolClient`] state machine, the per-connection
//! [`TimeoutWatchdog`] and the [`MetricsRecorder`] that turns timestamps into
//! a [`RunResult`]. It talks to the network only through the traits in
//! `pushload-interfaces`.

pub mod behavior;
pub mod client;
pub mod error;
pub mod fuzz;
pub mod message;
pub mod metrics;
pub mod session;
pub mod watchdog;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export commonly used types at the crate root
pub use behavior::{Behavior, BehaviorTable};
pub use client::{ClientState, Flow, ProtocolClient, VirtualClient};
pub use error::{BehaviorError, ClientError, ClientResult, ProtocolError};
pub use message::{ClientMessage, MessageType, ServerMessage, Update};
pub use metrics::{CloseReason, MetricsRecorder, RunOutcome, RunResult};
pub use session::{run_session, run_virtual_client};
pub use watchdog::{TimeoutKind, TimeoutWatchdog};
