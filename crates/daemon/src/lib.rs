// SPDX-License-Identifier: MIT

//! Agent process: wires the keypair, connection supervisor (C4), command
//! router (C5) and the C6-C10 subsystem crates into one running daemon
//! (spec.md §4.1-§4.2).

pub mod config;
pub mod connection;
pub mod error;
pub mod exposure_bridge;
pub mod outbound;
pub mod pidfile;
pub mod resolver;
pub mod router;

pub use config::AgentConfig;
pub use connection::{run_connection_supervisor, StopSignal, AUTH_REJECTED_EXIT_CODE};
pub use error::DaemonError;
pub use exposure_bridge::PctExposurePropagator;
pub use outbound::LiveConnection;
pub use pidfile::{Confirm, PidFile, StdinConfirm};
pub use router::dispatch_frame;
