// SPDX-License-Identifier: MIT

//! Privileged host operations (spec.md §4.8, C1): elevated exec, atomic
//! file writes with correct ownership, and init-system abstraction.

mod exec;
mod fsops;
mod init;

pub use exec::{have, is_root, run, run_checked, CommandOutput, HostOpsError};
pub use fsops::{copy_file, ensure_dir, write_text};
pub use init::{detect_init_system, InitSystem, InitSystemKind, OpenRc, ServiceSpec, Systemd};
