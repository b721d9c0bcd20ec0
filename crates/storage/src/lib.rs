// SPDX-License-Identifier: MIT

//! Atomic JSON document persistence shared by every agent-owned state
//! store (spec.md §3, "all persisted files are created in a user- or
//! system-config directory under the agent's sole ownership; every write
//! is write(tmp) -> fsync -> rename(tmp, final) -> chmod").

mod atomic;
mod paths;

pub use atomic::{AtomicJsonStore, StorageError, Versioned};
pub use paths::{config_root, state_dir};
