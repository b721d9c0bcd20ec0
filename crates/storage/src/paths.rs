// SPDX-License-Identifier: MIT

//! Platform-appropriate data directory resolution.
//!
//! `PORTACODE_STATE_DIR` overrides the root entirely, primarily so tests
//! don't touch a real user config directory.

use std::path::PathBuf;

/// Root config directory for all agent-owned persisted files:
/// `<cfg>/portacode/...` per spec.md §6.
pub fn config_root() -> PathBuf {
    if let Ok(dir) = std::env::var("PORTACODE_STATE_DIR") {
        return PathBuf::from(dir);
    }
    dirs::config_dir().unwrap_or_else(|| PathBuf::from(".")).join("portacode")
}

/// Directory for mutable runtime state (automation root document, PID file).
/// Distinct from `config_root` only when `PORTACODE_STATE_DIR` is unset, in
/// which case spec.md pins the automation document under `/tmp`.
pub fn state_dir() -> PathBuf {
    if std::env::var("PORTACODE_STATE_DIR").is_ok() {
        return config_root();
    }
    PathBuf::from("/tmp")
}
