// SPDX-License-Identifier: MIT

//! Timestamp formatting helpers, shared so every persisted document stamps
//! `updated_at`/`created_at` the same way.

use chrono::Utc;

/// RFC 3339 timestamp for "now", used for `updated_at`-style fields on
/// persisted documents.
pub fn format_utc_now() -> String {
    Utc::now().to_rfc3339()
}
