// SPDX-License-Identifier: MIT

use crate::manifest::{BEGIN_MARKER, END_MARKER};

/// Strip any existing managed block (delimited by the fixed BEGIN/END
/// markers) from a global shell hook file and append a fresh one, so
/// repeated runs against `/etc/profile`, `/etc/bash.bashrc`, etc. are
/// idempotent (spec.md §4.5).
pub fn upsert_managed_block(existing: &str, block_body: &str) -> String {
    let stripped = strip_managed_block(existing);
    let mut out = stripped.trim_end().to_string();
    if !out.is_empty() {
        out.push_str("\n\n");
    }
    out.push_str(BEGIN_MARKER);
    out.push('\n');
    out.push_str(block_body.trim_end());
    out.push('\n');
    out.push_str(END_MARKER);
    out.push('\n');
    out
}

fn strip_managed_block(existing: &str) -> String {
    let Some(begin_idx) = existing.find(BEGIN_MARKER) else { return existing.to_string() };
    let Some(end_idx) = existing[begin_idx..].find(END_MARKER).map(|i| begin_idx + i + END_MARKER.len()) else {
        return existing.to_string();
    };
    let mut out = existing[..begin_idx].to_string();
    out.push_str(existing[end_idx..].trim_start_matches('\n'));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_appends_block_when_absent() {
        let existing = "export PATH=/usr/bin\n";
        let updated = upsert_managed_block(existing, ". /etc/portacode/exposed_services.env");
        assert!(updated.starts_with("export PATH=/usr/bin"));
        assert!(updated.contains(BEGIN_MARKER));
        assert!(updated.contains(END_MARKER));
    }

    #[test]
    fn upsert_is_idempotent_across_repeated_runs() {
        let first = upsert_managed_block("export PATH=/usr/bin\n", "body");
        let second = upsert_managed_block(&first, "body");
        assert_eq!(first, second);
    }

    #[test]
    fn upsert_replaces_a_changed_block_without_duplicating() {
        let first = upsert_managed_block("", "old body");
        let second = upsert_managed_block(&first, "new body");
        assert_eq!(second.matches(BEGIN_MARKER).count(), 1);
        assert!(second.contains("new body"));
        assert!(!second.contains("old body"));
    }
}
