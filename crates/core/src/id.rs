// SPDX-License-Identifier: MIT

//! ID generation.

/// Generate a random opaque identifier (e.g. an auth token, a generated
/// task id fallback). Callers that need a caller-supplied id (automation
/// `task_id`) never call this — it's only for values the agent mints itself.
pub fn new_id() -> String {
    nanoid::nanoid!(21)
}
