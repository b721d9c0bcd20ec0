// SPDX-License-Identifier: MIT

//! Exposure propagation (spec.md §4.5, C10): generate exposed-service
//! metadata in every form a container's shells/services/processes might
//! read it from, push it in, and idempotently upsert global shell hooks.

mod error;
mod hooks;
mod manifest;
mod propagate;

pub use error::ExposureError;
pub use hooks::upsert_managed_block;
pub use manifest::{
    build_default_variant, build_env_file, build_environment_d_dropin, build_manifest_json,
    build_openrc_dropin, build_shell_profile_snippet, build_systemd_dropin, merge_etc_environment,
    ExposedService, BEGIN_MARKER, END_MARKER, MANAGED_BY_MARKER,
};
pub use propagate::{best_effort_reexec, propagate, ContainerPuller, ContainerPusher, PctPuller, PctPusher, StagedFile};
