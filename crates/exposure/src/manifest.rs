// SPDX-License-Identifier: MIT

use serde::Serialize;

pub const MANAGED_BY_MARKER: &str = "Managed-By: portacode";
pub const BEGIN_MARKER: &str = "# --- portacode exposed services BEGIN ---";
pub const END_MARKER: &str = "# --- portacode exposed services END ---";

/// One exposed port, as propagated into a container (spec.md §4.5).
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ExposedService {
    pub port: u16,
    pub url: String,
}

fn env_var_name(port: u16) -> String {
    format!("PORTACODE_EXPOSED_PORT_{port}")
}

/// `/etc/portacode/exposed_services.json`.
pub fn build_manifest_json(services: &[ExposedService]) -> String {
    serde_json::to_string_pretty(services).expect("ExposedService always serializes")
}

/// `/etc/portacode/exposed_services.env`: one `KEY=VALUE` per port plus a
/// `Managed-By` marker comment.
pub fn build_env_file(services: &[ExposedService]) -> String {
    let mut out = format!("# {MANAGED_BY_MARKER}\n");
    for svc in services {
        out.push_str(&format!("{}={}\n", env_var_name(svc.port), svc.url));
    }
    out
}

/// `/etc/profile.d/portacode_exposed_services.sh`: sources the env-file at
/// login if present.
pub fn build_shell_profile_snippet(env_file_path: &str) -> String {
    format!(
        "# {MANAGED_BY_MARKER}\nif [ -f \"{env_file_path}\" ]; then\n  set -a\n  . \"{env_file_path}\"\n  set +a\nfi\n"
    )
}

/// `/etc/systemd/system.conf.d/90-portacode-exposed-services.conf`.
pub fn build_systemd_dropin(services: &[ExposedService]) -> String {
    let mut out = format!("# {MANAGED_BY_MARKER}\n[Manager]\n");
    for svc in services {
        out.push_str(&format!("DefaultEnvironment=\"{}={}\"\n", env_var_name(svc.port), svc.url));
    }
    out
}

/// `/etc/conf.d/portacode_exposed_services` (OpenRC equivalent).
pub fn build_openrc_dropin(services: &[ExposedService]) -> String {
    build_env_file(services)
}

/// `/etc/default/portacode_exposed_services`.
pub fn build_default_variant(services: &[ExposedService]) -> String {
    build_env_file(services)
}

/// `/etc/environment.d/90-portacode-exposed-services.conf`.
pub fn build_environment_d_dropin(services: &[ExposedService]) -> String {
    build_env_file(services)
}

/// Merge the managed keys into `/etc/environment`'s contents: strip any
/// line previously written by us (tracked via the managed-key prefix) and
/// append the current table, so repeated runs are idempotent and don't
/// duplicate or orphan stale keys.
pub fn merge_etc_environment(existing: &str, services: &[ExposedService]) -> String {
    let prefix = "PORTACODE_EXPOSED_PORT_";
    let mut out: Vec<&str> = existing.lines().filter(|line| !line.trim_start().starts_with(prefix)).collect();
    let mut body = out.join("\n");
    if !body.is_empty() && !body.ends_with('\n') {
        body.push('\n');
    }
    out.clear();
    let mut result = body;
    for svc in services {
        result.push_str(&format!("{}={}\n", env_var_name(svc.port), svc.url));
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn services() -> Vec<ExposedService> {
        vec![
            ExposedService { port: 3000, url: "https://42.example.com".into() },
            ExposedService { port: 8080, url: "https://1_42.example.com".into() },
        ]
    }

    #[test]
    fn manifest_json_round_trips() {
        let json = build_manifest_json(&services());
        let parsed: Vec<ExposedService> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, services());
    }

    #[test]
    fn env_file_carries_managed_by_marker_and_vars() {
        let env = build_env_file(&services());
        assert!(env.starts_with("# Managed-By: portacode\n"));
        assert!(env.contains("PORTACODE_EXPOSED_PORT_3000=https://42.example.com"));
    }

    #[test]
    fn generating_twice_is_byte_identical() {
        assert_eq!(build_env_file(&services()), build_env_file(&services()));
        assert_eq!(build_manifest_json(&services()), build_manifest_json(&services()));
    }

    #[test]
    fn merge_etc_environment_strips_stale_managed_keys_before_appending() {
        let existing = "PATH=/usr/bin\nPORTACODE_EXPOSED_PORT_1111=https://stale.example.com\nLANG=C\n";
        let merged = merge_etc_environment(existing, &services());
        assert!(merged.contains("PATH=/usr/bin"));
        assert!(merged.contains("LANG=C"));
        assert!(!merged.contains("1111"));
        assert!(merged.contains("PORTACODE_EXPOSED_PORT_3000"));
    }

    #[test]
    fn merge_etc_environment_is_idempotent_across_repeated_runs() {
        let first = merge_etc_environment("PATH=/usr/bin\n", &services());
        let second = merge_etc_environment(&first, &services());
        assert_eq!(first, second);
    }
}
