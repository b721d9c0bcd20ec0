// SPDX-License-Identifier: MIT

//! Adapts `portacode-exposure`'s staged-file propagation into ingress's
//! narrow [`ExposurePropagator`] seam, so the container-expose variant of
//! `configure_proxmox_container_expose_ports` actually reaches into the
//! container (spec.md §4.4's "propagates the resulting exposure table into
//! container D (§4.5)") instead of the no-op default.

use async_trait::async_trait;
use portacode_exposure::{
    best_effort_reexec, build_default_variant, build_env_file, build_environment_d_dropin, build_manifest_json,
    build_openrc_dropin, build_shell_profile_snippet, build_systemd_dropin, merge_etc_environment, propagate,
    upsert_managed_block, ContainerPuller, ContainerPusher, ExposedService, PctPuller, PctPusher, StagedFile,
};
use portacode_hostops::InitSystemKind;
use portacode_ingress::ExposurePropagator;
use std::path::PathBuf;
use tracing::warn;

/// Global shell-hook files upserted with the managed sourcing block
/// (spec.md §4.5: "Global shell hooks (`/etc/profile`, `/etc/bash.bashrc`,
/// etc.)").
const GLOBAL_SHELL_HOOKS: &[&str] = &["/etc/profile", "/etc/bash.bashrc"];

fn staged_files(services: &[ExposedService], init_kind: InitSystemKind) -> Vec<StagedFile> {
    let mut files = vec![
        StagedFile { remote_path: "/etc/portacode/exposed_services.json", mode: 0o644, contents: build_manifest_json(services) },
        StagedFile { remote_path: "/etc/portacode/exposed_services.env", mode: 0o644, contents: build_env_file(services) },
        StagedFile {
            remote_path: "/etc/profile.d/portacode_exposed_services.sh",
            mode: 0o755,
            contents: build_shell_profile_snippet("/etc/portacode/exposed_services.env"),
        },
        StagedFile {
            remote_path: "/etc/default/portacode_exposed_services",
            mode: 0o644,
            contents: build_default_variant(services),
        },
        StagedFile {
            remote_path: "/etc/environment.d/90-portacode-exposed-services.conf",
            mode: 0o644,
            contents: build_environment_d_dropin(services),
        },
    ];
    match init_kind {
        InitSystemKind::Systemd => files.push(StagedFile {
            remote_path: "/etc/systemd/system.conf.d/90-portacode-exposed-services.conf",
            mode: 0o644,
            contents: build_systemd_dropin(services),
        }),
        InitSystemKind::OpenRc => files.push(StagedFile {
            remote_path: "/etc/conf.d/portacode_exposed_services",
            mode: 0o644,
            contents: build_openrc_dropin(services),
        }),
    }
    files
}

pub struct PctExposurePropagator {
    staging_root: PathBuf,
    init_kind: InitSystemKind,
}

impl PctExposurePropagator {
    pub fn new(staging_root: PathBuf, init_kind: InitSystemKind) -> Self {
        Self { staging_root, init_kind }
    }

    async fn propagate_via(
        &self,
        pusher: &dyn ContainerPusher,
        puller: &dyn ContainerPuller,
        device_id: &str,
        exposed: &[(u16, String)],
    ) {
        let services: Vec<ExposedService> = exposed.iter().map(|(port, url)| ExposedService { port: *port, url: url.clone() }).collect();
        let mut files = staged_files(&services, self.init_kind);

        let existing_env = pull_or_empty(puller, device_id, "/etc/environment").await;
        files.push(StagedFile {
            remote_path: "/etc/environment",
            mode: 0o644,
            contents: merge_etc_environment(&existing_env, &services),
        });

        let hook_body = build_shell_profile_snippet("/etc/portacode/exposed_services.env");
        for hook_path in GLOBAL_SHELL_HOOKS {
            let existing = pull_or_empty(puller, device_id, hook_path).await;
            files.push(StagedFile { remote_path: hook_path, mode: 0o644, contents: upsert_managed_block(&existing, &hook_body) });
        }

        let staging_dir = self.staging_root.join(device_id);
        if let Err(e) = propagate(pusher, device_id, &staging_dir, &files).await {
            warn!(device_id, error = %e, "failed to propagate exposed services into container");
            return;
        }
        best_effort_reexec(device_id).await;
    }
}

async fn pull_or_empty(puller: &dyn ContainerPuller, device_id: &str, remote: &str) -> String {
    match puller.pull(device_id, remote).await {
        Ok(contents) => contents.unwrap_or_default(),
        Err(e) => {
            warn!(device_id, remote, error = %e, "failed to read back remote file, treating as empty");
            String::new()
        }
    }
}

#[async_trait]
impl ExposurePropagator for PctExposurePropagator {
    async fn propagate(&self, device_id: &str, exposed: &[(u16, String)]) {
        self.propagate_via(&PctPusher, &PctPuller, device_id, exposed).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct RecordingPusher(Arc<Mutex<Vec<String>>>);

    #[async_trait]
    impl ContainerPusher for RecordingPusher {
        async fn push(
            &self,
            _device_id: &str,
            _local: &std::path::Path,
            remote: &str,
            _mode: u32,
        ) -> Result<(), portacode_exposure::ExposureError> {
            self.0.lock().unwrap().push(remote.to_string());
            Ok(())
        }
    }

    #[test]
    fn systemd_host_gets_the_systemd_dropin_not_the_openrc_one() {
        let services = vec![ExposedService { port: 3000, url: "https://3000.example.com".into() }];
        let files = staged_files(&services, InitSystemKind::Systemd);
        let paths: Vec<&str> = files.iter().map(|f| f.remote_path).collect();
        assert!(paths.contains(&"/etc/systemd/system.conf.d/90-portacode-exposed-services.conf"));
        assert!(!paths.iter().any(|p| p.contains("conf.d/portacode_exposed_services")));
    }

    #[test]
    fn openrc_host_gets_the_openrc_dropin_not_the_systemd_one() {
        let services = vec![ExposedService { port: 8080, url: "https://8080.example.com".into() }];
        let files = staged_files(&services, InitSystemKind::OpenRc);
        let paths: Vec<&str> = files.iter().map(|f| f.remote_path).collect();
        assert!(paths.contains(&"/etc/conf.d/portacode_exposed_services"));
        assert!(!paths.iter().any(|p| p.contains("systemd")));
    }

    struct StubPuller(Option<String>);

    #[async_trait]
    impl ContainerPuller for StubPuller {
        async fn pull(&self, _device_id: &str, _remote: &str) -> Result<Option<String>, portacode_exposure::ExposureError> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn propagate_via_pushes_every_staged_file_including_merge_and_hooks() {
        let dir = tempfile::tempdir().unwrap();
        let pushed = Arc::new(Mutex::new(Vec::new()));
        let propagator = PctExposurePropagator::new(dir.path().to_path_buf(), InitSystemKind::Systemd);
        propagator
            .propagate_via(
                &RecordingPusher(Arc::clone(&pushed)),
                &StubPuller(None),
                "42",
                &[(3000, "https://3000.example.com".into())],
            )
            .await;
        let pushed = pushed.lock().unwrap();
        assert_eq!(pushed.len(), 9);
        assert!(pushed.contains(&"/etc/environment".to_string()));
        assert!(pushed.contains(&"/etc/profile".to_string()));
        assert!(pushed.contains(&"/etc/bash.bashrc".to_string()));
    }

    #[tokio::test]
    async fn propagate_via_merges_etc_environment_instead_of_overwriting() {
        let dir = tempfile::tempdir().unwrap();
        let pushed = Arc::new(Mutex::new(Vec::new()));
        let propagator = PctExposurePropagator::new(dir.path().to_path_buf(), InitSystemKind::Systemd);
        propagator
            .propagate_via(
                &RecordingPusher(Arc::clone(&pushed)),
                &StubPuller(Some("PATH=/usr/bin\n".to_string())),
                "42",
                &[(3000, "https://3000.example.com".into())],
            )
            .await;
        let staged_env_path = dir.path().join("42").join("etc_environment");
        let contents = tokio::fs::read_to_string(&staged_env_path).await.unwrap();
        assert!(contents.contains("PATH=/usr/bin"));
        assert!(contents.contains("PORTACODE_EXPOSED_PORT_3000"));
    }
}
