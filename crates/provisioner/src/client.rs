// SPDX-License-Identifier: MIT

use crate::container::ContainerSpec;
use crate::credentials::InfraCredentials;
use crate::error::ProvisionerError;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

/// Thin REST client for the hypervisor's token-authenticated API (spec.md
/// §4.6). `reqwest` + `rustls` rather than the teacher's `kube`/
/// `k8s-openapi` stack, which targets Kubernetes, not this API (noted in
/// DESIGN.md).
pub struct HypervisorClient {
    http: reqwest::Client,
    base_url: String,
    auth_header: String,
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    data: T,
}

impl HypervisorClient {
    pub fn new(creds: &InfraCredentials) -> Result<Self, ProvisionerError> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(!creds.verify_ssl)
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { http, base_url: creds.base_url.clone(), auth_header: creds.identifier.auth_header(&creds.secret) })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api2/json{path}", self.base_url.trim_end_matches('/'))
    }

    pub async fn next_vmid(&self) -> Result<u32, ProvisionerError> {
        let resp: ApiEnvelope<String> = self
            .http
            .get(self.url("/cluster/nextid"))
            .header("Authorization", &self.auth_header)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        resp.data.parse().map_err(|_| ProvisionerError::Hypervisor("non-numeric vmid".into()))
    }

    pub async fn create_container(&self, vmid: u32, spec: &ContainerSpec) -> Result<String, ProvisionerError> {
        let rootfs = crate::container::disk_expression(&spec.storage, spec.storage_kind, spec.disk_gib);
        let net0 = format!("name=eth0,bridge={},ip=dhcp", spec.bridge);

        let mut body = json!({
            "vmid": vmid,
            "ostemplate": spec.template,
            "hostname": spec.hostname,
            "memory": spec.ram_mib,
            "cores": spec.cpus,
            "rootfs": rootfs,
            "net0": net0,
            "description": crate::network::MANAGED_MARKER,
            "unprivileged": 1,
        });
        if let Some(pw) = &spec.password {
            body["password"] = json!(pw);
        }
        if let Some(key) = &spec.ssh_key {
            body["ssh-public-keys"] = json!(key);
        }

        let resp: ApiEnvelope<String> = self
            .http
            .post(self.url(&format!("/nodes/{}/lxc", spec.node)))
            .header("Authorization", &self.auth_header)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(resp.data)
    }

    pub async fn start_container(&self, node: &str, vmid: u32) -> Result<String, ProvisionerError> {
        let resp: ApiEnvelope<String> = self
            .http
            .post(self.url(&format!("/nodes/{node}/lxc/{vmid}/status/start")))
            .header("Authorization", &self.auth_header)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(resp.data)
    }

    /// Poll a hypervisor task id to completion, returning `Ok(())` on
    /// `status == "stopped"` with `exitstatus == "OK"`.
    pub async fn poll_task(&self, node: &str, upid: &str) -> Result<(), ProvisionerError> {
        #[derive(Deserialize)]
        struct TaskStatus {
            status: String,
            exitstatus: Option<String>,
        }

        loop {
            let resp: ApiEnvelope<TaskStatus> = self
                .http
                .get(self.url(&format!("/nodes/{node}/tasks/{upid}/status")))
                .header("Authorization", &self.auth_header)
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;

            if resp.data.status == "stopped" {
                return match resp.data.exitstatus.as_deref() {
                    Some("OK") => Ok(()),
                    other => Err(ProvisionerError::Hypervisor(format!("task {upid} failed: {other:?}"))),
                };
            }
            tokio::time::sleep(Duration::from_secs(2)).await;
        }
    }
}
