// SPDX-License-Identifier: MIT

use crate::context::HandlerContext;
use crate::error::{classify, to_json};
use crate::traits::{AsyncHandler, HandlerResponse};
use async_trait::async_trait;
use portacode_core::RouterError;
use portacode_hostops::{detect_init_system, run_checked};
use portacode_provisioner::{
    check_capacity, ensure_network, run_pipeline, wait_for_keypair_stable, BootstrapStep, ContainerRecord,
    ContainerSpec, HypervisorClient, InfraCredentials, ProgressStatus, ProvisionerEventSink, StepFuture,
    TokenIdentifier,
};
use portacode_storage::AtomicJsonStore;
use portacode_wire::CommandFrame;
use rand::Rng;
use std::time::Duration;

const KEYPAIR_POLL_INTERVAL: Duration = Duration::from_secs(2);
const KEYPAIR_WAIT_TIMEOUT: Duration = Duration::from_secs(180);
const DEFAULT_RAM_MIB: u64 = 512;
const DEFAULT_CPUS: u32 = 1;
const DEFAULT_DISK_GIB: u32 = 8;
const DEFAULT_USERNAME: &str = "svcuser";

/// Substrings that mark an apt failure as transient (network/lock
/// contention) rather than a real misconfiguration (spec.md §4.6 step 5).
const APT_NETWORK_RETRY_ON: &[&str] = &["Temporary failure resolving", "Could not resolve", "Failed to fetch"];
const APT_LOCK_RETRY_ON: &[&str] = &[
    "lock-frontend",
    "Unable to acquire the dpkg frontend lock",
    "Temporary failure resolving",
    "Could not resolve",
    "Failed to fetch",
];

fn random_password() -> String {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    (0..16).map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char).collect()
}

pub struct SetupProxmoxInfraHandler;

#[async_trait]
impl AsyncHandler for SetupProxmoxInfraHandler {
    async fn handle(&self, ctx: &HandlerContext, frame: CommandFrame) -> Result<HandlerResponse, RouterError> {
        let CommandFrame::SetupProxmoxInfra(p) = frame else {
            return Err(RouterError::validation("setup_proxmox_infra handler received a different frame"));
        };
        let identifier = TokenIdentifier::parse(&p.token_identifier).map_err(classify)?;
        let creds = InfraCredentials {
            identifier,
            secret: p.token_value,
            verify_ssl: p.verify_ssl.unwrap_or(true),
            base_url: ctx.provisioner.base_url.clone(),
        };

        let init = detect_init_system()
            .ok_or_else(|| RouterError::fatal_host("no supported init system (systemd/openrc) detected on this host"))?;
        ensure_network(&ctx.provisioner.interfaces_path, &ctx.provisioner.bridge, init.as_ref()).await.map_err(classify)?;

        let client = HypervisorClient::new(&creds).map_err(classify)?;
        client.next_vmid().await.map_err(classify)?;

        let store: AtomicJsonStore<InfraCredentials> = AtomicJsonStore::new(&ctx.provisioner.credentials_path, 0o600);
        store.save(&creds).map_err(|e| RouterError::fatal_host(e.to_string()))?;

        Ok(HandlerResponse::new(
            "proxmox_infra_configured",
            to_json(&serde_json::json!({ "bridge": ctx.provisioner.bridge, "verified": true }))?,
        ))
    }
}

pub struct CreateProxmoxContainerHandler;

#[async_trait]
impl AsyncHandler for CreateProxmoxContainerHandler {
    async fn handle(&self, ctx: &HandlerContext, frame: CommandFrame) -> Result<HandlerResponse, RouterError> {
        let CommandFrame::CreateProxmoxContainer(p) = frame else {
            return Err(RouterError::validation("create_proxmox_container handler received a different frame"));
        };

        let creds_store: AtomicJsonStore<InfraCredentials> = AtomicJsonStore::new(&ctx.provisioner.credentials_path, 0o600);
        let creds = creds_store
            .load()
            .map_err(|e| RouterError::fatal_host(e.to_string()))?
            .ok_or_else(|| RouterError::conflict("proxmox infra has not been set up on this host yet"))?;
        let client = HypervisorClient::new(&creds).map_err(classify)?;

        let records_store: AtomicJsonStore<Vec<ContainerRecord>> =
            AtomicJsonStore::new(&ctx.provisioner.containers_path, 0o600);
        let mut records = records_store.load().map_err(|e| RouterError::fatal_host(e.to_string()))?.unwrap_or_default();

        let ram_mib = p.ram_mib.map(u64::from).unwrap_or(DEFAULT_RAM_MIB);
        let cpus = p.cpus.unwrap_or(DEFAULT_CPUS);
        check_capacity(&records, ram_mib, cpus, ctx.provisioner.node_ram_mib, ctx.provisioner.node_cpus).map_err(classify)?;

        let vmid = client.next_vmid().await.map_err(classify)?;
        let hostname = p.hostname.clone().unwrap_or_else(|| format!("ct-{vmid}"));
        // A bootstrap user always gets created (spec.md §4.6 step 5); only
        // the ssh key is truly optional. A missing password is generated so
        // it can still be persisted for automation re-entry.
        let username = p.username.clone().unwrap_or_else(|| DEFAULT_USERNAME.to_string());
        let password = p.password.clone().unwrap_or_else(random_password);
        let spec = ContainerSpec {
            node: ctx.provisioner.node.clone(),
            storage: p.storage.clone().unwrap_or_else(|| ctx.provisioner.default_storage.clone()),
            storage_kind: ctx.provisioner.storage_kind,
            template: p.template.clone().unwrap_or_else(|| ctx.provisioner.default_template.clone()),
            hostname: hostname.clone(),
            disk_gib: p.disk_gib.unwrap_or(DEFAULT_DISK_GIB),
            ram_mib,
            cpus,
            bridge: ctx.provisioner.bridge.clone(),
            username: Some(username),
            password: Some(password),
            ssh_key: p.ssh_key.clone(),
        };

        let sink = ctx.provisioner.sink.clone();
        sink.send(portacode_provisioner::ContainerProgress::new(
            "create",
            0,
            1,
            ProgressStatus::InProgress,
            format!("creating container {vmid}"),
        ))
        .await;

        let create_upid = client.create_container(vmid, &spec).await.map_err(classify)?;
        client.poll_task(&ctx.provisioner.node, &create_upid).await.map_err(classify)?;
        let start_upid = client.start_container(&ctx.provisioner.node, vmid).await.map_err(classify)?;
        client.poll_task(&ctx.provisioner.node, &start_upid).await.map_err(classify)?;

        records.push(ContainerRecord {
            vmid,
            node: ctx.provisioner.node.clone(),
            hostname: hostname.clone(),
            template: spec.template.clone(),
            storage: spec.storage.clone(),
            disk_gib: spec.disk_gib,
            ram_mib,
            cpus,
            username: spec.username.clone(),
            password: spec.password.clone(),
            ssh_public_key: spec.ssh_key.clone(),
            description: portacode_provisioner::MANAGED_MARKER.to_string(),
            created_at: chrono::Utc::now(),
        });
        records_store.save(&records).map_err(|e| RouterError::fatal_host(e.to_string()))?;

        run_bootstrap(vmid, &spec, ctx, &sink).await?;

        Ok(HandlerResponse::new(
            "proxmox_container_created",
            to_json(&serde_json::json!({ "vmid": vmid, "hostname": hostname }))?,
        ))
    }
}

/// Runs `pct exec <vmid> -- sh -c <cmd>` as one bootstrap step's body.
fn exec_step(vmid: u32, name: &str, cmd: String, retry_count: u32, retry_delay: Duration, retryable: &[&str]) -> BootstrapStep {
    let vmid_str = vmid.to_string();
    BootstrapStep {
        name: name.to_string(),
        retry_count,
        retry_delay,
        retryable_substrings: retryable.iter().map(|s| s.to_string()).collect(),
        run: Box::new(move || -> StepFuture {
            let vmid_str = vmid_str.clone();
            let cmd = cmd.clone();
            Box::pin(async move {
                run_checked(&["pct", "exec", &vmid_str, "--", "sh", "-c", &cmd]).await?;
                Ok(())
            })
        }),
    }
}

/// Ordered in-container bootstrap (spec.md §4.6 step 5): package install,
/// user creation, optional ssh key, agent install and spawn, then the
/// keypair-stabilization wait.
async fn run_bootstrap(
    vmid: u32,
    spec: &ContainerSpec,
    ctx: &HandlerContext,
    sink: &std::sync::Arc<dyn ProvisionerEventSink>,
) -> Result<(), RouterError> {
    let username = spec.username.clone().unwrap_or_else(|| DEFAULT_USERNAME.to_string());
    let mut steps = vec![
        exec_step(vmid, "apt_update", "apt-get update -y".to_string(), 4, Duration::from_secs(5), APT_NETWORK_RETRY_ON),
        exec_step(
            vmid,
            "install_deps",
            "apt-get install -y python3 python3-pip sudo --fix-missing".to_string(),
            5,
            Duration::from_secs(5),
            APT_LOCK_RETRY_ON,
        ),
        exec_step(
            vmid,
            "user_exists",
            format!("id -u {username} >/dev/null 2>&1 || adduser --disabled-password --gecos '' {username}"),
            0,
            Duration::from_secs(0),
            &[],
        ),
        exec_step(vmid, "add_sudo", format!("usermod -aG sudo {username}"), 0, Duration::from_secs(0), &[]),
    ];
    if let Some(password) = &spec.password {
        steps.push(exec_step(vmid, "set_password", format!("echo '{username}:{password}' | chpasswd"), 0, Duration::from_secs(0), &[]));
    }
    if let Some(ssh_key) = &spec.ssh_key {
        steps.push(exec_step(
            vmid,
            "add_ssh_key",
            format!(
                "install -d -m 700 /home/{username}/.ssh && echo '{ssh_key}' >> /home/{username}/.ssh/authorized_keys && chown -R {username}:{username} /home/{username}/.ssh"
            ),
            0,
            Duration::from_secs(0),
            &[],
        ));
    }
    steps.push(exec_step(vmid, "pip_upgrade", "python3 -m pip install --upgrade pip".to_string(), 0, Duration::from_secs(0), &[]));
    steps.push(exec_step(
        vmid,
        "install_portacode",
        "python3 -m pip install --upgrade portacode".to_string(),
        0,
        Duration::from_secs(0),
        &[],
    ));
    steps.push(exec_step(vmid, "spawn_agent", "portacode connect --detach".to_string(), 0, Duration::from_secs(0), &[]));

    let keypair_path = ctx.provisioner.keypair_wait_path(vmid);
    steps.push(BootstrapStep {
        name: "wait_for_keypair".into(),
        retry_count: 0,
        retry_delay: Duration::from_secs(0),
        retryable_substrings: Vec::new(),
        run: Box::new(move || -> StepFuture {
            let keypair_path = keypair_path.clone();
            Box::pin(async move { wait_for_keypair_stable(&keypair_path, KEYPAIR_POLL_INTERVAL, KEYPAIR_WAIT_TIMEOUT).await })
        }),
    });

    run_pipeline("bootstrap", steps, sink).await.map_err(classify)
}
