// SPDX-License-Identifier: MIT

//! Agent entrypoint: parses CLI flags, loads the device keypair, claims the
//! PID file, wires the C6-C10 subsystems into a [`HandlerContext`], and runs
//! the connection supervisor until stopped or fatally rejected.

use clap::Parser;
use portacode_daemon::resolver::PctConfigMacResolver;
use portacode_daemon::{
    AgentConfig, Confirm, LiveConnection, PctExposurePropagator, PidFile, StdinConfirm, StopSignal, AUTH_REJECTED_EXIT_CODE,
    run_connection_supervisor,
};
use portacode_handlers::{HandlerContext, ProvisionerContext, RealProcess, TerminalRegistry};
use portacode_hostops::InitSystemKind;
use portacode_ingress::{CloudflaredDnsRegistrar, IngressConfig, IngressController};
use portacode_keypair::Keypair;
use portacode_tunnel::{NoTunnelEvents, TunnelSetup};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "portacode-agent", about = "Portacode device agent")]
struct Args {
    /// Gateway websocket URL; overrides `PORTACODE_GATEWAY` and the built-in default.
    #[arg(short, long)]
    gateway: Option<String>,

    /// Relaunch in the background and exit the foreground process.
    #[arg(short, long)]
    detach: bool,
}

fn init_logging(log_dir: &std::path::Path) -> tracing_appender::non_blocking::WorkerGuard {
    let _ = std::fs::create_dir_all(log_dir);
    let file_appender = tracing_appender::rolling::daily(log_dir, "portacode-agent.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(non_blocking)
        .with_ansi(false)
        .init();
    guard
}

/// Relaunches the current binary without `--detach`, redirected away from
/// the controlling terminal, then exits this (foreground) process. Mirrors
/// `cli.py`'s `connect --detach`, which hands the connection loop to a
/// `multiprocessing.Process` and returns immediately.
fn detach(args: &Args) -> ! {
    let exe = std::env::current_exe().unwrap_or_else(|_| "portacode-agent".into());
    let mut cmd = std::process::Command::new(exe);
    if let Some(gateway) = &args.gateway {
        cmd.arg("--gateway").arg(gateway);
    }
    cmd.stdin(std::process::Stdio::null());
    cmd.stdout(std::process::Stdio::null());
    cmd.stderr(std::process::Stdio::null());

    match cmd.spawn() {
        Ok(child) => {
            println!("portacode-agent detached (pid {})", child.id());
            std::process::exit(0);
        }
        Err(e) => {
            eprintln!("failed to detach: {e}");
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    if args.detach {
        detach(&args);
    }

    let config = AgentConfig::resolve(args.gateway.clone());
    let _log_guard = init_logging(&config.state_dir.join("logs"));

    info!(gateway = %config.gateway_url, "starting portacode-agent");

    let keypair = match Keypair::load_or_generate(&config.config_root) {
        Ok(k) => k,
        Err(e) => {
            error!(error = %e, "failed to load or generate device keypair");
            std::process::exit(1);
        }
    };
    let fingerprint = keypair.fingerprint_display().unwrap_or_else(|_| "unknown".to_string());
    info!(fingerprint = %fingerprint, "loaded device keypair");

    let _pidfile = match PidFile::claim(config.pid_file_path(), &StdinConfirm as &dyn Confirm) {
        Ok(guard) => guard,
        Err(e) => {
            error!(error = %e, "could not claim pid file");
            std::process::exit(1);
        }
    };

    let automation = match portacode_automation::AutomationRuntime::new(config.automation_state_path()).await {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "failed to start automation runtime");
            std::process::exit(1);
        }
    };

    let init_system = portacode_hostops::detect_init_system();
    let init_kind = init_system.as_ref().map(|i| i.kind()).unwrap_or(InitSystemKind::Systemd);
    let Some(init_system) = init_system else {
        error!("no supported init system detected (expected systemd or OpenRC)");
        std::process::exit(1);
    };

    let exposure = Arc::new(PctExposurePropagator::new(config.state_dir.join("exposure_staging"), init_kind));

    // The tunnel is set up lazily via `setup_cloudflare_tunnel`; if it has
    // already run in a prior session its identity is persisted and read
    // back here so ingress can publish DNS routes against it immediately.
    let tunnel_store = portacode_storage::AtomicJsonStore::<portacode_tunnel::TunnelState>::new(config.tunnel_state_path(), 0o600);
    let persisted_tunnel = tunnel_store.load().ok().flatten().unwrap_or_default();

    let ingress = Arc::new(IngressController::new(
        IngressConfig {
            domain: config.domain.clone(),
            tunnel_id: persisted_tunnel.tunnel_id.unwrap_or_default(),
            tunnel_name: persisted_tunnel.tunnel_name.unwrap_or_default(),
            credentials_file: persisted_tunnel.credentials_file,
            config_path: config.cloudflared_config_path(),
            rules_store_path: config.forwarding_rules_path(),
            leases_path: config.leases_path(),
            service_name: "cloudflared".to_string(),
        },
        Arc::new(PctConfigMacResolver),
        init_system,
        exposure,
        Box::new(CloudflaredDnsRegistrar),
    ));

    let tunnel = Arc::new(TunnelSetup::new(config.tunnel_state_path(), Arc::new(NoTunnelEvents)));

    let live = LiveConnection::new();

    let provisioner = ProvisionerContext {
        node: config.provisioner_node.clone(),
        node_ram_mib: config.provisioner_node_ram_mib,
        node_cpus: config.provisioner_node_cpus,
        bridge: config.provisioner_bridge.clone(),
        interfaces_path: config.config_root.join("network_interfaces"),
        credentials_path: config.infra_credentials_path(),
        containers_path: config.containers_path(),
        base_url: config.provisioner_base_url.clone(),
        default_template: config.provisioner_default_template.clone(),
        default_storage: config.provisioner_default_storage.clone(),
        storage_kind: config.provisioner_storage_kind,
        sink: live.as_provisioner_sink(),
    };

    let ctx = Arc::new(HandlerContext {
        automation,
        ingress,
        tunnel,
        provisioner,
        domain: config.domain.clone(),
        started_at: chrono::Utc::now(),
        fingerprint,
        connection: live.clone() as Arc<dyn portacode_handlers::ConnectionStatus>,
        process: Arc::new(RealProcess),
        outbound: live.clone() as Arc<dyn portacode_handlers::OutboundSink>,
        terminals: TerminalRegistry::new(live.clone() as Arc<dyn portacode_handlers::OutboundSink>),
    });

    let stop = StopSignal::new();
    spawn_signal_handlers(stop.clone());

    match run_connection_supervisor(&config.gateway_url, config.reconnect_delay, &keypair, ctx, live, stop).await {
        Ok(()) => {
            info!("portacode-agent exiting cleanly");
            std::process::exit(0);
        }
        Err(portacode_daemon::DaemonError::AuthRejected(reason)) => {
            error!(reason = %reason, "gateway rejected authentication");
            std::process::exit(AUTH_REJECTED_EXIT_CODE);
        }
        Err(e) => {
            error!(error = %e, "portacode-agent exiting after unrecoverable error");
            std::process::exit(1);
        }
    }
}

fn spawn_signal_handlers(stop: StopSignal) {
    tokio::spawn(async move {
        let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("received SIGINT, stopping"),
            _ = sigterm.recv() => info!("received SIGTERM, stopping"),
        }
        stop.raise();
    });
}
