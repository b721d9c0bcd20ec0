// SPDX-License-Identifier: MIT

use crate::config::{write_config, IngressEntry};
use crate::error::IngressError;
use crate::resolve::{DeviceNetworkResolver, LeaseCache};
use crate::rule::{parse_destination, validate_hostname, Destination, ForwardingRule};
use chrono::{DateTime, Utc};
use portacode_hostops::InitSystem;
use portacode_storage::AtomicJsonStore;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::warn;

/// Injected so ingress never depends on `portacode-exposure` directly
/// (spec.md §4.4's container-expose variant propagates into §4.5).
#[async_trait::async_trait]
pub trait ExposurePropagator: Send + Sync {
    async fn propagate(&self, device_id: &str, exposed: &[(u16, String)]);
}

pub struct NoExposurePropagation;

#[async_trait::async_trait]
impl ExposurePropagator for NoExposurePropagation {
    async fn propagate(&self, _device_id: &str, _exposed: &[(u16, String)]) {}
}

/// Registers a DNS route for `hostname` against the named tunnel. Kept as a
/// trait so the publish pipeline is unit-testable without the edge CLI
/// binary present.
#[async_trait::async_trait]
pub trait DnsRegistrar: Send + Sync {
    async fn register(&self, tunnel_name: &str, hostname: &str) -> Result<(), IngressError>;
}

pub struct CloudflaredDnsRegistrar;

#[async_trait::async_trait]
impl DnsRegistrar for CloudflaredDnsRegistrar {
    async fn register(&self, tunnel_name: &str, hostname: &str) -> Result<(), IngressError> {
        portacode_hostops::run_checked(&[
            "cloudflared",
            "tunnel",
            "route",
            "dns",
            "--overwrite-dns",
            tunnel_name,
            hostname,
        ])
        .await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PersistedRules {
    #[serde(default)]
    rules: Vec<ForwardingRule>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

/// Parameters fixed for the life of the agent process (tunnel identity,
/// managed domain, filesystem layout).
pub struct IngressConfig {
    pub domain: String,
    pub tunnel_id: String,
    pub tunnel_name: String,
    pub credentials_file: Option<String>,
    pub config_path: PathBuf,
    pub rules_store_path: PathBuf,
    pub leases_path: PathBuf,
    pub service_name: String,
}

/// Ingress controller (C7): the sole writer of the edge proxy config and the
/// persisted rule list. All public mutation methods serialize on one
/// process-wide lock, matching `_FORWARDING_UPDATE_LOCK`.
pub struct IngressController {
    cfg: IngressConfig,
    lock: Mutex<()>,
    store: AtomicJsonStore<PersistedRules>,
    resolver: Arc<dyn DeviceNetworkResolver>,
    init_system: Box<dyn InitSystem>,
    exposure: Arc<dyn ExposurePropagator>,
    dns: Box<dyn DnsRegistrar>,
}

impl IngressController {
    pub fn new(
        cfg: IngressConfig,
        resolver: Arc<dyn DeviceNetworkResolver>,
        init_system: Box<dyn InitSystem>,
        exposure: Arc<dyn ExposurePropagator>,
        dns: Box<dyn DnsRegistrar>,
    ) -> Self {
        let store = AtomicJsonStore::new(cfg.rules_store_path.clone(), 0o600);
        Self { cfg, lock: Mutex::new(()), store, resolver, init_system, exposure, dns }
    }

    /// Replace the whole rule set (or, if `rules` is `None`, re-publish the
    /// currently persisted set unchanged) and run the full publish pipeline.
    pub async fn configure_forwarding(
        &self,
        rules: Option<Vec<ForwardingRule>>,
    ) -> Result<Vec<ForwardingRule>, IngressError> {
        let _guard = self.lock.lock().await;

        let current = self.store.load()?.unwrap_or_default();
        let rules = rules.unwrap_or(current.rules);

        for rule in &rules {
            validate_hostname(&self.cfg.domain, &rule.hostname)?;
        }

        let lease_cache = if rules.iter().any(|r| matches!(parse_destination(&r.destination), Ok(Destination::Device { .. }))) {
            Some(LeaseCache::load(&self.cfg.leases_path)?)
        } else {
            None
        };

        let mut entries = Vec::with_capacity(rules.len());
        for rule in &rules {
            let entry = self.build_entry(rule, lease_cache.as_ref())?;
            entries.push(entry);
        }

        write_config(&self.cfg.config_path, &self.cfg.tunnel_id, self.cfg.credentials_file.as_deref(), &entries)
            .await?;

        self.register_dns(&entries).await?;
        self.reload_service().await;

        let persisted = PersistedRules { rules: rules.clone(), updated_at: Some(Utc::now()) };
        self.store.save(&persisted)?;

        Ok(rules)
    }

    fn build_entry(
        &self,
        rule: &ForwardingRule,
        lease_cache: Option<&LeaseCache>,
    ) -> Result<IngressEntry, IngressError> {
        match parse_destination(&rule.destination)? {
            Destination::Url(url) => {
                Ok(IngressEntry { hostname: rule.hostname.clone(), service: url, path: None, no_tls_verify: false })
            }
            Destination::Device { device_id, scheme, port, path } => {
                let cache = lease_cache.expect("lease cache loaded whenever a device rule is present");
                let ip = cache.resolve(self.resolver.as_ref(), &device_id)?;
                let service = format!("{scheme}://{ip}:{port}");
                Ok(IngressEntry {
                    hostname: rule.hostname.clone(),
                    service,
                    path: if path.is_empty() { None } else { Some(path) },
                    no_tls_verify: scheme == "https",
                })
            }
        }
    }

    async fn register_dns(&self, entries: &[IngressEntry]) -> Result<(), IngressError> {
        let mut seen = HashSet::new();
        for entry in entries {
            if !seen.insert(entry.hostname.clone()) {
                continue;
            }
            if let Err(e) = self.dns.register(&self.cfg.tunnel_name, &entry.hostname).await {
                warn!(hostname = %entry.hostname, error = %e, "failed to register DNS route");
                return Err(e);
            }
        }
        Ok(())
    }

    async fn reload_service(&self) {
        if let Err(e) = self.init_system.reload(&self.cfg.service_name).await {
            warn!(service = %self.cfg.service_name, error = %e, "reload failed, falling back to restart");
            if let Err(e) = self.init_system.restart(&self.cfg.service_name).await {
                warn!(service = %self.cfg.service_name, error = %e, "restart also failed");
            }
        }
    }

    /// Container-expose variant (spec.md §4.4): compute rules for
    /// `child_device_id`'s exposed ports, preserve every other device's
    /// rules, propagate the table into the container, then publish.
    pub async fn configure_expose_ports(
        &self,
        child_device_id: &str,
        expose_ports: Vec<i64>,
    ) -> Result<Vec<ForwardingRule>, IngressError> {
        if expose_ports.len() > 3 {
            return Err(IngressError::TooManyPorts(expose_ports.len()));
        }
        let mut ports = Vec::with_capacity(expose_ports.len());
        for p in expose_ports {
            if !(1..=65535).contains(&p) {
                return Err(IngressError::PortOutOfRange(p));
            }
            ports.push(p as u16);
        }

        let current = { self.store.load()?.unwrap_or_default().rules };
        let retained: Vec<ForwardingRule> = current
            .into_iter()
            .filter(|r| match parse_destination(&r.destination) {
                Ok(Destination::Device { device_id, .. }) => device_id != child_device_id,
                _ => true,
            })
            .collect();

        let mut new_rules = Vec::with_capacity(ports.len());
        let mut exposed_table = Vec::with_capacity(ports.len());
        for (i, port) in ports.iter().enumerate() {
            let subdomain = if i == 0 { child_device_id.to_string() } else { format!("{i}_{child_device_id}") };
            let hostname = format!("{subdomain}.{}", self.cfg.domain);
            let destination = format!("http://[{child_device_id}]:{port}");
            let url = format!("https://{hostname}");
            exposed_table.push((*port, url));
            new_rules.push(ForwardingRule { hostname, destination });
        }

        self.exposure.propagate(child_device_id, &exposed_table).await;

        let mut all_rules = retained;
        all_rules.extend(new_rules.clone());
        self.configure_forwarding(Some(all_rules)).await?;

        Ok(new_rules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portacode_hostops::{InitSystemKind, ServiceSpec};

    struct FixedMac;
    impl DeviceNetworkResolver for FixedMac {
        fn mac_for_device(&self, _device_id: &str) -> Option<String> {
            Some("aa:bb:cc:dd:ee:ff".into())
        }
    }

    struct NoopInit;
    #[async_trait::async_trait]
    impl InitSystem for NoopInit {
        fn kind(&self) -> InitSystemKind {
            InitSystemKind::Systemd
        }
        async fn install(&self, _spec: &ServiceSpec) -> Result<(), portacode_hostops::HostOpsError> {
            Ok(())
        }
        async fn enable(&self, _name: &str) -> Result<(), portacode_hostops::HostOpsError> {
            Ok(())
        }
        async fn restart(&self, _name: &str) -> Result<(), portacode_hostops::HostOpsError> {
            Ok(())
        }
        async fn reload(&self, _name: &str) -> Result<(), portacode_hostops::HostOpsError> {
            Ok(())
        }
    }

    struct FakeDns;
    #[async_trait::async_trait]
    impl DnsRegistrar for FakeDns {
        async fn register(&self, _tunnel_name: &str, _hostname: &str) -> Result<(), IngressError> {
            Ok(())
        }
    }

    fn controller(dir: &std::path::Path) -> IngressController {
        let leases = dir.join("leases");
        std::fs::write(&leases, "1700000000 aa:bb:cc:dd:ee:ff 10.10.0.101 ct42 *\n").unwrap();
        let cfg = IngressConfig {
            domain: "example.com".into(),
            tunnel_id: "tun-1".into(),
            tunnel_name: "portacode-proxmox-dev1".into(),
            credentials_file: None,
            config_path: dir.join("config.yml"),
            rules_store_path: dir.join("rules.json"),
            leases_path: leases,
            service_name: "cloudflared".into(),
        };
        IngressController::new(
            cfg,
            Arc::new(FixedMac),
            Box::new(NoopInit),
            Arc::new(NoExposurePropagation),
            Box::new(FakeDns),
        )
    }

    #[test]
    fn expose_ports_over_three_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let controller = controller(dir.path());
        let result = futures_block_on(controller.configure_expose_ports("42", vec![1, 2, 3, 4]));
        assert!(matches!(result, Err(IngressError::TooManyPorts(4))));
    }

    #[test]
    fn expose_ports_out_of_range_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let controller = controller(dir.path());
        let result = futures_block_on(controller.configure_expose_ports("42", vec![70000]));
        assert!(matches!(result, Err(IngressError::PortOutOfRange(70000))));
    }

    #[test]
    fn configure_expose_ports_computes_subdomain_pattern() {
        let dir = tempfile::tempdir().unwrap();
        let controller = controller(dir.path());
        let rules = futures_block_on(controller.configure_expose_ports("42", vec![3000, 8080])).unwrap();
        assert_eq!(rules[0].hostname, "42.example.com");
        assert_eq!(rules[1].hostname, "1_42.example.com");
        assert_eq!(rules[0].destination, "http://[42]:3000");
    }

    fn futures_block_on<F: std::future::Future>(f: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
    }
}
