// SPDX-License-Identifier: MIT

//! Shared test fakes for handler unit tests, reused across modules so each
//! doesn't reinvent the same trait stand-ins.

#![cfg(test)]

pub struct FixedMac;

impl portacode_ingress::DeviceNetworkResolver for FixedMac {
    fn mac_for_device(&self, _device_id: &str) -> Option<String> {
        Some("aa:bb:cc:dd:ee:ff".into())
    }
}

pub struct NoopInit;

#[async_trait::async_trait]
impl portacode_hostops::InitSystem for NoopInit {
    fn kind(&self) -> portacode_hostops::InitSystemKind {
        portacode_hostops::InitSystemKind::Systemd
    }
    async fn install(&self, _spec: &portacode_hostops::ServiceSpec) -> Result<(), portacode_hostops::HostOpsError> {
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

pub struct NoopDns;

#[async_trait::async_trait]
impl portacode_ingress::DnsRegistrar for NoopDns {
    async fn register(&self, _tunnel_name: &str, _hostname: &str) -> Result<(), portacode_ingress::IngressError> {
        Ok(())
    }
}
