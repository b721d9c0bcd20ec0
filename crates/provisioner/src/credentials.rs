// SPDX-License-Identifier: MIT

use crate::error::ProvisionerError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

fn token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<user>[^@]+)@(?P<realm>[^!]+)!(?P<tokenname>.+)$").expect("static regex is valid")
    })
}

/// A hypervisor API token identifier, `user@realm!tokenname`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenIdentifier {
    pub user: String,
    pub realm: String,
    pub token_name: String,
}

impl TokenIdentifier {
    pub fn parse(raw: &str) -> Result<Self, ProvisionerError> {
        let caps = token_re().captures(raw).ok_or_else(|| ProvisionerError::InvalidTokenIdentifier(raw.to_string()))?;
        Ok(Self {
            user: caps["user"].to_string(),
            realm: caps["realm"].to_string(),
            token_name: caps["tokenname"].to_string(),
        })
    }

    /// `PVEAPIToken=<user>@<realm>!<tokenname>=<secret>` auth header value.
    pub fn auth_header(&self, secret: &str) -> String {
        format!("PVEAPIToken={}@{}!{}={}", self.user, self.realm, self.token_name, secret)
    }
}

/// Persisted hypervisor credentials + topology (spec.md §6:
/// `proxmox_infra.json`, 0600).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InfraCredentials {
    pub identifier: TokenIdentifier,
    pub secret: String,
    pub verify_ssl: bool,
    pub base_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_token_identifier() {
        let id = TokenIdentifier::parse("root@pam!portacode").unwrap();
        assert_eq!(id, TokenIdentifier { user: "root".into(), realm: "pam".into(), token_name: "portacode".into() });
    }

    #[test]
    fn rejects_identifier_missing_bang() {
        assert!(TokenIdentifier::parse("root@pam").is_err());
    }

    #[test]
    fn rejects_identifier_missing_at() {
        assert!(TokenIdentifier::parse("rootpam!portacode").is_err());
    }

    #[test]
    fn auth_header_has_expected_shape() {
        let id = TokenIdentifier { user: "root".into(), realm: "pam".into(), token_name: "portacode".into() };
        assert_eq!(id.auth_header("s3cr3t"), "PVEAPIToken=root@pam!portacode=s3cr3t");
    }
}
