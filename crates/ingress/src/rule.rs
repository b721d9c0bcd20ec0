// SPDX-License-Identifier: MIT

use crate::error::IngressError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// A user-declared forwarding rule, as accepted on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ForwardingRule {
    pub hostname: String,
    pub destination: String,
}

/// A destination parsed into its two possible shapes (spec.md §4.4 step 1).
#[derive(Debug, Clone, PartialEq)]
pub enum Destination {
    Url(String),
    Device { device_id: String, scheme: &'static str, port: u16, path: String },
}

fn device_dest_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<scheme>https?)://\[(?P<device_id>\d+)\](?::(?P<port>\d+))?(?P<path>/.*)?$")
            .expect("static regex is valid")
    })
}

fn literal_url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<scheme>https?)://(?P<authority>[^/\s]+)(?P<path>/.*)?$")
            .expect("static regex is valid")
    })
}

/// `hostname` must equal `domain` or be a subdomain of it.
pub fn validate_hostname(domain: &str, hostname: &str) -> Result<(), IngressError> {
    let ok = hostname == domain || hostname.ends_with(&format!(".{domain}"));
    if ok {
        Ok(())
    } else {
        Err(IngressError::InvalidHostname { hostname: hostname.to_string(), domain: domain.to_string() })
    }
}

/// Parse a destination string into a literal URL or a device-reference.
pub fn parse_destination(raw: &str) -> Result<Destination, IngressError> {
    if let Some(caps) = device_dest_re().captures(raw) {
        let scheme = if &caps["scheme"] == "https" { "https" } else { "http" };
        let device_id = caps["device_id"].to_string();
        let port: u16 = match caps.name("port") {
            Some(m) => m.as_str().parse().map_err(|_| IngressError::InvalidDestination(raw.to_string()))?,
            None => if scheme == "https" { 443 } else { 80 },
        };
        let path = caps.name("path").map(|m| m.as_str().to_string()).unwrap_or_default();
        return Ok(Destination::Device { device_id, scheme, port, path });
    }

    if let Some(caps) = literal_url_re().captures(raw) {
        if caps["authority"].is_empty() {
            return Err(IngressError::InvalidDestination(raw.to_string()));
        }
        return Ok(Destination::Url(raw.to_string()));
    }

    Err(IngressError::InvalidDestination(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hostname_equal_to_domain_is_valid() {
        assert!(validate_hostname("example.com", "example.com").is_ok());
    }

    #[test]
    fn hostname_subdomain_is_valid() {
        assert!(validate_hostname("example.com", "api.example.com").is_ok());
    }

    #[test]
    fn hostname_unrelated_domain_is_rejected() {
        assert!(validate_hostname("example.com", "evil.com").is_err());
    }

    #[test]
    fn device_destination_defaults_port_by_scheme() {
        let d = parse_destination("https://[42]/v1").unwrap();
        assert_eq!(
            d,
            Destination::Device { device_id: "42".into(), scheme: "https", port: 443, path: "/v1".into() }
        );
    }

    #[test]
    fn device_destination_parses_explicit_port_and_path() {
        let d = parse_destination("http://[42]:8080/v1").unwrap();
        assert_eq!(
            d,
            Destination::Device { device_id: "42".into(), scheme: "http", port: 8080, path: "/v1".into() }
        );
    }

    #[test]
    fn device_destination_without_path_defaults_empty() {
        let d = parse_destination("http://[42]:8080").unwrap();
        assert_eq!(
            d,
            Destination::Device { device_id: "42".into(), scheme: "http", port: 8080, path: String::new() }
        );
    }

    #[test]
    fn literal_url_is_accepted() {
        let d = parse_destination("https://backend.internal:9000/api").unwrap();
        assert_eq!(d, Destination::Url("https://backend.internal:9000/api".into()));
    }

    #[test]
    fn garbage_destination_is_rejected() {
        assert!(parse_destination("not-a-url").is_err());
    }

    use proptest::prelude::*;

    proptest::proptest! {
        #[test]
        fn subdomain_of_domain_always_validates(label in "[a-z]{1,10}") {
            let domain = "example.com";
            let hostname = format!("{label}.{domain}");
            prop_assert!(validate_hostname(domain, &hostname).is_ok());
        }

        #[test]
        fn device_ref_roundtrips_port(port in 1u16..=65535) {
            let raw = format!("http://[7]:{port}/x");
            let parsed = parse_destination(&raw).unwrap();
            prop_assert_eq!(parsed, Destination::Device { device_id: "7".into(), scheme: "http", port, path: "/x".into() });
        }
    }
}
