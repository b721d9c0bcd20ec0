// SPDX-License-Identifier: MIT

use crate::error::IngressError;
use portacode_hostops::write_text;
use std::path::Path;

/// One resolved ingress entry, matching the edge proxy's declarative config
/// shape (spec.md §4.4 step 3/4).
#[derive(Debug, Clone, PartialEq)]
pub struct IngressEntry {
    pub hostname: String,
    pub service: String,
    pub path: Option<String>,
    pub no_tls_verify: bool,
}

/// Render the ordered entry list into the edge proxy's declarative config
/// format: `tunnel:` / optional `credentials-file:` / `ingress:` list ending
/// in the `http_status:404` catch-all, matching
/// `_write_cloudflared_config` byte-for-byte in shape.
pub fn render_config(tunnel_id: &str, credentials_file: Option<&str>, entries: &[IngressEntry]) -> String {
    let mut out = String::new();
    out.push_str(&format!("tunnel: {tunnel_id}\n"));
    if let Some(path) = credentials_file {
        out.push_str(&format!("credentials-file: {path}\n"));
    }
    out.push_str("ingress:\n");
    for entry in entries {
        out.push_str(&format!("  - hostname: {}\n", entry.hostname));
        out.push_str(&format!("    service: {}\n", entry.service));
        if let Some(path) = &entry.path {
            out.push_str(&format!("    path: {path}\n"));
        }
        if entry.no_tls_verify {
            out.push_str("    originRequest:\n      noTLSVerify: true\n");
        }
    }
    out.push_str("  - service: http_status:404\n");
    out
}

pub async fn write_config(
    path: &Path,
    tunnel_id: &str,
    credentials_file: Option<&str>,
    entries: &[IngressEntry],
) -> Result<(), IngressError> {
    let body = render_config(tunnel_id, credentials_file, entries);
    write_text(path, &body, 0o600).await.map_err(IngressError::EdgeCli)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_catch_all_and_credentials_line() {
        let entries = vec![IngressEntry {
            hostname: "api.example.com".into(),
            service: "http://10.10.0.101:8080".into(),
            path: Some("/v1".into()),
            no_tls_verify: false,
        }];
        let rendered = render_config("tun-1", Some("/root/.cloudflared/tun-1.json"), &entries);
        assert!(rendered.starts_with("tunnel: tun-1\n"));
        assert!(rendered.contains("credentials-file: /root/.cloudflared/tun-1.json\n"));
        assert!(rendered.contains("hostname: api.example.com\n"));
        assert!(rendered.contains("path: /v1\n"));
        assert!(rendered.trim_end().ends_with("- service: http_status:404"));
    }

    #[test]
    fn omits_credentials_line_when_absent() {
        let rendered = render_config("tun-1", None, &[]);
        assert!(!rendered.contains("credentials-file"));
    }

    #[test]
    fn https_against_raw_ip_sets_no_tls_verify() {
        let entries = vec![IngressEntry {
            hostname: "x.example.com".into(),
            service: "https://10.10.0.5:443".into(),
            path: None,
            no_tls_verify: true,
        }];
        let rendered = render_config("tun-1", None, &entries);
        assert!(rendered.contains("noTLSVerify: true"));
    }
}
