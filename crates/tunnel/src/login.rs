// SPDX-License-Identifier: MIT

use crate::error::TunnelError;
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::time::Instant;

fn url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"https?://\S+").expect("static regex is valid"))
}

/// Scrape the first `https?://` substring out of merged stdout+stderr
/// (spec.md §9: "not strictly a PTY requirement... stdout and stderr are
/// merged and scanned for the first https?:// substring").
pub fn scrape_login_url(merged_output: &str) -> Option<String> {
    url_re().find(merged_output).map(|m| m.as_str().trim_end_matches(['.', ')', ']']).to_string())
}

/// Poll `cert_path` until it exists with nonzero size, or `timeout` elapses.
pub async fn poll_cert_file(cert_path: &Path, timeout: Duration) -> Result<(), TunnelError> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Ok(meta) = tokio::fs::metadata(cert_path).await {
            if meta.len() > 0 {
                return Ok(());
            }
        }
        if Instant::now() >= deadline {
            return Err(TunnelError::LoginTimedOut);
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scrapes_first_url_from_merged_output() {
        let out = "Please open the following URL:\nhttps://dash.cloudflare.com/argotunnel?x=1\nwaiting...";
        assert_eq!(scrape_login_url(out).as_deref(), Some("https://dash.cloudflare.com/argotunnel?x=1"));
    }

    #[test]
    fn returns_none_when_no_url_present() {
        assert_eq!(scrape_login_url("no links here"), None);
    }

    #[tokio::test]
    async fn poll_cert_file_succeeds_once_nonzero_size() {
        let dir = tempfile::tempdir().unwrap();
        let cert = dir.path().join("cert.pem");
        std::fs::write(&cert, "cert-bytes").unwrap();
        poll_cert_file(&cert, Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn poll_cert_file_times_out_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        let cert = dir.path().join("cert.pem");
        let err = poll_cert_file(&cert, Duration::from_millis(200)).await.unwrap_err();
        assert!(matches!(err, TunnelError::LoginTimedOut));
    }
}
