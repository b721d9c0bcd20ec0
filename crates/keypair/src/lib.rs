// SPDX-License-Identifier: MIT

//! Device identity keypair (spec.md §3, C3): generate or load an RSA
//! keypair from the config directory, and compute its display fingerprint.

use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey};
use rsa::pkcs8::{DecodePublicKey, EncodePublicKey};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use thiserror::Error;

const KEY_BITS: usize = 2048;
const PRIVATE_KEY_FILE: &str = "device_key.pem";
const PUBLIC_KEY_FILE: &str = "device_key.pub.pem";

#[derive(Debug, Error)]
pub enum KeypairError {
    #[error("IO error at {path}: {source}")]
    Io { path: PathBuf, #[source] source: std::io::Error },
    #[error("RSA key generation failed: {0}")]
    Generate(rsa::Error),
    #[error("failed to encode key material: {0}")]
    Encode(#[from] rsa::pkcs8::spki::Error),
    #[error("failed to decode persisted key material: {0}")]
    Decode(#[from] rsa::pkcs1::Error),
}

/// A loaded or freshly generated device keypair, along with its PEM forms.
#[derive(Clone)]
pub struct Keypair {
    private_key: RsaPrivateKey,
    public_key: RsaPublicKey,
    public_key_pem: String,
}

impl Keypair {
    /// Load the keypair from `dir` if present, otherwise generate a fresh
    /// one and persist it (private key mode 0600).
    pub fn load_or_generate(dir: &Path) -> Result<Self, KeypairError> {
        let private_path = dir.join(PRIVATE_KEY_FILE);
        let public_path = dir.join(PUBLIC_KEY_FILE);

        if private_path.exists() {
            return Self::load(&private_path);
        }

        let keypair = Self::generate()?;
        std::fs::create_dir_all(dir)
            .map_err(|source| KeypairError::Io { path: dir.to_path_buf(), source })?;
        keypair.persist(&private_path, &public_path)?;
        Ok(keypair)
    }

    fn generate() -> Result<Self, KeypairError> {
        let mut rng = rand::thread_rng();
        let private_key =
            RsaPrivateKey::new(&mut rng, KEY_BITS).map_err(KeypairError::Generate)?;
        Self::from_private_key(private_key)
    }

    fn load(private_path: &Path) -> Result<Self, KeypairError> {
        let pem = std::fs::read_to_string(private_path)
            .map_err(|source| KeypairError::Io { path: private_path.to_path_buf(), source })?;
        let private_key = RsaPrivateKey::from_pkcs1_pem(&pem)?;
        Self::from_private_key(private_key)
    }

    fn from_private_key(private_key: RsaPrivateKey) -> Result<Self, KeypairError> {
        let public_key = RsaPublicKey::from(&private_key);
        let public_key_pem = public_key.to_public_key_pem(Default::default())?;
        Ok(Self { private_key, public_key, public_key_pem })
    }

    fn persist(&self, private_path: &Path, public_path: &Path) -> Result<(), KeypairError> {
        let private_pem = self
            .private_key
            .to_pkcs1_pem(Default::default())
            .map_err(|e| KeypairError::Io {
                path: private_path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
            })?;
        write_private(private_path, private_pem.as_str())?;
        std::fs::write(public_path, &self.public_key_pem)
            .map_err(|source| KeypairError::Io { path: public_path.to_path_buf(), source })?;
        Ok(())
    }

    /// PEM-encoded public key, the first frame sent to the gateway after
    /// connecting (spec.md §6).
    pub fn public_key_pem(&self) -> &str {
        &self.public_key_pem
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public_key
    }

    /// SHA-256 of the DER-encoded SubjectPublicKeyInfo, lowercase hex with
    /// `:` every 2 chars.
    pub fn fingerprint(&self) -> Result<String, KeypairError> {
        let der = self.public_key.to_public_key_der()?;
        let digest = Sha256::digest(der.as_bytes());
        Ok(hex_colon(&digest))
    }

    /// Truncated form for log lines: first 8 octets followed by `…`.
    pub fn fingerprint_display(&self) -> Result<String, KeypairError> {
        let full = self.fingerprint()?;
        let short: String = full.splitn(9, ':').take(8).collect::<Vec<_>>().join(":");
        Ok(format!("{short}…"))
    }
}

fn hex_colon(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect::<Vec<_>>().join(":")
}

#[cfg(unix)]
fn write_private(path: &Path, pem: &str) -> Result<(), KeypairError> {
    use std::os::unix::fs::OpenOptionsExt;
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
        .map_err(|source| KeypairError::Io { path: path.to_path_buf(), source })?;
    use std::io::Write;
    file.write_all(pem.as_bytes())
        .map_err(|source| KeypairError::Io { path: path.to_path_buf(), source })
}

#[cfg(not(unix))]
fn write_private(path: &Path, pem: &str) -> Result<(), KeypairError> {
    std::fs::write(path, pem).map_err(|source| KeypairError::Io { path: path.to_path_buf(), source })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_then_reload_yields_same_fingerprint() {
        let dir = tempfile::tempdir().unwrap();
        let first = Keypair::load_or_generate(dir.path()).unwrap();
        let second = Keypair::load_or_generate(dir.path()).unwrap();
        assert_eq!(first.fingerprint().unwrap(), second.fingerprint().unwrap());
    }

    #[test]
    fn fingerprint_is_colon_separated_hex() {
        let dir = tempfile::tempdir().unwrap();
        let keypair = Keypair::load_or_generate(dir.path()).unwrap();
        let fp = keypair.fingerprint().unwrap();
        assert_eq!(fp.split(':').count(), 32);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit() || c == ':'));
    }

    #[test]
    fn display_fingerprint_is_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let keypair = Keypair::load_or_generate(dir.path()).unwrap();
        let short = keypair.fingerprint_display().unwrap();
        assert!(short.ends_with('…'));
        assert_eq!(short.trim_end_matches('…').split(':').count(), 8);
    }

    #[cfg(unix)]
    #[test]
    fn private_key_file_is_mode_0600() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        Keypair::load_or_generate(dir.path()).unwrap();
        let meta = std::fs::metadata(dir.path().join(PRIVATE_KEY_FILE)).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o600);
    }
}
