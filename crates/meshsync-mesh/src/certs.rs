//! TLS certificate bindings for the ingress gateway.
//!
//! A binding names the hostnames a certificate serves and where the
//! gateway finds the certificate and key on disk. The PEM material itself
//! never passes through meshsync.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CertError;

/// File name of the certificate chain inside a host directory.
pub const CERT_FILE: &str = "tls.crt";
/// File name of the private key inside a host directory.
pub const KEY_FILE: &str = "tls.key";

/// One certificate binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertPair {
    /// Hostnames served; the first one names the gateway server.
    pub hosts: Vec<String>,
    pub cert_path: String,
    pub key_path: String,
}

/// Source of certificate bindings, consulted once per gateway translation.
pub trait CertLocator: Send + Sync {
    fn locate(&self) -> Result<Vec<CertPair>, CertError>;
}

/// Fixed bindings, typically from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticLocator {
    pairs: Vec<CertPair>,
}

impl StaticLocator {
    pub fn new(pairs: Vec<CertPair>) -> Self {
        Self { pairs }
    }
}

impl CertLocator for StaticLocator {
    fn locate(&self) -> Result<Vec<CertPair>, CertError> {
        Ok(self.pairs.clone())
    }
}

/// Discovers `<root>/<hostname>/tls.crt` + `tls.key` pairs.
///
/// Host directories missing either file are ignored. Results are ordered by
/// hostname.
#[derive(Debug, Clone)]
pub struct DirectoryLocator {
    root: PathBuf,
}

impl DirectoryLocator {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl CertLocator for DirectoryLocator {
    fn locate(&self) -> Result<Vec<CertPair>, CertError> {
        let entries = fs::read_dir(&self.root).map_err(|source| CertError::ReadDir {
            path: self.root.clone(),
            source,
        })?;

        let mut pairs = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| CertError::ReadDir {
                path: self.root.clone(),
                source,
            })?;
            let dir = entry.path();
            if !dir.is_dir() {
                continue;
            }
            let host = entry
                .file_name()
                .to_str()
                .map(str::to_ascii_lowercase)
                .ok_or_else(|| CertError::BadHostDir(dir.clone()))?;

            let cert = dir.join(CERT_FILE);
            let key = dir.join(KEY_FILE);
            if !cert.is_file() || !key.is_file() {
                debug!(dir = %dir.display(), "skipping incomplete certificate directory");
                continue;
            }
            pairs.push(CertPair {
                hosts: vec![host],
                cert_path: cert.to_string_lossy().into_owned(),
                key_path: key.to_string_lossy().into_owned(),
            });
        }

        pairs.sort_by(|a, b| a.hosts.cmp(&b.hosts));
        Ok(pairs)
    }
}

/// Bindings from every locator, in order. A failing locator fails the lot.
impl CertLocator for Vec<Box<dyn CertLocator>> {
    fn locate(&self) -> Result<Vec<CertPair>, CertError> {
        let mut pairs = Vec::new();
        for locator in self {
            pairs.extend(locator.locate()?);
        }
        Ok(pairs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_pair(root: &Path, host: &str) {
        let dir = root.join(host);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(CERT_FILE), "cert").unwrap();
        fs::write(dir.join(KEY_FILE), "key").unwrap();
    }

    #[test]
    fn directory_locator_finds_complete_pairs() {
        let tmp = tempfile::tempdir().unwrap();
        write_pair(tmp.path(), "b.example.com");
        write_pair(tmp.path(), "a.example.com");

        // Missing key: ignored.
        let partial = tmp.path().join("partial.example.com");
        fs::create_dir_all(&partial).unwrap();
        fs::write(partial.join(CERT_FILE), "cert").unwrap();

        // Stray file at the root: ignored.
        fs::write(tmp.path().join("README"), "hi").unwrap();

        let pairs = DirectoryLocator::new(tmp.path()).locate().unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].hosts, vec!["a.example.com"]);
        assert!(pairs[0].cert_path.ends_with("a.example.com/tls.crt"));
        assert!(pairs[0].key_path.ends_with("a.example.com/tls.key"));
        assert_eq!(pairs[1].hosts, vec!["b.example.com"]);
    }

    #[test]
    fn directory_locator_missing_root_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let locator = DirectoryLocator::new(tmp.path().join("nope"));
        assert!(matches!(locator.locate(), Err(CertError::ReadDir { .. })));
    }

    #[test]
    fn combined_locators_concatenate() {
        let tmp = tempfile::tempdir().unwrap();
        write_pair(tmp.path(), "dir.example.com");

        let locators: Vec<Box<dyn CertLocator>> = vec![
            Box::new(StaticLocator::new(vec![CertPair {
                hosts: vec!["static.example.com".into()],
                cert_path: "/etc/certs/static.crt".into(),
                key_path: "/etc/certs/static.key".into(),
            }])),
            Box::new(DirectoryLocator::new(tmp.path())),
        ];
        let pairs = locators.locate().unwrap();
        let hosts: Vec<&str> = pairs.iter().map(|p| p.hosts[0].as_str()).collect();
        assert_eq!(hosts, vec!["static.example.com", "dir.example.com"]);
    }
}
