//! Cloud credentials and the operator's key material.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::settings::GlobalSettings;

/// Cloud account credentials, loaded from a `credential.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    pub identity: String,
    pub credential: String,
    #[serde(default)]
    pub x509_certificate_path: Option<String>,
    #[serde(default)]
    pub x509_private_key_path: Option<String>,
}

impl Credentials {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = read(path)?;
        toml::from_str(&content).map_err(|source| ConfigError::Toml {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn to_toml_string(&self) -> ConfigResult<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::InvalidValue {
            key: "credentials".to_string(),
            value: e.to_string(),
        })
    }

    /// True only when both the x509 certificate and key paths are non-empty.
    pub fn has_certificates(&self) -> bool {
        let set = |p: &Option<String>| p.as_deref().is_some_and(|p| !p.trim().is_empty());
        set(&self.x509_certificate_path) && set(&self.x509_private_key_path)
    }
}

/// File contents copied onto every node.
///
/// Read once on the operator's machine so script construction stays a
/// pure function of its inputs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyMaterial {
    pub private_key: String,
    pub public_key: String,
    /// `(certificate, private key)` when x509 tooling is configured.
    pub x509: Option<(String, String)>,
}

impl KeyMaterial {
    pub fn load(settings: &GlobalSettings, credentials: &Credentials) -> ConfigResult<Self> {
        let x509 = if credentials.has_certificates() {
            match (
                &credentials.x509_certificate_path,
                &credentials.x509_private_key_path,
            ) {
                (Some(cert), Some(key)) => Some((read(Path::new(cert))?, read(Path::new(key))?)),
                _ => None,
            }
        } else {
            None
        };

        Ok(Self {
            private_key: read(&settings.private_key_path())?,
            public_key: read(&settings.public_key_path())?,
            x509,
        })
    }
}

fn read(path: &Path) -> ConfigResult<String> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declaration::parse_records;

    #[test]
    fn certificates_require_both_paths() {
        let mut creds = Credentials {
            identity: "id".into(),
            credential: "secret".into(),
            x509_certificate_path: Some("/tmp/cert.pem".into()),
            x509_private_key_path: Some("  ".into()),
        };
        assert!(!creds.has_certificates());
        creds.x509_private_key_path = Some("/tmp/pk.pem".into());
        assert!(creds.has_certificates());
        creds.x509_certificate_path = None;
        assert!(!creds.has_certificates());
    }

    #[test]
    fn parses_credential_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credential.toml");
        std::fs::write(&path, "identity = \"AKIA\"\ncredential = \"s3cr3t\"\n").unwrap();
        let creds = Credentials::from_file(&path).unwrap();
        assert_eq!(creds.identity, "AKIA");
        assert!(!creds.has_certificates());
    }

    #[test]
    fn loads_key_material_from_configured_paths() {
        let dir = tempfile::tempdir().unwrap();
        let private = dir.path().join("id");
        let public = dir.path().join("id.pub");
        std::fs::write(&private, "PRIVATE").unwrap();
        std::fs::write(&public, "PUBLIC").unwrap();

        let lines = vec![
            format!("private-key-path {}", private.display()),
            format!("public-key-path {}", public.display()),
        ];
        let settings = GlobalSettings::from_records(&parse_records(&lines).unwrap()).unwrap();
        let keys = KeyMaterial::load(&settings, &Credentials::default()).unwrap();
        assert_eq!(keys.private_key, "PRIVATE");
        assert_eq!(keys.public_key, "PUBLIC");
        assert_eq!(keys.x509, None);
    }

    #[test]
    fn missing_key_file_is_an_io_error() {
        let lines = vec!["private-key-path /nonexistent/tempest/id".to_string()];
        let settings = GlobalSettings::from_records(&parse_records(&lines).unwrap()).unwrap();
        let err = KeyMaterial::load(&settings, &Credentials::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
