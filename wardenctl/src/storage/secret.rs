//! Workload admin secret
//!
//! The secret lives only in an owner-only env file that the compose
//! definition references through `env_file`.

use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use tracing::info;

use crate::errors::DeployError;
use crate::filesys::file::{File, MODE_SECRET};
use crate::utils::fingerprint;

/// Bytes of randomness in a generated secret
pub const SECRET_BYTES: usize = 48;

/// Variable name the workload reads the secret from
pub const SECRET_ENV_VAR: &str = "ADMIN_TOKEN";

/// Administrative credential for the deployed workload
pub struct ManagedSecret(SecretString);

impl ManagedSecret {
    /// Generate a new secret from the OS random source
    pub fn generate() -> Self {
        let mut bytes = [0u8; SECRET_BYTES];
        OsRng.fill_bytes(&mut bytes);
        ManagedSecret(SecretString::from(URL_SAFE_NO_PAD.encode(bytes)))
    }

    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    /// Short digest safe to log
    pub fn fingerprint(&self) -> String {
        fingerprint(self.expose().as_bytes())
    }

    fn to_env_file(&self) -> String {
        format!("{}={}\n", SECRET_ENV_VAR, self.expose())
    }

    fn from_env_file(contents: &str) -> Option<Self> {
        contents.lines().find_map(|line| {
            let value = line.trim().strip_prefix(SECRET_ENV_VAR)?.strip_prefix('=')?;
            if value.is_empty() {
                None
            } else {
                Some(ManagedSecret(SecretString::from(value.to_string())))
            }
        })
    }
}

impl fmt::Debug for ManagedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ManagedSecret({})", self.fingerprint())
    }
}

/// Persistence for the managed secret
#[derive(Debug, Clone)]
pub struct SecretStore {
    file: File,
}

impl SecretStore {
    pub fn new(file: File) -> Self {
        Self { file }
    }

    pub fn file(&self) -> &File {
        &self.file
    }

    /// Load a previously persisted secret
    pub async fn load(&self) -> Result<Option<ManagedSecret>, DeployError> {
        Ok(self
            .file
            .read_optional()
            .await?
            .as_deref()
            .and_then(ManagedSecret::from_env_file))
    }

    /// Persist the secret with owner-only permissions
    pub async fn save(&self, secret: &ManagedSecret) -> Result<(), DeployError> {
        self.file
            .write_atomic_with_mode(secret.to_env_file().as_bytes(), MODE_SECRET)
            .await?;
        info!(
            path = %self.file.path().display(),
            fingerprint = %secret.fingerprint(),
            "Admin secret persisted"
        );
        Ok(())
    }
}
