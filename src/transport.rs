use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("reading public key `{path}`: {error}")]
    ReadPublicKey { path: PathBuf, error: String },
}

/// How the instance will be reached once it is running.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Transport {
    pub name: String,
    pub ssh_key: Option<PathBuf>,
    pub ssh_public_key: Option<PathBuf>,
}

impl Default for Transport {
    fn default() -> Self {
        Self {
            name: "ssh".to_string(),
            ssh_key: None,
            ssh_public_key: None,
        }
    }
}

impl Transport {
    pub fn uses_ssh_key(&self) -> bool {
        self.ssh_key.is_some()
    }

    pub fn uses_winrm(&self) -> bool {
        self.name.eq_ignore_ascii_case("winrm")
    }

    /// Location of the public key matching `ssh_key`: `ssh_public_key` when set, else
    /// `{ssh_key}.pub`. None without a private key.
    pub fn public_key_path(&self) -> Option<PathBuf> {
        let private_key = self.ssh_key.as_ref()?;
        Some(
            self.ssh_public_key
                .clone()
                .unwrap_or_else(|| with_pub_extension(private_key)),
        )
    }

    /// Public key authorised on the instance, if the transport uses key based authentication.
    pub fn public_key(&self) -> Result<Option<String>, TransportError> {
        let Some(path) = self.public_key_path() else {
            return Ok(None);
        };
        let content = fs::read_to_string(&path).map_err(|e| TransportError::ReadPublicKey {
            path: path.clone(),
            error: e.to_string(),
        })?;
        Ok(Some(content.trim().to_string()))
    }
}

fn with_pub_extension(private_key: &Path) -> PathBuf {
    let mut path = private_key.as_os_str().to_owned();
    path.push(".pub");
    PathBuf::from(path)
}
