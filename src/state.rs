//! Instance state persisted by the caller between `create` and `destroy`.
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::driver::config::DriverConfig;
use crate::environment::CloudEnvironment;

/// Version written by this driver. Records without a version predate it; all their fields are
/// optional so they load unchanged.
pub const STATE_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum StateError {
    #[error("reading state file: `{0}`")]
    Read(String),
    #[error("writing state file: `{0}`")]
    Write(String),
    #[error("invalid state file: `{0}`")]
    Format(String),
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct InstanceState {
    pub version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vm_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub azure_resource_group_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub azure_environment: Option<CloudEnvironment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_managed_disks: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
}

impl InstanceState {
    /// Loads the state file, a missing file being an empty state.
    pub fn load(path: &Path) -> Result<Self, StateError> {
        match fs::read_to_string(path) {
            Ok(content) if content.trim().is_empty() => Ok(Self::default()),
            Ok(content) => {
                serde_json::from_str(&content).map_err(|e| StateError::Format(e.to_string()))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(StateError::Read(e.to_string())),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), StateError> {
        let content =
            serde_json::to_string_pretty(self).map_err(|e| StateError::Format(e.to_string()))?;
        fs::write(path, content).map_err(|e| StateError::Write(e.to_string()))
    }

    /// Fills every missing field from the configuration. Values already present are kept.
    ///
    /// This is the only place where state defaults are decided.
    pub fn validate_state(
        mut self,
        config: &DriverConfig,
        uses_ssh_key: bool,
        now: DateTime<Utc>,
    ) -> Self {
        self.version = STATE_VERSION;
        let uuid = self
            .uuid
            .get_or_insert_with(|| Uuid::new_v4().simple().to_string()[..16].to_string())
            .clone();

        self.vm_name.get_or_insert_with(|| {
            config
                .vm_name
                .clone()
                .unwrap_or_else(|| format!("tk-{}", uuid.chars().take(12).collect::<String>()))
        });
        self.server_id.get_or_insert_with(|| format!("vm{uuid}"));
        self.azure_resource_group_name
            .get_or_insert_with(|| config.resource_group_name(now));
        if self.subscription_id.is_none() {
            self.subscription_id = config.subscription_id.clone();
        }
        self.azure_environment.get_or_insert(config.azure_environment);
        self.use_managed_disks.get_or_insert(config.use_managed_disks);

        if uses_ssh_key {
            self.password = None;
        }
        self
    }

    /// Keeps the admin credentials of the deployment. With key based authentication no
    /// password is kept.
    pub fn store_credentials(&mut self, username: &str, password: Option<&str>, uses_ssh_key: bool) {
        if self.username.is_none() {
            self.username = Some(username.to_string());
        }
        if uses_ssh_key || self.password.is_none() {
            self.password = password.map(str::to_string);
        }
    }

    /// Forgets everything that belonged to the destroyed server.
    pub fn clear_server(&mut self) {
        self.server_id = None;
        self.hostname = None;
        self.username = None;
        self.password = None;
    }
}
