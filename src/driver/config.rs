use std::env::VarError;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::info;

use crate::credentials::AZURE_SUBSCRIPTION_ID_ENV;
use crate::deployment::poller::DEFAULT_DEPLOYMENT_SLEEP;
use crate::environment::CloudEnvironment;
use crate::retry::DEFAULT_API_RETRIES;

const ENABLE_WINRM_SCRIPT: &str = r#"$cert = New-SelfSignedCertificate -DnsName $env:COMPUTERNAME -CertStoreLocation Cert:\LocalMachine\My
$config = '@{CertificateThumbprint="' + $cert.Thumbprint + '"}'
winrm create winrm/config/listener?Address=*+Transport=HTTPS $config
winrm create winrm/config/Listener?Address=*+Transport=HTTP
winrm set winrm/config/service/auth '@{Basic="true";Kerberos="false";Negotiate="true";Certificate="false";CredSSP="true"}'
New-NetFirewallRule -DisplayName "Windows Remote Management (HTTPS-In)" -Name "Windows Remote Management (HTTPS-In)" -Profile Any -LocalPort 5986 -Protocol TCP
winrm set winrm/config/service '@{AllowUnencrypted="true"}'
New-NetFirewallRule -DisplayName "Windows Remote Management (HTTP-In)" -Name "Windows Remote Management (HTTP-In)" -Profile Any -LocalPort 5985 -Protocol TCP"#;

const FORMAT_DATA_DISKS_SCRIPT: &str = r#"Write-Host "Initializing and formatting raw disks"
$disks = Get-Disk | where partitionstyle -eq 'raw'
$letters = New-Object System.Collections.ArrayList
$letters.AddRange( ('F','G','H','I','J','K','L','M','N','O','P','Q','R','S','T','U','V','W','X','Y','Z') )
Function AvailableVolumes() {
$currentDrives = get-volume
ForEach ($v in $currentDrives) {
  if ($letters -contains $v.DriveLetter.ToString()) {
      Write-Host "Drive letter $($v.DriveLetter) is taken, moving to next letter"
      $letters.Remove($v.DriveLetter.ToString())
    }
  }
}
ForEach ($d in $disks) {
  AvailableVolumes
  $driveLetter = $letters[0]
  Write-Host "Creating volume $($driveLetter)"
  $d | Initialize-Disk -PartitionStyle GPT -PassThru | New-Partition -DriveLetter $driveLetter  -UseMaximumSize
  Start-Sleep 1
  Format-Volume -FileSystem NTFS -NewFileSystemLabel "datadisk" -DriveLetter $driveLetter -Confirm:$false
}"#;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("reading config file `{path}`: {error}")]
    Read { path: PathBuf, error: String },
    #[error("parsing config file `{path}`: {error}")]
    Parse { path: PathBuf, error: String },
    #[error("missing required setting `{0}`")]
    Missing(&'static str),
}

/// Marketplace plan of the image.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Plan {
    pub name: Option<String>,
    pub product: Option<String>,
    pub promotion_code: Option<String>,
    pub publisher: Option<String>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.product.is_none()
            && self.promotion_code.is_none()
            && self.publisher.is_none()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DataDisk {
    pub lun: u32,
    pub disk_size_gb: u32,
}

/// Settings of the driver, read from the suite configuration.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct DriverConfig {
    pub location: String,
    pub machine_size: String,
    pub subscription_id: Option<String>,
    pub azure_environment: CloudEnvironment,

    pub azure_resource_group_prefix: String,
    pub azure_resource_group_suffix: String,
    /// Base of the generated resource group name. Defaults to the instance name.
    pub azure_resource_group_name: Option<String>,
    pub explicit_resource_group_name: Option<String>,
    pub resource_group_tags: IndexMap<String, String>,

    pub image_urn: String,
    pub image_url: String,
    pub image_id: String,
    pub os_type: String,
    /// Name of the test platform, e.g. `windows-2019` or `nano-server`.
    pub platform_name: String,
    pub use_ephemeral_osdisk: bool,
    pub os_disk_size_gb: Option<u32>,
    pub custom_data: String,
    pub plan: Plan,
    pub use_managed_disks: bool,
    pub data_disks: Option<Vec<DataDisk>>,

    pub username: String,
    pub password: String,
    pub vm_name: Option<String>,
    pub store_deployment_credentials_in_state: bool,
    pub vm_tags: IndexMap<String, String>,

    pub nic_name: String,
    pub vnet_id: String,
    pub subnet_id: String,
    pub public_ip: bool,
    pub public_ip_sku: String,
    pub use_fqdn_hostname: bool,

    pub storage_account_type: String,
    pub existing_storage_account_blob_url: String,
    pub existing_storage_account_container: String,
    pub boot_diagnostics_enabled: bool,

    /// Replaces the script enabling WinRM listeners on Windows instances.
    pub winrm_powershell_script: Option<String>,
    pub format_data_disks: bool,
    pub format_data_disks_powershell_script: Option<String>,

    pub system_assigned_identity: bool,
    pub user_assigned_identities: Vec<String>,
    pub secret_url: String,
    pub vault_name: String,
    pub vault_resource_group: String,

    pub pre_deployment_template: Option<PathBuf>,
    pub pre_deployment_parameters: IndexMap<String, Value>,
    pub post_deployment_template: Option<PathBuf>,
    pub post_deployment_parameters: IndexMap<String, Value>,

    pub destroy_explicit_resource_group: bool,
    pub destroy_explicit_resource_group_tags: bool,
    pub destroy_resource_group_contents: bool,

    /// Seconds between two reads of a deployment state.
    pub deployment_sleep: u64,
    pub azure_api_retries: u32,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            location: String::new(),
            machine_size: String::new(),
            subscription_id: None,
            azure_environment: CloudEnvironment::default(),
            azure_resource_group_prefix: "kitchen-".into(),
            azure_resource_group_suffix: String::new(),
            azure_resource_group_name: None,
            explicit_resource_group_name: None,
            resource_group_tags: IndexMap::new(),
            image_urn: "Canonical:UbuntuServer:14.04.3-LTS:latest".into(),
            image_url: String::new(),
            image_id: String::new(),
            os_type: "linux".into(),
            platform_name: String::new(),
            use_ephemeral_osdisk: false,
            os_disk_size_gb: None,
            custom_data: String::new(),
            plan: Plan::default(),
            use_managed_disks: true,
            data_disks: None,
            username: "azure".into(),
            password: random_password(),
            vm_name: None,
            store_deployment_credentials_in_state: true,
            vm_tags: IndexMap::new(),
            nic_name: String::new(),
            vnet_id: String::new(),
            subnet_id: String::new(),
            public_ip: false,
            public_ip_sku: "Basic".into(),
            use_fqdn_hostname: false,
            storage_account_type: "Standard_LRS".into(),
            existing_storage_account_blob_url: String::new(),
            existing_storage_account_container: "vhds".into(),
            boot_diagnostics_enabled: true,
            winrm_powershell_script: None,
            format_data_disks: false,
            format_data_disks_powershell_script: None,
            system_assigned_identity: false,
            user_assigned_identities: Vec::new(),
            secret_url: String::new(),
            vault_name: String::new(),
            vault_resource_group: String::new(),
            pre_deployment_template: None,
            pre_deployment_parameters: IndexMap::new(),
            post_deployment_template: None,
            post_deployment_parameters: IndexMap::new(),
            destroy_explicit_resource_group: true,
            destroy_explicit_resource_group_tags: true,
            destroy_resource_group_contents: false,
            deployment_sleep: DEFAULT_DEPLOYMENT_SLEEP.as_secs(),
            azure_api_retries: DEFAULT_API_RETRIES,
        }
    }
}

/// Base64 of 25 random bytes.
fn random_password() -> String {
    let mut bytes = [0u8; 25];
    rand::thread_rng().fill_bytes(&mut bytes);
    STANDARD.encode(bytes)
}

impl DriverConfig {
    /// Reads a json configuration file. `AZURE_SUBSCRIPTION_ID` is used when the file names
    /// no subscription.
    pub fn load<E>(path: &Path, env_var: E) -> Result<Self, ConfigError>
    where
        E: Fn(&str) -> Result<String, VarError>,
    {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        let config: DriverConfig =
            serde_json::from_str(&content).map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                error: e.to_string(),
            })?;
        config.with_env_defaults(env_var).validated()
    }

    pub fn with_env_defaults<E>(mut self, env_var: E) -> Self
    where
        E: Fn(&str) -> Result<String, VarError>,
    {
        if self.subscription_id.as_deref().is_none_or(str::is_empty) {
            self.subscription_id = env_var(AZURE_SUBSCRIPTION_ID_ENV)
                .ok()
                .filter(|s| !s.is_empty());
        }
        self
    }

    pub fn validated(self) -> Result<Self, ConfigError> {
        if self.location.is_empty() {
            return Err(ConfigError::Missing("location"));
        }
        if self.machine_size.is_empty() {
            return Err(ConfigError::Missing("machine_size"));
        }
        Ok(self)
    }

    /// Uses `instance_name` as the resource group base name unless one is configured.
    pub fn for_instance(mut self, instance_name: &str) -> Self {
        if self.azure_resource_group_name.is_none() {
            self.azure_resource_group_name = Some(instance_name.to_string());
        }
        self
    }

    /// `{prefix}{name}-{yyyymmddTHHMMSS}{suffix}`, or the explicit name when configured.
    pub fn resource_group_name(&self, now: DateTime<Utc>) -> String {
        if let Some(explicit) = &self.explicit_resource_group_name {
            return explicit.clone();
        }
        format!(
            "{}{}-{}{}",
            self.azure_resource_group_prefix,
            self.azure_resource_group_name.as_deref().unwrap_or_default(),
            now.format("%Y%m%dT%H%M%S"),
            self.azure_resource_group_suffix
        )
    }

    pub fn deployment_sleep(&self) -> Duration {
        Duration::from_secs(self.deployment_sleep)
    }

    /// Whether the instance is reached through its public ip rather than its private one.
    pub fn uses_public_ip(&self) -> bool {
        self.vnet_id.is_empty() || self.public_ip
    }

    /// Nano server images take no custom data.
    pub fn accepts_windows_custom_data(&self) -> bool {
        !self.platform_name.contains("nano")
    }

    /// Powershell run at the first logon of a Windows instance reached through WinRM.
    pub fn windows_custom_data_script(&self) -> String {
        let winrm = self
            .winrm_powershell_script
            .as_deref()
            .unwrap_or(ENABLE_WINRM_SCRIPT);
        let format_disks = if self.format_data_disks {
            if self.data_disks.is_some() {
                info!("Data disks will be initialized and formatted NTFS automatically.");
            }
            self.format_data_disks_powershell_script
                .as_deref()
                .unwrap_or(FORMAT_DATA_DISKS_SCRIPT)
        } else {
            ""
        };
        format!("{winrm}\n{format_disks}\nlogoff\n")
    }
}

#[cfg(test)]
mod tests {
    use std::env::VarError;

    use assert_matches::assert_matches;
    use chrono::TimeZone;
    use tempfile::NamedTempFile;

    use super::*;

    fn no_env(_: &str) -> Result<String, VarError> {
        Err(VarError::NotPresent)
    }

    fn config_file(content: &str) -> NamedTempFile {
        let file = NamedTempFile::new().unwrap();
        fs::write(file.path(), content).unwrap();
        file
    }

    #[test]
    fn defaults() {
        let config = DriverConfig::default();

        assert_eq!(config.azure_resource_group_prefix, "kitchen-");
        assert_eq!(config.image_urn, "Canonical:UbuntuServer:14.04.3-LTS:latest");
        assert_eq!(config.existing_storage_account_container, "vhds");
        assert_eq!(config.public_ip_sku, "Basic");
        assert_eq!(config.deployment_sleep(), Duration::from_secs(10));
        assert_eq!(config.azure_api_retries, 5);
        assert!(config.destroy_explicit_resource_group);
        assert!(config.destroy_explicit_resource_group_tags);
        assert!(!config.destroy_resource_group_contents);
        assert!(config.uses_public_ip());
    }

    #[test]
    fn generated_passwords_are_random() {
        let first = DriverConfig::default().password;
        let second = DriverConfig::default().password;

        assert_eq!(STANDARD.decode(&first).unwrap().len(), 25);
        assert_ne!(first, second);
    }

    #[test]
    fn load_partial_file_keeps_defaults() {
        let file = config_file(
            r#"{
                "location": "westeurope",
                "machine_size": "Standard_D2s_v3",
                "azure_environment": "AzureUSGovernment",
                "vm_tags": {"owner": "kitchen"},
                "data_disks": [{"lun": 0, "disk_size_gb": 128}]
            }"#,
        );

        let config = DriverConfig::load(file.path(), |name| {
            assert_eq!(name, AZURE_SUBSCRIPTION_ID_ENV);
            Ok("env-subscription".to_string())
        })
        .unwrap();

        assert_eq!(config.azure_environment, CloudEnvironment::AzureUSGovernment);
        assert_eq!(config.subscription_id.as_deref(), Some("env-subscription"));
        assert_eq!(config.username, "azure");
        assert_eq!(
            config.data_disks,
            Some(vec![DataDisk {
                lun: 0,
                disk_size_gb: 128
            }])
        );
    }

    #[test]
    fn configured_subscription_wins_over_environment() {
        let file = config_file(
            r#"{"location": "westeurope", "machine_size": "Standard_B1s", "subscription_id": "file-sub"}"#,
        );

        let config =
            DriverConfig::load(file.path(), |_| Ok("env-subscription".to_string())).unwrap();

        assert_eq!(config.subscription_id.as_deref(), Some("file-sub"));
    }

    #[test]
    fn required_settings() {
        let file = config_file(r#"{"machine_size": "Standard_B1s"}"#);
        assert_matches!(
            DriverConfig::load(file.path(), no_env),
            Err(ConfigError::Missing("location"))
        );

        let file = config_file(r#"{"location": "westeurope", "azure_environment": "Mars"}"#);
        assert_matches!(
            DriverConfig::load(file.path(), no_env),
            Err(ConfigError::Parse { .. })
        );
    }

    #[test]
    fn resource_group_names() {
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let config = DriverConfig {
            azure_resource_group_suffix: "-ci".into(),
            ..DriverConfig::default()
        }
        .for_instance("default-ubuntu");

        assert_eq!(
            config.resource_group_name(now),
            "kitchen-default-ubuntu-20240102T030405-ci"
        );

        let explicit = DriverConfig {
            explicit_resource_group_name: Some("shared".into()),
            ..config
        };
        assert_eq!(explicit.resource_group_name(now), "shared");
    }

    #[test]
    fn windows_custom_data() {
        let script = DriverConfig::default().windows_custom_data_script();
        assert!(script.starts_with("$cert = New-SelfSignedCertificate"));
        assert!(!script.contains("Initialize-Disk"));
        assert!(script.ends_with("logoff\n"));

        let config = DriverConfig {
            winrm_powershell_script: Some("Enable-PSRemoting".into()),
            format_data_disks: true,
            data_disks: Some(vec![DataDisk {
                lun: 0,
                disk_size_gb: 64,
            }]),
            ..DriverConfig::default()
        };
        let script = config.windows_custom_data_script();
        assert!(script.starts_with("Enable-PSRemoting\n"));
        assert!(script.contains("Initialize-Disk -PartitionStyle GPT"));

        let config = DriverConfig {
            format_data_disks_powershell_script: Some("Format-Disks".into()),
            ..config
        };
        assert_eq!(
            config.windows_custom_data_script(),
            "Enable-PSRemoting\nFormat-Disks\nlogoff\n"
        );
    }

    #[test]
    fn nano_platforms_take_no_custom_data() {
        assert!(DriverConfig::default().accepts_windows_custom_data());
        let config = DriverConfig {
            platform_name: "windows-nano-2016".into(),
            ..DriverConfig::default()
        };
        assert!(!config.accepts_windows_custom_data());
    }

    #[test]
    fn private_network_addressing() {
        let config = DriverConfig {
            vnet_id: "/subscriptions/s/resourceGroups/net/providers/Microsoft.Network/virtualNetworks/vnet".into(),
            ..DriverConfig::default()
        };
        assert!(!config.uses_public_ip());

        let config = DriverConfig {
            public_ip: true,
            ..config
        };
        assert!(config.uses_public_ip());
    }
}
