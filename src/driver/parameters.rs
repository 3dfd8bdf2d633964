//! Parameters and template data context of the main deployment.
use std::fs;
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use indexmap::IndexMap;
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use super::DriverError;
use super::config::DriverConfig;
use crate::state::InstanceState;
use crate::transport::Transport;

/// Name of the public ip resource created by the templates.
pub const PUBLIC_IP_NAME: &str = "publicip";

/// Image the virtual machine boots from.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageReference {
    /// Managed image referenced by resource id.
    Id(String),
    /// Generalised VHD in a storage account.
    Url { url: String, os_type: String },
    /// Marketplace image from a `publisher:offer:sku:version` urn.
    Marketplace {
        publisher: Option<String>,
        offer: Option<String>,
        sku: Option<String>,
        version: Option<String>,
    },
}

impl ImageReference {
    pub fn from_config(config: &DriverConfig) -> Self {
        if !config.image_id.is_empty() {
            ImageReference::Id(config.image_id.clone())
        } else if !config.image_url.is_empty() {
            ImageReference::Url {
                url: config.image_url.clone(),
                os_type: config.os_type.clone(),
            }
        } else {
            let mut parts = config.image_urn.splitn(4, ':').map(str::to_string);
            ImageReference::Marketplace {
                publisher: parts.next(),
                offer: parts.next(),
                sku: parts.next(),
                version: parts.next(),
            }
        }
    }

    fn parameters(&self) -> Vec<(&'static str, Value)> {
        match self {
            ImageReference::Id(id) => vec![("imageId", json!(id))],
            ImageReference::Url { url, os_type } => {
                vec![("imageUrl", json!(url)), ("osType", json!(os_type))]
            }
            ImageReference::Marketplace {
                publisher,
                offer,
                sku,
                version,
            } => vec![
                ("imagePublisher", json!(publisher)),
                ("imageOffer", json!(offer)),
                ("imageSku", json!(sku)),
                ("imageVersion", json!(version)),
            ],
        }
    }
}

/// `nic-{vm_name}` unless a name is configured.
pub fn nic_name(config: &DriverConfig, vm_name: &str) -> String {
    if config.nic_name.is_empty() {
        format!("nic-{vm_name}")
    } else {
        config.nic_name.clone()
    }
}

/// Base64 of the file named by `custom_data`, or of the value itself when it is not a file.
pub fn prepared_custom_data(custom_data: &str) -> Result<Option<String>, DriverError> {
    if custom_data.is_empty() {
        return Ok(None);
    }
    let path = Path::new(custom_data);
    let encoded = if path.is_file() {
        let content = fs::read(path).map_err(|e| {
            DriverError::InvalidConfig(format!("reading custom data `{custom_data}`: {e}"))
        })?;
        STANDARD.encode(content)
    } else {
        STANDARD.encode(custom_data)
    };
    Ok(Some(encoded))
}

/// Raw parameters of the main deployment, in submission order.
pub fn deployment_parameters(
    config: &DriverConfig,
    state: &InstanceState,
    transport: &Transport,
) -> Result<IndexMap<String, Value>, DriverError> {
    let uuid = state
        .uuid
        .as_deref()
        .ok_or(DriverError::IncompleteState("uuid"))?;
    let vm_name = state
        .vm_name
        .as_deref()
        .ok_or(DriverError::IncompleteState("vm_name"))?;

    let mut parameters: IndexMap<String, Value> = IndexMap::new();
    let mut set = |name: &str, value: Value| {
        parameters.insert(name.to_string(), value);
    };

    set("location", json!(config.location));
    set("vmSize", json!(config.machine_size));
    set("storageAccountType", json!(config.storage_account_type));
    set("bootDiagnosticsEnabled", json!(config.boot_diagnostics_enabled));
    set("newStorageAccountName", json!(format!("storage{uuid}")));
    set("adminUsername", json!(config.username));
    set("dnsNameForPublicIP", json!(format!("kitchen-{uuid}")));
    set("vmName", json!(vm_name));
    set("systemAssignedIdentity", json!(config.system_assigned_identity));
    set(
        "userAssignedIdentities",
        Value::Object(
            config
                .user_assigned_identities
                .iter()
                .map(|identity| (identity.clone(), json!({})))
                .collect(),
        ),
    );
    set("secretUrl", json!(config.secret_url));
    set("vaultName", json!(config.vault_name));
    set("vaultResourceGroup", json!(config.vault_resource_group));

    if !transport.uses_ssh_key() {
        set("adminPassword", json!(config.password));
    }

    set("publicIPSKU", json!(config.public_ip_sku));
    if config.public_ip_sku == "Standard" {
        set("publicIPAddressType", json!("Static"));
    }

    set("nicName", json!(nic_name(config, vm_name)));

    if let Some(custom_data) = prepared_custom_data(&config.custom_data)? {
        set("customData", json!(custom_data));
    }
    if !config.existing_storage_account_blob_url.is_empty() {
        let resource_group = state.azure_resource_group_name.as_deref().unwrap_or_default();
        set("osDiskNameSuffix", json!(format!("-{resource_group}")));
        set(
            "existingStorageAccountBlobURL",
            json!(config.existing_storage_account_blob_url),
        );
    }
    if !config.existing_storage_account_container.is_empty() {
        set(
            "existingStorageAccountBlobContainer",
            json!(config.existing_storage_account_container),
        );
    }
    if let Some(size) = config.os_disk_size_gb {
        set("osDiskSizeGb", json!(size));
    }

    for (name, value) in ImageReference::from_config(config).parameters() {
        set(name, value);
    }

    Ok(parameters)
}

/// Data disks as the templates declare them. Only managed disks are supported.
fn data_disks(config: &DriverConfig) -> Value {
    let Some(disks) = &config.data_disks else {
        return Value::Null;
    };
    if !config.use_managed_disks {
        warn!(
            "Data disks are only supported when used with the \"use_managed_disks\" option. No additional disks were added to the configuration."
        );
        return json!([]);
    }
    let disks: Vec<Value> = disks
        .iter()
        .map(|disk| {
            json!({
                "name": format!("datadisk{}", disk.lun),
                "lun": disk.lun,
                "diskSizeGB": disk.disk_size_gb,
                "createOption": "Empty"
            })
        })
        .collect();
    debug!("Additional disks being added to configuration: {disks:?}");
    Value::Array(disks)
}

fn plan(config: &DriverConfig) -> Value {
    if config.plan.is_empty() {
        return Value::Null;
    }
    let mut plan = Map::new();
    let fields = [
        ("name", &config.plan.name),
        ("product", &config.plan.product),
        ("promotionCode", &config.plan.promotion_code),
        ("publisher", &config.plan.publisher),
    ];
    for (key, value) in fields {
        if let Some(value) = value {
            plan.insert(key.to_string(), json!(value));
        }
    }
    Value::Object(plan)
}

/// Data handed to the template renderer for the main deployment.
pub fn template_context(config: &DriverConfig, transport: &Transport, internal: bool) -> Value {
    let mut context = json!({
        "vm_tags": config.vm_tags,
        "use_managed_disks": config.use_managed_disks,
        "image_url": config.image_url,
        "storage_account_type": config.storage_account_type,
        "existing_storage_account_blob_url": config.existing_storage_account_blob_url,
        "image_id": config.image_id,
        "existing_storage_account_container": config.existing_storage_account_container,
        "custom_data": config.custom_data,
        "os_disk_size_gb": config.os_disk_size_gb,
        "data_disks": data_disks(config),
        "use_ephemeral_osdisk": config.use_ephemeral_osdisk,
        "ssh_key": transport.ssh_key.as_ref().map(|p| p.display().to_string()),
        "plan": plan(config),
    });
    if internal {
        if let Some(context) = context.as_object_mut() {
            context.insert("vnet_id".into(), json!(config.vnet_id));
            context.insert("subnet_id".into(), json!(config.subnet_id));
            context.insert("public_ip".into(), json!(config.public_ip));
            context.insert("public_ip_sku".into(), json!(config.public_ip_sku));
        }
    }
    context
}
