use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::deployment::ProvisioningState;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ResourceGroup {
    pub location: String,
    #[serde(default)]
    pub tags: IndexMap<String, String>,
}

impl ResourceGroup {
    pub fn new(location: impl Into<String>, tags: IndexMap<String, String>) -> Self {
        Self {
            location: location.into(),
            tags,
        }
    }
}

/// Identifies a deployment accepted by the Resource Manager. Consumed by the poller that
/// follows it to its end state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationHandle {
    resource_group: String,
    deployment_name: String,
}

impl OperationHandle {
    pub fn new(resource_group: impl Into<String>, deployment_name: impl Into<String>) -> Self {
        Self {
            resource_group: resource_group.into(),
            deployment_name: deployment_name.into(),
        }
    }

    pub fn resource_group(&self) -> &str {
        &self.resource_group
    }

    pub fn deployment_name(&self) -> &str {
        &self.deployment_name
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub(crate) struct DeploymentExtended {
    pub properties: DeploymentStatus,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DeploymentStatus {
    pub provisioning_state: ProvisioningState,
}

/// One page of a list response.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Page<T> {
    #[serde(default = "Vec::new")]
    pub value: Vec<T>,
    pub next_link: Option<String>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentOperation {
    #[serde(default)]
    pub operation_id: String,
    pub properties: DeploymentOperationProperties,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentOperationProperties {
    pub provisioning_state: ProvisioningState,
    pub status_code: Option<String>,
    pub status_message: Option<Value>,
    pub target_resource: Option<TargetResource>,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TargetResource {
    #[serde(default)]
    pub resource_type: String,
    #[serde(default)]
    pub resource_name: String,
}

impl DeploymentOperation {
    pub fn state(&self) -> &ProvisioningState {
        &self.properties.provisioning_state
    }

    pub fn resource_type(&self) -> &str {
        self.properties
            .target_resource
            .as_ref()
            .map(|t| t.resource_type.as_str())
            .unwrap_or_default()
    }

    pub fn resource_name(&self) -> &str {
        self.properties
            .target_resource
            .as_ref()
            .map(|t| t.resource_name.as_str())
            .unwrap_or_default()
    }

    /// Operations that did not answer `OK` are treated as failures when a deployment fails.
    pub fn is_ok(&self) -> bool {
        self.properties.status_code.as_deref() == Some("OK")
    }

    pub fn status_message(&self) -> String {
        match &self.properties.status_message {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
pub struct PublicIpAddress {
    #[serde(default)]
    pub properties: PublicIpAddressProperties,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct PublicIpAddressProperties {
    pub ip_address: Option<String>,
    pub dns_settings: Option<DnsSettings>,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
pub struct DnsSettings {
    pub fqdn: Option<String>,
}

impl PublicIpAddress {
    pub fn ip_address(&self) -> Option<&str> {
        self.properties.ip_address.as_deref()
    }

    pub fn fqdn(&self) -> Option<&str> {
        self.properties
            .dns_settings
            .as_ref()
            .and_then(|d| d.fqdn.as_deref())
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
pub struct NetworkInterface {
    #[serde(default)]
    pub properties: NetworkInterfaceProperties,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInterfaceProperties {
    #[serde(default)]
    pub ip_configurations: Vec<IpConfiguration>,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
pub struct IpConfiguration {
    #[serde(default)]
    pub properties: IpConfigurationProperties,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
pub struct IpConfigurationProperties {
    #[serde(rename = "privateIPAddress")]
    pub private_ip_address: Option<String>,
}

impl NetworkInterface {
    /// Private address of the first ip configuration.
    pub fn private_ip_address(&self) -> Option<&str> {
        self.properties
            .ip_configurations
            .first()
            .and_then(|c| c.properties.private_ip_address.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn deployment_operation_from_provider_payload() {
        let operation: DeploymentOperation = serde_json::from_value(json!({
            "id": "/subscriptions/x/operations/ABC",
            "operationId": "ABC",
            "properties": {
                "provisioningState": "Failed",
                "statusCode": "Conflict",
                "statusMessage": {"error": {"code": "SkuNotAvailable"}},
                "targetResource": {
                    "resourceType": "Microsoft.Compute/virtualMachines",
                    "resourceName": "vm"
                }
            }
        }))
        .unwrap();

        assert_eq!(operation.state(), &ProvisioningState::Failed);
        assert_eq!(operation.resource_type(), "Microsoft.Compute/virtualMachines");
        assert_eq!(operation.resource_name(), "vm");
        assert!(!operation.is_ok());
        assert_eq!(
            operation.status_message(),
            r#"{"error":{"code":"SkuNotAvailable"}}"#
        );
    }

    #[test]
    fn operation_without_target_or_status() {
        let operation: DeploymentOperation = serde_json::from_value(json!({
            "properties": {"provisioningState": "Running"}
        }))
        .unwrap();

        assert_eq!(operation.resource_name(), "");
        assert!(!operation.is_ok());
        assert_eq!(operation.status_message(), "");
    }

    #[test]
    fn public_ip_and_fqdn() {
        let ip: PublicIpAddress = serde_json::from_value(json!({
            "properties": {
                "ipAddress": "20.1.2.3",
                "dnsSettings": {"fqdn": "kitchen.westeurope.cloudapp.azure.com"}
            }
        }))
        .unwrap();

        assert_eq!(ip.ip_address(), Some("20.1.2.3"));
        assert_eq!(ip.fqdn(), Some("kitchen.westeurope.cloudapp.azure.com"));
    }

    #[test]
    fn network_interface_first_private_address() {
        let nic: NetworkInterface = serde_json::from_value(json!({
            "properties": {"ipConfigurations": [
                {"properties": {"privateIPAddress": "10.0.0.4"}},
                {"properties": {"privateIPAddress": "10.0.0.5"}}
            ]}
        }))
        .unwrap();

        assert_eq!(nic.private_ip_address(), Some("10.0.0.4"));
        assert_eq!(NetworkInterface::default().private_ip_address(), None);
    }
}
