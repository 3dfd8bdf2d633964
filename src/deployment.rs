//! Template deployments: their payload, submission and the poller following them.
pub mod poller;
pub mod submitter;

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;

use crate::resource_manager::ArmError;

#[derive(Error, Debug)]
pub enum DeploymentError {
    #[error(transparent)]
    Arm(#[from] ArmError),
    #[error("deployment `{deployment}` failed: {message}")]
    OperationFailed { deployment: String, message: String },
    #[error("deployment `{deployment}` failed without reporting a failing operation")]
    Failed { deployment: String },
}

/// Provisioning state reported by the Resource Manager for deployments and operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisioningState {
    Accepted,
    Running,
    Succeeded,
    Failed,
    Canceled,
    Deleted,
    /// Any other transient state, such as `Creating` or `Updating`.
    Other(String),
}

impl ProvisioningState {
    /// A deployment in one of these states will not change anymore.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProvisioningState::Succeeded
                | ProvisioningState::Failed
                | ProvisioningState::Canceled
                | ProvisioningState::Deleted
        )
    }

    pub fn as_str(&self) -> &str {
        match self {
            ProvisioningState::Accepted => "Accepted",
            ProvisioningState::Running => "Running",
            ProvisioningState::Succeeded => "Succeeded",
            ProvisioningState::Failed => "Failed",
            ProvisioningState::Canceled => "Canceled",
            ProvisioningState::Deleted => "Deleted",
            ProvisioningState::Other(state) => state,
        }
    }
}

impl From<&str> for ProvisioningState {
    fn from(value: &str) -> Self {
        match value {
            "Accepted" => ProvisioningState::Accepted,
            "Running" => ProvisioningState::Running,
            "Succeeded" => ProvisioningState::Succeeded,
            "Failed" => ProvisioningState::Failed,
            "Canceled" => ProvisioningState::Canceled,
            "Deleted" => ProvisioningState::Deleted,
            other => ProvisioningState::Other(other.to_string()),
        }
    }
}

impl fmt::Display for ProvisioningState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ProvisioningState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ProvisioningState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(ProvisioningState::from(value.as_str()))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentMode {
    /// Adds or updates the template resources, leaving the rest of the group untouched.
    Incremental,
    /// Makes the group contain exactly the template resources.
    Complete,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ParameterValue {
    pub value: Value,
}

/// Template parameters in the `{"name": {"value": ..}}` shape the provider expects.
pub type DeploymentParameters = IndexMap<String, ParameterValue>;

/// Body of a deployment request.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Deployment {
    properties: DeploymentProperties,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
struct DeploymentProperties {
    mode: DeploymentMode,
    template: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    parameters: Option<DeploymentParameters>,
}

impl Deployment {
    pub fn incremental(template: Value, parameters: DeploymentParameters) -> Self {
        Self {
            properties: DeploymentProperties {
                mode: DeploymentMode::Incremental,
                template,
                parameters: Some(parameters),
            },
        }
    }

    /// Deployment of a template without resources that removes everything in the group.
    pub fn wipe(template: Value) -> Self {
        Self {
            properties: DeploymentProperties {
                mode: DeploymentMode::Complete,
                template,
                parameters: None,
            },
        }
    }

    pub fn mode(&self) -> DeploymentMode {
        self.properties.mode
    }

    pub fn template(&self) -> &Value {
        &self.properties.template
    }

    pub fn parameters(&self) -> Option<&DeploymentParameters> {
        self.properties.parameters.as_ref()
    }
}

/// Wraps every value as `{"value": v}`, keeping the given order.
///
/// Applying it to an already shaped map wraps the values once more.
pub fn parameters_in_values_format<I, K, V>(parameters: I) -> DeploymentParameters
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    let mut shaped = DeploymentParameters::new();
    for (name, value) in parameters {
        let name = name.into();
        let previous = shaped.insert(
            name.clone(),
            ParameterValue {
                value: value.into(),
            },
        );
        debug_assert!(previous.is_none(), "duplicate deployment parameter `{name}`");
    }
    shaped
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    #[rstest]
    #[case("Accepted", false)]
    #[case("Running", false)]
    #[case("Creating", false)]
    #[case("Succeeded", true)]
    #[case("Failed", true)]
    #[case("Canceled", true)]
    #[case("Deleted", true)]
    fn terminal_states(#[case] state: &str, #[case] terminal: bool) {
        let state = ProvisioningState::from(state);
        assert_eq!(state.is_terminal(), terminal);
    }

    #[test]
    fn unknown_states_keep_their_name() {
        let state: ProvisioningState = serde_json::from_value(json!("Updating")).unwrap();
        assert_eq!(state, ProvisioningState::Other("Updating".into()));
        assert_eq!(state.to_string(), "Updating");
    }

    #[test]
    fn parameters_are_wrapped_in_order() {
        let shaped = parameters_in_values_format([
            ("location", json!("westeurope")),
            ("vmSize", json!("Standard_D2s_v3")),
            ("dataDisks", json!([{"lun": 0, "disk_size_gb": 128}])),
        ]);

        assert_eq!(
            serde_json::to_value(&shaped).unwrap(),
            json!({
                "location": {"value": "westeurope"},
                "vmSize": {"value": "Standard_D2s_v3"},
                "dataDisks": {"value": [{"lun": 0, "disk_size_gb": 128}]}
            })
        );
        let names: Vec<_> = shaped.keys().map(String::as_str).collect();
        assert_eq!(names, ["location", "vmSize", "dataDisks"]);
    }

    #[test]
    fn shaping_twice_nests_values() {
        let once = parameters_in_values_format([("size", json!(1))]);
        let twice = parameters_in_values_format(
            once.into_iter()
                .map(|(k, v)| (k, serde_json::to_value(v).unwrap())),
        );

        assert_eq!(
            serde_json::to_value(&twice).unwrap(),
            json!({"size": {"value": {"value": 1}}})
        );
    }

    #[test]
    fn empty_parameters() {
        let empty: Vec<(String, Value)> = Vec::new();
        assert!(parameters_in_values_format(empty).is_empty());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "duplicate deployment parameter")]
    fn duplicated_names_are_rejected() {
        parameters_in_values_format([("location", json!("a")), ("location", json!("b"))]);
    }

    #[test]
    fn wipe_deployment_is_complete_and_has_no_parameters() {
        let deployment = Deployment::wipe(json!({"resources": []}));

        assert_eq!(deployment.mode(), DeploymentMode::Complete);
        assert_eq!(
            serde_json::to_value(&deployment).unwrap(),
            json!({"properties": {"mode": "Complete", "template": {"resources": []}}})
        );
    }

    #[test]
    fn incremental_deployment_payload() {
        let deployment = Deployment::incremental(
            json!({"resources": []}),
            parameters_in_values_format([("location", json!("westeurope"))]),
        );

        assert_eq!(deployment.mode(), DeploymentMode::Incremental);
        assert_eq!(
            deployment.parameters().and_then(|p| p.get("location")),
            Some(&ParameterValue {
                value: json!("westeurope")
            })
        );
    }
}
