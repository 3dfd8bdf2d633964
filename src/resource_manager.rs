//! Client surface of the Azure Resource Manager used to provision and tear down instances.
pub mod client;
pub mod error;
pub mod models;
pub mod retrying;

pub use error::ArmError;
pub use models::{
    DeploymentOperation, NetworkInterface, OperationHandle, PublicIpAddress, ResourceGroup,
};

use crate::deployment::{Deployment, ProvisioningState};

/// Api version used for resource groups and deployments.
pub const RESOURCES_API_VERSION: &str = "2021-04-01";
/// Api version used for public ip addresses and network interfaces.
pub const NETWORK_API_VERSION: &str = "2023-04-01";

/// Operations the driver needs from the Resource Manager.
pub trait ResourceManager {
    fn create_or_update_resource_group(
        &self,
        name: &str,
        group: &ResourceGroup,
    ) -> Result<ResourceGroup, ArmError>;

    fn resource_group_exists(&self, name: &str) -> Result<bool, ArmError>;

    /// Requests the deletion of a resource group and returns once the request is accepted.
    fn begin_delete_resource_group(&self, name: &str) -> Result<(), ArmError>;

    /// Submits a deployment and returns once the provider accepted it.
    fn begin_create_deployment(
        &self,
        resource_group: &str,
        deployment_name: &str,
        deployment: &Deployment,
    ) -> Result<(), ArmError>;

    fn get_deployment_state(
        &self,
        resource_group: &str,
        deployment_name: &str,
    ) -> Result<ProvisioningState, ArmError>;

    fn list_deployment_operations(
        &self,
        resource_group: &str,
        deployment_name: &str,
    ) -> Result<Vec<DeploymentOperation>, ArmError>;

    fn get_public_ip(&self, resource_group: &str, name: &str)
    -> Result<PublicIpAddress, ArmError>;

    fn get_network_interface(
        &self,
        resource_group: &str,
        name: &str,
    ) -> Result<NetworkInterface, ArmError>;
}

impl<R: ResourceManager + ?Sized> ResourceManager for Box<R> {
    fn create_or_update_resource_group(
        &self,
        name: &str,
        group: &ResourceGroup,
    ) -> Result<ResourceGroup, ArmError> {
        (**self).create_or_update_resource_group(name, group)
    }

    fn resource_group_exists(&self, name: &str) -> Result<bool, ArmError> {
        (**self).resource_group_exists(name)
    }

    fn begin_delete_resource_group(&self, name: &str) -> Result<(), ArmError> {
        (**self).begin_delete_resource_group(name)
    }

    fn begin_create_deployment(
        &self,
        resource_group: &str,
        deployment_name: &str,
        deployment: &Deployment,
    ) -> Result<(), ArmError> {
        (**self).begin_create_deployment(resource_group, deployment_name, deployment)
    }

    fn get_deployment_state(
        &self,
        resource_group: &str,
        deployment_name: &str,
    ) -> Result<ProvisioningState, ArmError> {
        (**self).get_deployment_state(resource_group, deployment_name)
    }

    fn list_deployment_operations(
        &self,
        resource_group: &str,
        deployment_name: &str,
    ) -> Result<Vec<DeploymentOperation>, ArmError> {
        (**self).list_deployment_operations(resource_group, deployment_name)
    }

    fn get_public_ip(
        &self,
        resource_group: &str,
        name: &str,
    ) -> Result<PublicIpAddress, ArmError> {
        (**self).get_public_ip(resource_group, name)
    }

    fn get_network_interface(
        &self,
        resource_group: &str,
        name: &str,
    ) -> Result<NetworkInterface, ArmError> {
        (**self).get_network_interface(resource_group, name)
    }
}
