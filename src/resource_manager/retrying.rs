use super::{
    ArmError, DeploymentOperation, NetworkInterface, PublicIpAddress, ResourceGroup,
    ResourceManager,
};
use crate::deployment::{Deployment, ProvisioningState};
use crate::retry::RetryPolicy;

/// Decorates a [ResourceManager] so every call is repeated on transient transport failures.
pub struct RetryingResourceManager<R> {
    inner: R,
    policy: RetryPolicy,
}

impl<R: ResourceManager> RetryingResourceManager<R> {
    pub fn new(inner: R, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

impl<R: ResourceManager> ResourceManager for RetryingResourceManager<R> {
    fn create_or_update_resource_group(
        &self,
        name: &str,
        group: &ResourceGroup,
    ) -> Result<ResourceGroup, ArmError> {
        self.policy
            .run(&format!("while creating resource group '{name}'"), || {
                self.inner.create_or_update_resource_group(name, group)
            })
    }

    fn resource_group_exists(&self, name: &str) -> Result<bool, ArmError> {
        self.policy.run(
            &format!("while checking if resource group '{name}' exists"),
            || self.inner.resource_group_exists(name),
        )
    }

    fn begin_delete_resource_group(&self, name: &str) -> Result<(), ArmError> {
        self.policy.run(
            &format!("while sending resource group deletion request for '{name}'"),
            || self.inner.begin_delete_resource_group(name),
        )
    }

    fn begin_create_deployment(
        &self,
        resource_group: &str,
        deployment_name: &str,
        deployment: &Deployment,
    ) -> Result<(), ArmError> {
        self.policy.run(
            &format!("while sending deployment creation request for deployment '{deployment_name}'"),
            || {
                self.inner
                    .begin_create_deployment(resource_group, deployment_name, deployment)
            },
        )
    }

    fn get_deployment_state(
        &self,
        resource_group: &str,
        deployment_name: &str,
    ) -> Result<ProvisioningState, ArmError> {
        self.policy.run(
            &format!("while retrieving state for deployment '{deployment_name}'"),
            || self.inner.get_deployment_state(resource_group, deployment_name),
        )
    }

    fn list_deployment_operations(
        &self,
        resource_group: &str,
        deployment_name: &str,
    ) -> Result<Vec<DeploymentOperation>, ArmError> {
        self.policy.run(
            &format!("while listing deployment operations for deployment '{deployment_name}'"),
            || {
                self.inner
                    .list_deployment_operations(resource_group, deployment_name)
            },
        )
    }

    fn get_public_ip(
        &self,
        resource_group: &str,
        name: &str,
    ) -> Result<PublicIpAddress, ArmError> {
        self.policy.run(
            &format!("while fetching public ip '{name}' for resource group '{resource_group}'"),
            || self.inner.get_public_ip(resource_group, name),
        )
    }

    fn get_network_interface(
        &self,
        resource_group: &str,
        name: &str,
    ) -> Result<NetworkInterface, ArmError> {
        self.policy.run(
            &format!(
                "while fetching network interface '{name}' for resource group '{resource_group}'"
            ),
            || self.inner.get_network_interface(resource_group, name),
        )
    }
}
