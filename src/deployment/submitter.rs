use tracing::{debug, info};

use super::Deployment;
use crate::resource_manager::{ArmError, OperationHandle, ResourceGroup, ResourceManager};

/// Sends resource group and deployment requests, returning as soon as the provider accepts them.
pub struct DeploymentSubmitter<'a, R: ?Sized> {
    resource_manager: &'a R,
}

impl<'a, R> DeploymentSubmitter<'a, R>
where
    R: ResourceManager + ?Sized,
{
    pub fn new(resource_manager: &'a R) -> Self {
        Self { resource_manager }
    }

    pub fn ensure_resource_group(&self, name: &str, group: &ResourceGroup) -> Result<(), ArmError> {
        debug!("ensuring resource group {name}");
        self.resource_manager
            .create_or_update_resource_group(name, group)?;
        Ok(())
    }

    pub fn resource_group_exists(&self, name: &str) -> Result<bool, ArmError> {
        self.resource_manager.resource_group_exists(name)
    }

    /// Requests the deletion of the group without waiting for it to be gone.
    pub fn delete_resource_group(&self, name: &str) -> Result<(), ArmError> {
        debug!("deleting resource group {name}");
        self.resource_manager.begin_delete_resource_group(name)
    }

    pub fn submit(
        &self,
        resource_group: &str,
        deployment_name: &str,
        deployment: &Deployment,
    ) -> Result<OperationHandle, ArmError> {
        info!("Creating deployment: {deployment_name}");
        debug!(
            "deployment template: {}",
            serde_json::to_string_pretty(deployment.template()).unwrap_or_default()
        );
        self.resource_manager
            .begin_create_deployment(resource_group, deployment_name, deployment)?;
        Ok(OperationHandle::new(resource_group, deployment_name))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use mockall::predicate::{always, eq, function};
    use serde_json::json;

    use super::*;
    use crate::deployment::{DeploymentMode, parameters_in_values_format};
    use crate::resource_manager::tests::MockResourceManager;

    #[test]
    fn submit_returns_a_handle_for_the_deployment() {
        let mut resource_manager = MockResourceManager::new();
        resource_manager
            .expect_begin_create_deployment()
            .once()
            .with(
                eq("kitchen-rg"),
                eq("deploy-a1b2"),
                function(|d: &Deployment| d.mode() == DeploymentMode::Incremental),
            )
            .returning(|_, _, _| Ok(()));

        let deployment = Deployment::incremental(
            json!({}),
            parameters_in_values_format([("location", json!("westeurope"))]),
        );
        let handle = DeploymentSubmitter::new(&resource_manager)
            .submit("kitchen-rg", "deploy-a1b2", &deployment)
            .unwrap();

        assert_eq!(handle.resource_group(), "kitchen-rg");
        assert_eq!(handle.deployment_name(), "deploy-a1b2");
    }

    #[test]
    fn submit_surfaces_conflicts() {
        let mut resource_manager = MockResourceManager::new();
        resource_manager
            .expect_begin_create_deployment()
            .once()
            .with(always(), always(), always())
            .returning(|_, _, _| {
                Err(ArmError::from_response(
                    409,
                    br#"{"error":{"code":"DeploymentActive","message":"busy"}}"#,
                ))
            });

        let result = DeploymentSubmitter::new(&resource_manager).submit(
            "rg",
            "deploy",
            &Deployment::wipe(json!({})),
        );

        assert_matches!(result, Err(err) if err.is_deployment_active());
    }

    #[test]
    fn resource_group_requests() {
        let mut resource_manager = MockResourceManager::new();
        resource_manager
            .expect_create_or_update_resource_group()
            .once()
            .with(
                eq("rg"),
                eq(ResourceGroup::new("westeurope", Default::default())),
            )
            .returning(|_, group| Ok(group.clone()));
        resource_manager
            .expect_begin_delete_resource_group()
            .once()
            .with(eq("rg"))
            .returning(|_| Ok(()));

        let submitter = DeploymentSubmitter::new(&resource_manager);
        submitter
            .ensure_resource_group("rg", &ResourceGroup::new("westeurope", Default::default()))
            .unwrap();
        submitter.delete_resource_group("rg").unwrap();
    }
}
