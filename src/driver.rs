//! Creation and destruction of test instances on Azure.
pub mod config;
pub mod parameters;

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use indexmap::IndexMap;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::authenticator::HttpAuthenticator;
use crate::credentials::{AzureCredentials, CredentialsError};
use crate::deployment::poller::DeploymentPoller;
use crate::deployment::submitter::DeploymentSubmitter;
use crate::deployment::{Deployment, DeploymentError, parameters_in_values_format};
use crate::environment::CloudEnvironment;
use crate::http::client::HttpClient;
use crate::http::config::HttpConfig;
use crate::resource_manager::client::HttpResourceManager;
use crate::resource_manager::retrying::RetryingResourceManager;
use crate::resource_manager::{ArmError, ResourceGroup, ResourceManager};
use crate::retry::RetryPolicy;
use crate::state::InstanceState;
use crate::template::{
    EMPTY_TEMPLATE, INTERNAL_TEMPLATE, PUBLIC_TEMPLATE, TemplateError, TemplateRenderer,
    add_linux_ssh_configuration, add_windows_custom_data, read_template_file,
};
use crate::token_retriever::TokenRetrieverWithCache;
use crate::transport::{Transport, TransportError};
use self::config::DriverConfig;
use self::parameters::{PUBLIC_IP_NAME, deployment_parameters, nic_name, template_context};

const TOKEN_RETRIES: u8 = 2;

#[derive(Error, Debug)]
pub enum DriverError {
    #[error(
        "A subscription_id config value was not detected and the driver cannot continue. Please check your configuration."
    )]
    MissingSubscriptionId,
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("instance state has no `{0}`")]
    IncompleteState(&'static str),
    #[error("`{0}` has no address")]
    MissingAddress(String),
    #[error("building azure client: {0}")]
    Client(String),
    #[error(transparent)]
    Credentials(#[from] CredentialsError),
    #[error(transparent)]
    Arm(#[from] ArmError),
    #[error(transparent)]
    Deployment(#[from] DeploymentError),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl DriverError {
    fn arm_error(&self) -> Option<&ArmError> {
        match self {
            DriverError::Arm(err) | DriverError::Deployment(DeploymentError::Arm(err)) => {
                Some(err)
            }
            _ => None,
        }
    }

    /// A deployment with the same name is still running for this instance.
    pub fn is_deployment_active(&self) -> bool {
        self.arm_error().is_some_and(ArmError::is_deployment_active)
    }
}

/// Builds the Resource Manager client of a subscription.
pub trait ClientFactory {
    fn resource_manager(
        &self,
        subscription_id: &str,
        environment: CloudEnvironment,
    ) -> Result<Box<dyn ResourceManager>, DriverError>;
}

/// Authenticates with the credentials found in the environment or the credential file.
pub struct AzureClientFactory {
    http_config: HttpConfig,
}

impl AzureClientFactory {
    pub fn new(http_config: HttpConfig) -> Self {
        Self { http_config }
    }
}

impl ClientFactory for AzureClientFactory {
    fn resource_manager(
        &self,
        subscription_id: &str,
        environment: CloudEnvironment,
    ) -> Result<Box<dyn ResourceManager>, DriverError> {
        let options = AzureCredentials::new(subscription_id, environment).azure_options()?;

        let http_client = HttpClient::new(self.http_config.clone())
            .map_err(|e| DriverError::Client(e.to_string()))?;
        let token_retriever = TokenRetrieverWithCache::new(
            options.credentials.token_request(),
            HttpAuthenticator::new(http_client.clone()),
        )
        .with_retries(TOKEN_RETRIES);
        let base_url =
            Url::parse(options.base_url).map_err(|e| DriverError::Client(e.to_string()))?;

        Ok(Box::new(HttpResourceManager::new(
            http_client,
            token_retriever,
            base_url,
            options.subscription_id,
        )))
    }
}

fn log_operation_error(err: &DriverError) {
    if let Some(body) = err.arm_error().and_then(ArmError::body) {
        error!("{body}");
    }
}

/// Sequences the deployments of an instance and its teardown.
pub struct Driver<F, R> {
    config: DriverConfig,
    transport: Transport,
    factory: F,
    renderer: R,
    sleep: fn(Duration),
}

impl<F, R> Driver<F, R>
where
    F: ClientFactory,
    R: TemplateRenderer,
{
    pub fn new(config: DriverConfig, transport: Transport, factory: F, renderer: R) -> Self {
        Self {
            config,
            transport,
            factory,
            renderer,
            sleep: std::thread::sleep,
        }
    }

    /// Replaces the pause between two deployment state reads.
    pub fn with_sleep(self, sleep: fn(Duration)) -> Self {
        Self { sleep, ..self }
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Client of the subscription with every call retried on transient failures.
    fn resource_manager(
        &self,
        subscription_id: &str,
        environment: CloudEnvironment,
    ) -> Result<RetryingResourceManager<Box<dyn ResourceManager>>, DriverError> {
        let inner = self.factory.resource_manager(subscription_id, environment)?;
        Ok(RetryingResourceManager::new(
            inner,
            RetryPolicy::new(self.config.azure_api_retries),
        ))
    }

    fn resource_group(&self, tags: IndexMap<String, String>) -> ResourceGroup {
        ResourceGroup::new(self.config.location.clone(), tags)
    }

    /// Submits a deployment and waits for it to settle.
    fn deploy<M: ResourceManager>(
        &self,
        resource_manager: &M,
        resource_group: &str,
        deployment_name: &str,
        deployment: &Deployment,
    ) -> Result<(), DriverError> {
        let handle = DeploymentSubmitter::new(resource_manager).submit(
            resource_group,
            deployment_name,
            deployment,
        )?;
        DeploymentPoller::new(resource_manager, self.config.deployment_sleep())
            .with_sleep(self.sleep)
            .follow(handle)?;
        Ok(())
    }

    fn main_template(&self) -> Result<Value, DriverError> {
        let internal = !self.config.vnet_id.is_empty();
        let name = if internal {
            info!("Using custom vnet: {}", self.config.vnet_id);
            INTERNAL_TEMPLATE
        } else {
            PUBLIC_TEMPLATE
        };
        let mut template = self
            .renderer
            .render(name, &template_context(&self.config, &self.transport, internal))?;

        if self.transport.uses_winrm() && self.config.accepts_windows_custom_data() {
            info!("Adding WinRM configuration to provisioning profile.");
            let custom_data = STANDARD.encode(self.config.windows_custom_data_script());
            add_windows_custom_data(&mut template, &custom_data);
        }
        if let Some(public_key) = self.transport.public_key()? {
            info!(
                "Adding public key from {} to the deployment.",
                self.transport
                    .public_key_path()
                    .unwrap_or_default()
                    .display()
            );
            add_linux_ssh_configuration(&mut template, &public_key);
        }
        Ok(template)
    }

    /// Runs the pre, main and post deployments, in that order.
    fn run_deployments<M: ResourceManager>(
        &self,
        resource_manager: &M,
        resource_group: &str,
        state: &mut InstanceState,
        parameters: IndexMap<String, Value>,
    ) -> Result<(), DriverError> {
        let uuid = state.uuid.clone().unwrap_or_default();

        if let Some(path) = self
            .config
            .pre_deployment_template
            .as_deref()
            .filter(|p| p.is_file())
        {
            let deployment = Deployment::incremental(
                read_template_file(path)?,
                parameters_in_values_format(self.config.pre_deployment_parameters.clone()),
            );
            self.deploy(
                resource_manager,
                resource_group,
                &format!("pre-deploy-{uuid}"),
                &deployment,
            )?;
        }

        let password = parameters
            .get("adminPassword")
            .and_then(Value::as_str)
            .map(str::to_string);
        let deployment =
            Deployment::incremental(self.main_template()?, parameters_in_values_format(parameters));
        self.deploy(
            resource_manager,
            resource_group,
            &format!("deploy-{uuid}"),
            &deployment,
        )?;

        if self.config.store_deployment_credentials_in_state {
            state.store_credentials(
                &self.config.username,
                password.as_deref(),
                self.transport.uses_ssh_key(),
            );
        }

        if let Some(path) = self
            .config
            .post_deployment_template
            .as_deref()
            .filter(|p| p.is_file())
        {
            let deployment = Deployment::incremental(
                read_template_file(path)?,
                parameters_in_values_format(self.config.post_deployment_parameters.clone()),
            );
            self.deploy(
                resource_manager,
                resource_group,
                &format!("post-deploy-{uuid}"),
                &deployment,
            )?;
        }
        Ok(())
    }

    fn resolve_hostname<M: ResourceManager>(
        &self,
        resource_manager: &M,
        resource_group: &str,
        vm_name: &str,
    ) -> Result<String, DriverError> {
        if self.config.uses_public_ip() {
            let public_ip = resource_manager.get_public_ip(resource_group, PUBLIC_IP_NAME)?;
            info!(
                "IP Address is: {} [{}]",
                public_ip.ip_address().unwrap_or_default(),
                public_ip.fqdn().unwrap_or_default()
            );
            let hostname = if self.config.use_fqdn_hostname {
                info!("Using FQDN to communicate instead of IP");
                public_ip.fqdn()
            } else {
                public_ip.ip_address()
            };
            hostname
                .map(str::to_string)
                .ok_or_else(|| DriverError::MissingAddress(PUBLIC_IP_NAME.to_string()))
        } else {
            let nic = nic_name(&self.config, vm_name);
            let interface = resource_manager.get_network_interface(resource_group, &nic)?;
            let address = interface
                .private_ip_address()
                .ok_or_else(|| DriverError::MissingAddress(nic.clone()))?;
            info!("IP Address is: {address}");
            Ok(address.to_string())
        }
    }

    /// Fills the state with the names the instance will be created under. Applying it to an
    /// already prepared state changes nothing.
    pub fn prepare(&self, state: InstanceState) -> InstanceState {
        state.validate_state(&self.config, self.transport.uses_ssh_key(), Utc::now())
    }

    /// Provisions the instance and records how to reach it.
    pub fn create(&self, state: InstanceState) -> Result<InstanceState, DriverError> {
        let mut state = self.prepare(state);
        let parameters = deployment_parameters(&self.config, &state, &self.transport)?;

        let subscription_id = self
            .config
            .subscription_id
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or(DriverError::MissingSubscriptionId)?;
        let resource_group = state
            .azure_resource_group_name
            .clone()
            .ok_or(DriverError::IncompleteState("azure_resource_group_name"))?;
        let vm_name = state
            .vm_name
            .clone()
            .ok_or(DriverError::IncompleteState("vm_name"))?;

        debug!("Azure environment: {}", self.config.azure_environment);
        let resource_manager =
            self.resource_manager(subscription_id, self.config.azure_environment)?;

        info!("Creating Resource Group: {resource_group}");
        DeploymentSubmitter::new(&resource_manager)
            .ensure_resource_group(
                &resource_group,
                &self.resource_group(self.config.resource_group_tags.clone()),
            )
            .map_err(DriverError::from)
            .inspect_err(log_operation_error)?;

        match self.run_deployments(&resource_manager, &resource_group, &mut state, parameters) {
            Ok(()) => {}
            Err(err) if err.is_deployment_active() => {
                info!("Deployment for resource group {resource_group} is ongoing.");
                info!(
                    "If you need to change the deployment template you'll need to rerun `create` for this instance."
                );
            }
            Err(err) => {
                info!("{err}");
                log_operation_error(&err);
                return Err(err);
            }
        }

        state.hostname = Some(self.resolve_hostname(&resource_manager, &resource_group, &vm_name)?);
        Ok(state)
    }

    /// Removes the instance. Destroying an instance that was never created does nothing.
    pub fn destroy(&self, mut state: InstanceState) -> Result<InstanceState, DriverError> {
        let environment = *state
            .azure_environment
            .get_or_insert(self.config.azure_environment);
        if state.subscription_id.is_none() {
            state.subscription_id = self.config.subscription_id.clone();
        }

        if state.server_id.is_none()
            && state.azure_resource_group_name.is_none()
            && self.config.destroy_explicit_resource_group
        {
            if let Some(explicit) = &self.config.explicit_resource_group_name {
                let resource_manager =
                    self.resource_manager(subscription(&state)?, environment)?;
                let submitter = DeploymentSubmitter::new(&resource_manager);
                if submitter.resource_group_exists(explicit)? {
                    info!("This instance doesn't exist but you asked to delete the resource group.");
                    info!("Destroying Resource Group: {explicit}");
                    submitter
                        .delete_resource_group(explicit)
                        .map_err(DriverError::from)
                        .inspect_err(log_operation_error)?;
                    info!("Destroy operation accepted and will continue in the background.");
                    return Ok(state);
                }
            }
        }

        info!("Azure environment: {environment}");

        if state.server_id.is_none() {
            return Ok(state);
        }

        let resource_group = state
            .azure_resource_group_name
            .clone()
            .ok_or(DriverError::IncompleteState("azure_resource_group_name"))?;
        let resource_manager = self.resource_manager(subscription(&state)?, environment)?;
        let submitter = DeploymentSubmitter::new(&resource_manager);

        if self.config.destroy_resource_group_contents {
            info!("Destroying individual resources within the Resource Group.");
            let deployment = Deployment::wipe(self.renderer.render(EMPTY_TEMPLATE, &Value::Null)?);
            let uuid = state.uuid.clone().unwrap_or_default();
            self.deploy(
                &resource_manager,
                &resource_group,
                &format!("empty-deploy-{uuid}"),
                &deployment,
            )
            .inspect_err(log_operation_error)?;

            let tags = if self.config.destroy_explicit_resource_group_tags {
                warn!(
                    "The \"destroy_explicit_resource_group_tags\" setting value is set to \"true\". The tags on the resource group will be removed."
                );
                IndexMap::new()
            } else {
                warn!(
                    "The \"destroy_explicit_resource_group_tags\" setting value is set to \"false\". The tags on the resource group will NOT be removed."
                );
                self.config.resource_group_tags.clone()
            };
            submitter
                .ensure_resource_group(&resource_group, &self.resource_group(tags))
                .map_err(DriverError::from)
                .inspect_err(log_operation_error)?;
        }

        if !self.config.destroy_explicit_resource_group
            && self.config.explicit_resource_group_name.is_some()
        {
            warn!(
                "The \"destroy_explicit_resource_group\" setting value is set to \"false\". The resource group will not be deleted."
            );
            if !self.config.destroy_resource_group_contents {
                warn!(
                    "Remember to manually destroy resources, or set \"destroy_resource_group_contents: true\" to save costs!"
                );
            }
            return Ok(state);
        }

        info!("Destroying Resource Group: {resource_group}");
        submitter
            .delete_resource_group(&resource_group)
            .map_err(DriverError::from)
            .inspect_err(log_operation_error)?;
        info!("Destroy operation accepted and will continue in the background.");
        state.azure_resource_group_name = None;
        state.clear_server();

        Ok(state)
    }
}

fn subscription(state: &InstanceState) -> Result<&str, DriverError> {
    state
        .subscription_id
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or(DriverError::MissingSubscriptionId)
}
