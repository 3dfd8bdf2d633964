pub mod secret;
pub mod store;

use std::env::{self, VarError};
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::authenticator::TokenRequest;
use crate::environment::{CloudEnvironment, EnvironmentProfile};
use secret::ClientSecret;
use store::CredentialStore;

pub const AZURE_CONFIG_FILE_ENV: &str = "AZURE_CONFIG_FILE";
pub const AZURE_TENANT_ID_ENV: &str = "AZURE_TENANT_ID";
pub const AZURE_CLIENT_ID_ENV: &str = "AZURE_CLIENT_ID";
pub const AZURE_CLIENT_SECRET_ENV: &str = "AZURE_CLIENT_SECRET";
pub const AZURE_SUBSCRIPTION_ID_ENV: &str = "AZURE_SUBSCRIPTION_ID";

/// Location of the credential file relative to the home directory.
const DEFAULT_CONFIG_PATH: &str = ".azure/credentials";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CredentialsError {
    #[error(
        "must provide tenant id. Use {env_var} environment variable or set it in credentials file {config_file}"
    )]
    MissingTenantId {
        env_var: &'static str,
        config_file: String,
    },
}

/// How tokens are obtained for the resolved identity.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenProvider {
    /// Client id and secret against the tenant's authority.
    ServicePrincipal {
        tenant_id: String,
        client_id: String,
        client_secret: ClientSecret,
    },
    /// Managed identity of the host, optionally a user assigned one selected by client id.
    ManagedIdentity { client_id: Option<String> },
}

/// Token credential handed to the Resource Manager client.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenCredentials {
    provider: TokenProvider,
    settings: ActiveDirectorySettings,
}

impl TokenCredentials {
    pub fn provider(&self) -> &TokenProvider {
        &self.provider
    }

    /// Request to send to the identity endpoint to obtain a Resource Manager token.
    pub fn token_request(&self) -> TokenRequest {
        match &self.provider {
            TokenProvider::ServicePrincipal {
                tenant_id,
                client_id,
                client_secret,
            } => TokenRequest::ClientCredentials {
                authority: self.settings.authentication_endpoint.to_string(),
                tenant_id: tenant_id.to_owned(),
                client_id: client_id.to_owned(),
                client_secret: client_secret.to_owned(),
                resource: self.settings.token_audience.to_string(),
            },
            TokenProvider::ManagedIdentity { client_id } => TokenRequest::ManagedIdentity {
                client_id: client_id.to_owned(),
                resource: self.settings.token_audience.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActiveDirectorySettings {
    pub authentication_endpoint: &'static str,
    pub token_audience: &'static str,
}

impl From<&EnvironmentProfile> for ActiveDirectorySettings {
    fn from(profile: &EnvironmentProfile) -> Self {
        Self {
            authentication_endpoint: profile.auth_endpoint,
            token_audience: profile.token_audience,
        }
    }
}

/// Everything needed to build an authenticated Resource Manager client.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AzureOptions {
    pub tenant_id: String,
    pub subscription_id: String,
    #[serde(skip)]
    pub credentials: TokenCredentials,
    pub active_directory_settings: ActiveDirectorySettings,
    pub base_url: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<ClientSecret>,
}

/// Resolves the identity used to talk to Azure.
///
/// Every field is looked up first in the environment and then in the section of the
/// credential file named after the subscription id.
pub struct AzureCredentials<E = fn(&str) -> Result<String, VarError>>
where
    E: Fn(&str) -> Result<String, VarError>,
{
    subscription_id: String,
    environment: CloudEnvironment,
    store: CredentialStore,
    env_var: E,
}

impl AzureCredentials {
    pub fn new(subscription_id: impl Into<String>, environment: CloudEnvironment) -> Self {
        Self::with_env_lookup(subscription_id, environment, |key| env::var(key))
    }
}

impl<E> AzureCredentials<E>
where
    E: Fn(&str) -> Result<String, VarError>,
{
    /// Builds the resolver reading variables through `env_var` instead of the process
    /// environment.
    pub fn with_env_lookup(
        subscription_id: impl Into<String>,
        environment: CloudEnvironment,
        env_var: E,
    ) -> Self {
        let path = env_var(AZURE_CONFIG_FILE_ENV)
            .ok()
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(default_config_path);

        Self {
            subscription_id: subscription_id.into(),
            environment,
            store: CredentialStore::new(path),
            env_var,
        }
    }

    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    pub fn environment(&self) -> CloudEnvironment {
        self.environment
    }

    pub fn azure_options(&self) -> Result<AzureOptions, CredentialsError> {
        let tenant_id = self.tenant_id()?;
        let client_id = self.lookup(AZURE_CLIENT_ID_ENV, "client_id");
        let client_secret = self
            .lookup(AZURE_CLIENT_SECRET_ENV, "client_secret")
            .map(ClientSecret::from);

        let profile = self.environment.profile();
        let settings = ActiveDirectorySettings::from(profile);

        let provider = match (&client_id, &client_secret) {
            (Some(client_id), Some(client_secret)) => TokenProvider::ServicePrincipal {
                tenant_id: tenant_id.to_owned(),
                client_id: client_id.to_owned(),
                client_secret: client_secret.to_owned(),
            },
            (Some(client_id), None) => TokenProvider::ManagedIdentity {
                client_id: Some(client_id.to_owned()),
            },
            // A secret is meaningless without the client it belongs to.
            (None, _) => TokenProvider::ManagedIdentity { client_id: None },
        };
        debug!(
            "resolved azure credentials for subscription {} in {}: {:?}",
            self.subscription_id, self.environment, provider
        );

        Ok(AzureOptions {
            tenant_id,
            subscription_id: self.subscription_id.to_owned(),
            credentials: TokenCredentials {
                provider,
                settings: settings.clone(),
            },
            active_directory_settings: settings,
            base_url: profile.resource_manager_base_url,
            client_id,
            client_secret,
        })
    }

    fn tenant_id(&self) -> Result<String, CredentialsError> {
        self.lookup(AZURE_TENANT_ID_ENV, "tenant_id")
            .ok_or_else(|| CredentialsError::MissingTenantId {
                env_var: AZURE_TENANT_ID_ENV,
                config_file: self.store.path().display().to_string(),
            })
    }

    fn lookup(&self, env_name: &str, property: &str) -> Option<String> {
        (self.env_var)(env_name)
            .ok()
            .filter(|v| !v.is_empty())
            .or_else(|| self.store.property(&self.subscription_id, property))
    }
}

fn default_config_path() -> PathBuf {
    dirs::home_dir().unwrap_or_default().join(DEFAULT_CONFIG_PATH)
}
