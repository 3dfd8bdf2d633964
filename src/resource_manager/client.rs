use http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderValue};
use http::{Method, Request, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use super::models::{DeploymentExtended, Page};
use super::{
    ArmError, DeploymentOperation, NETWORK_API_VERSION, NetworkInterface, PublicIpAddress,
    RESOURCES_API_VERSION, ResourceGroup, ResourceManager,
};
use crate::TokenRetriever;
use crate::deployment::{Deployment, ProvisioningState};
use crate::http_client::HttpClient;

/// Resource Manager client speaking the REST api of one subscription.
pub struct HttpResourceManager<C, T> {
    http_client: C,
    token_retriever: T,
    base_url: Url,
    subscription_id: String,
}

impl<C, T> HttpResourceManager<C, T>
where
    C: HttpClient,
    T: TokenRetriever,
{
    pub fn new(
        http_client: C,
        token_retriever: T,
        base_url: Url,
        subscription_id: impl Into<String>,
    ) -> Self {
        Self {
            http_client,
            token_retriever,
            base_url,
            subscription_id: subscription_id.into(),
        }
    }

    /// `{base}/subscriptions/{subscription}/{segments..}?api-version={api_version}`
    fn url(&self, segments: &[&str], api_version: &str) -> Result<Url, ArmError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ArmError::Encode(format!("invalid base url `{}`", self.base_url)))?
            .pop_if_empty()
            .extend(["subscriptions", self.subscription_id.as_str()])
            .extend(segments);
        url.query_pairs_mut()
            .clear()
            .append_pair("api-version", api_version);
        Ok(url)
    }

    fn resource_group_url(&self, name: &str) -> Result<Url, ArmError> {
        self.url(&["resourcegroups", name], RESOURCES_API_VERSION)
    }

    fn deployment_url(
        &self,
        resource_group: &str,
        deployment_name: &str,
        trailing: Option<&str>,
    ) -> Result<Url, ArmError> {
        let mut segments = vec![
            "resourcegroups",
            resource_group,
            "providers",
            "Microsoft.Resources",
            "deployments",
            deployment_name,
        ];
        segments.extend(trailing);
        self.url(&segments, RESOURCES_API_VERSION)
    }

    fn network_url(
        &self,
        resource_group: &str,
        resource_type: &str,
        name: &str,
    ) -> Result<Url, ArmError> {
        self.url(
            &[
                "resourcegroups",
                resource_group,
                "providers",
                "Microsoft.Network",
                resource_type,
                name,
            ],
            NETWORK_API_VERSION,
        )
    }

    /// Sends an authorized request without looking at the response status.
    fn execute(
        &self,
        method: Method,
        url: &Url,
        body: Option<Vec<u8>>,
    ) -> Result<Response<Vec<u8>>, ArmError> {
        let token = self.token_retriever.retrieve()?;
        let mut authorization = HeaderValue::from_str(&token.authorization_value())
            .map_err(|e| ArmError::Encode(e.to_string()))?;
        authorization.set_sensitive(true);

        let mut builder = Request::builder()
            .method(method.clone())
            .uri(url.as_str())
            .header(AUTHORIZATION, authorization)
            .header(ACCEPT, "application/json");
        if body.is_some() {
            builder = builder.header(CONTENT_TYPE, "application/json");
        }
        let request = builder
            .body(body.unwrap_or_default())
            .map_err(|e| ArmError::Encode(e.to_string()))?;

        debug!("{method} {url}");
        let response = self.http_client.send(request)?;
        debug!("{method} {url} answered {}", response.status());

        Ok(response)
    }

    /// Sends an authorized request and turns unsuccessful answers into errors.
    fn send(
        &self,
        method: Method,
        url: &Url,
        body: Option<Vec<u8>>,
    ) -> Result<Response<Vec<u8>>, ArmError> {
        let response = self.execute(method, url, body)?;
        if !response.status().is_success() {
            return Err(ArmError::from_response(
                response.status().as_u16(),
                response.body(),
            ));
        }
        Ok(response)
    }

    fn get<D: DeserializeOwned>(&self, url: &Url) -> Result<D, ArmError> {
        let response = self.send(Method::GET, url, None)?;
        decode(&response)
    }
}

fn decode<D: DeserializeOwned>(response: &Response<Vec<u8>>) -> Result<D, ArmError> {
    serde_json::from_slice(response.body()).map_err(|e| ArmError::Decode(e.to_string()))
}

fn encode<S: serde::Serialize>(payload: &S) -> Result<Vec<u8>, ArmError> {
    serde_json::to_vec(payload).map_err(|e| ArmError::Encode(e.to_string()))
}

impl<C, T> ResourceManager for HttpResourceManager<C, T>
where
    C: HttpClient,
    T: TokenRetriever,
{
    fn create_or_update_resource_group(
        &self,
        name: &str,
        group: &ResourceGroup,
    ) -> Result<ResourceGroup, ArmError> {
        let url = self.resource_group_url(name)?;
        let response = self.send(Method::PUT, &url, Some(encode(group)?))?;
        decode(&response)
    }

    fn resource_group_exists(&self, name: &str) -> Result<bool, ArmError> {
        let url = self.resource_group_url(name)?;
        let response = self.execute(Method::HEAD, &url, None)?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            status => Err(ArmError::from_response(status.as_u16(), response.body())),
        }
    }

    fn begin_delete_resource_group(&self, name: &str) -> Result<(), ArmError> {
        let url = self.resource_group_url(name)?;
        self.send(Method::DELETE, &url, None)?;
        Ok(())
    }

    fn begin_create_deployment(
        &self,
        resource_group: &str,
        deployment_name: &str,
        deployment: &Deployment,
    ) -> Result<(), ArmError> {
        let url = self.deployment_url(resource_group, deployment_name, None)?;
        self.send(Method::PUT, &url, Some(encode(deployment)?))?;
        Ok(())
    }

    fn get_deployment_state(
        &self,
        resource_group: &str,
        deployment_name: &str,
    ) -> Result<ProvisioningState, ArmError> {
        let url = self.deployment_url(resource_group, deployment_name, None)?;
        let deployment: DeploymentExtended = self.get(&url)?;
        Ok(deployment.properties.provisioning_state)
    }

    fn list_deployment_operations(
        &self,
        resource_group: &str,
        deployment_name: &str,
    ) -> Result<Vec<DeploymentOperation>, ArmError> {
        let mut url = self.deployment_url(resource_group, deployment_name, Some("operations"))?;
        let mut operations = Vec::new();
        loop {
            let page: Page<DeploymentOperation> = self.get(&url)?;
            operations.extend(page.value);
            match page.next_link {
                Some(next) if !next.is_empty() => {
                    url = Url::parse(&next).map_err(|e| ArmError::Decode(e.to_string()))?;
                }
                _ => break,
            }
        }
        Ok(operations)
    }

    fn get_public_ip(
        &self,
        resource_group: &str,
        name: &str,
    ) -> Result<PublicIpAddress, ArmError> {
        let url = self.network_url(resource_group, "publicIPAddresses", name)?;
        self.get(&url)
    }

    fn get_network_interface(
        &self,
        resource_group: &str,
        name: &str,
    ) -> Result<NetworkInterface, ArmError> {
        let url = self.network_url(resource_group, "networkInterfaces", name)?;
        self.get(&url)
    }
}
