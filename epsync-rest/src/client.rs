//! [`EndpointClient`] over the Azure DevOps service endpoint REST API.

use std::time::Duration;

use async_trait::async_trait;
use epsync_core::model::{DataSourceDetails, EndpointDetails};
use epsync_core::{
    ClientError, ClientResult, EndpointClient, EndpointId, EndpointType, ProbeRequest,
    ProbeResult, ScopeId, ServiceEndpoint,
};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{RestError, Result};

pub const DEFAULT_API_VERSION: &str = "7.1";

/// Connection settings.
#[derive(Debug, Clone)]
pub struct RestConfig {
    /// Organization url, e.g. `https://dev.azure.com/contoso`.
    pub org_url: String,
    /// Personal access token. Sent as basic auth with an empty user.
    pub token: Option<String>,
    pub api_version: String,
    /// Per request timeout.
    pub request_timeout: Duration,
}

impl RestConfig {
    pub fn new(org_url: impl Into<String>) -> Self {
        Self {
            org_url: org_url.into(),
            token: None,
            api_version: DEFAULT_API_VERSION.to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

/// `{count, value}` envelope of list responses.
#[derive(Debug, Deserialize)]
struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProxyRequest<'a> {
    service_endpoint_details: &'a EndpointDetails,
    data_source_details: &'a DataSourceDetails,
    result_transformation_details: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// REST implementation of [`EndpointClient`].
pub struct RestClient {
    http: reqwest::Client,
    org_url: String,
    token: Option<String>,
    api_version: String,
}

impl RestClient {
    pub fn new(config: &RestConfig) -> Result<Self> {
        let org_url = config.org_url.trim_end_matches('/').to_string();
        if !(org_url.starts_with("http://") || org_url.starts_with("https://")) {
            return Err(RestError::InvalidUrl(config.org_url.clone()));
        }
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("epsync/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            org_url,
            token: config.token.clone(),
            api_version: config.api_version.clone(),
        })
    }

    fn url(&self, scope_id: Option<&ScopeId>, path: &str) -> String {
        match scope_id {
            Some(scope_id) => {
                format!("{}/{}/_apis/serviceendpoint/{}", self.org_url, scope_id, path)
            }
            None => format!("{}/_apis/serviceendpoint/{}", self.org_url, path),
        }
    }

    fn request(&self, method: Method, url: String) -> RequestBuilder {
        let request = self
            .http
            .request(method, url)
            .query(&[("api-version", self.api_version.as_str())]);
        match &self.token {
            Some(token) => request.basic_auth("", Some(token)),
            None => request,
        }
    }

    /// Send a request and decode the body. An empty or `null` body is `None`.
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> ClientResult<Option<T>> {
        let response = request.send().await.map_err(transport)?;
        let status = response.status();
        let url = response.url().path().to_string();
        let body = response.text().await.map_err(transport)?;
        debug!(%status, %url, bytes = body.len(), "Service endpoint API response");

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorBody>(&body)
                .ok()
                .and_then(|e| e.message)
                .unwrap_or(body);
            return Err(match status {
                StatusCode::NOT_FOUND => ClientError::NotFound(message),
                _ => ClientError::Transport(format!("{}: {}", status, message)),
            });
        }

        let body = body.trim();
        if body.is_empty() || body == "null" {
            return Ok(None);
        }
        serde_json::from_str(body)
            .map(Some)
            .map_err(|e| ClientError::Transport(format!("decoding response from {}: {}", url, e)))
    }
}

fn transport(e: reqwest::Error) -> ClientError {
    ClientError::Transport(e.to_string())
}

fn required<T>(value: Option<T>, what: &str) -> ClientResult<T> {
    value.ok_or_else(|| ClientError::Transport(format!("empty response to {}", what)))
}

#[async_trait]
impl EndpointClient for RestClient {
    async fn create(&self, endpoint: &ServiceEndpoint) -> ClientResult<ServiceEndpoint> {
        let url = self.url(None, "endpoints");
        let created = self.send(self.request(Method::POST, url).json(endpoint)).await?;
        required(created, "create")
    }

    async fn get(&self, id: &EndpointId, scope_id: &ScopeId) -> ClientResult<ServiceEndpoint> {
        let url = self.url(Some(scope_id), &format!("endpoints/{}", id));
        // the service answers 200 with an empty body for unknown ids
        self.send(self.request(Method::GET, url)).await?.ok_or_else(|| {
            ClientError::NotFound(format!("service endpoint {} in {}", id, scope_id))
        })
    }

    async fn get_by_name(
        &self,
        scope_id: &ScopeId,
        name: &str,
    ) -> ClientResult<Vec<ServiceEndpoint>> {
        let url = self.url(Some(scope_id), "endpoints");
        let request = self
            .request(Method::GET, url)
            .query(&[("endpointNames", name)]);
        let listed: Option<ListResponse<ServiceEndpoint>> = self.send(request).await?;
        Ok(listed.map(|l| l.value).unwrap_or_default())
    }

    async fn update(
        &self,
        id: &EndpointId,
        endpoint: &ServiceEndpoint,
    ) -> ClientResult<ServiceEndpoint> {
        let url = self.url(None, &format!("endpoints/{}", id));
        let updated = self.send(self.request(Method::PUT, url).json(endpoint)).await?;
        required(updated, "update")
    }

    async fn delete(&self, id: &EndpointId, scope_ids: &[ScopeId]) -> ClientResult<()> {
        let url = self.url(None, &format!("endpoints/{}", id));
        let project_ids = scope_ids
            .iter()
            .map(ScopeId::as_str)
            .collect::<Vec<_>>()
            .join(",");
        let request = self
            .request(Method::DELETE, url)
            .query(&[("projectIds", project_ids.as_str())]);
        self.send::<serde_json::Value>(request).await?;
        Ok(())
    }

    async fn execute_probe(&self, request: &ProbeRequest) -> ClientResult<ProbeResult> {
        let url = self.url(Some(&request.scope_id), "endpointproxy");
        let body = ProxyRequest {
            service_endpoint_details: &request.details,
            data_source_details: &request.data_source,
            result_transformation_details: serde_json::json!({}),
        };
        let mut builder = self.request(Method::POST, url).json(&body);
        if let Some(id) = &request.endpoint_id {
            builder = builder.query(&[("endpointId", id.as_str())]);
        }
        let result = self.send(builder).await?;
        required(result, "endpoint proxy")
    }

    async fn list_types(&self) -> ClientResult<Vec<EndpointType>> {
        let url = self.url(None, "types");
        let listed: Option<ListResponse<EndpointType>> =
            self.send(self.request(Method::GET, url)).await?;
        Ok(listed.map(|l| l.value).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_url_without_scheme() {
        let err = RestClient::new(&RestConfig::new("dev.azure.com/contoso")).err().unwrap();
        assert!(matches!(err, RestError::InvalidUrl(_)));
    }

    #[test]
    fn test_urls() {
        let client = RestClient::new(&RestConfig::new("https://dev.azure.com/contoso/")).unwrap();
        assert_eq!(
            client.url(None, "endpoints"),
            "https://dev.azure.com/contoso/_apis/serviceendpoint/endpoints"
        );
        assert_eq!(
            client.url(Some(&ScopeId::new("p1")), "endpoints/e1"),
            "https://dev.azure.com/contoso/p1/_apis/serviceendpoint/endpoints/e1"
        );
    }

    #[test]
    fn test_proxy_request_shape() {
        let endpoint = ServiceEndpoint {
            id: Some(EndpointId::new("e1")),
            endpoint_type: "generic".to_string(),
            url: Some("https://svc".to_string()),
            ..Default::default()
        };
        let probe = ProbeRequest::test_connection(&endpoint, ScopeId::new("p1"));
        let body = ProxyRequest {
            service_endpoint_details: &probe.details,
            data_source_details: &probe.data_source,
            result_transformation_details: serde_json::json!({}),
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["serviceEndpointDetails"]["type"], "generic");
        assert_eq!(value["serviceEndpointDetails"]["url"], "https://svc");
        assert_eq!(value["dataSourceDetails"]["dataSourceName"], "TestConnection");
        assert!(value["resultTransformationDetails"].is_object());
    }
}
