// ABOUTME: reqwest implementation of CloudRunApi against the Cloud Run v1 admin API
// ABOUTME: Locations and IAM policies use the global endpoint, services the regional ones
use crate::models::{ApiErrorResponse, ListLocationsResponse, ListServicesResponse, Policy};
use crate::TokenProvider;
use async_trait::async_trait;
use iamviz_core::{
    member_identity, ApiConfig, CloudRunApi, IamVizError, Region, Result, Service,
};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::debug;

/// Cloud Run admin API client
pub struct CloudRunClient {
    http: Client,
    tokens: Arc<dyn TokenProvider>,
    config: ApiConfig,
}

impl CloudRunClient {
    pub fn new(config: ApiConfig, tokens: Arc<dyn TokenProvider>) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("cloudrun-iamviz/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| IamVizError::Api(format!("failed to initialize client: {}", e)))?;

        Ok(Self {
            http,
            tokens,
            config,
        })
    }

    fn base_url(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    fn regional_url(&self, region: &str) -> String {
        self.config
            .regional_url(region)
            .trim_end_matches('/')
            .to_string()
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        let token = self.tokens.access_token().await?;
        debug!("GET {}", url);

        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .query(query)
            .send()
            .await
            .map_err(|e| IamVizError::Api(format!("request to {} failed: {}", url, e)))?;

        let response = check_status(response).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| IamVizError::Api(format!("failed to parse response from {}: {}", url, e)))
    }
}

/// Turn a non-2xx response into an `IamVizError::Api`, preferring the
/// message from Google's error envelope.
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<ApiErrorResponse>(&body) {
        Ok(envelope) => match envelope.error.status {
            Some(code) => format!("{} ({})", envelope.error.message, code),
            None => envelope.error.message,
        },
        Err(_) if body.trim().is_empty() => "no response body".to_string(),
        Err(_) => body.trim().to_string(),
    };

    Err(IamVizError::Api(format!("HTTP {}: {}", status, message)))
}

#[async_trait]
impl CloudRunApi for CloudRunClient {
    async fn list_regions(&self, project: &str) -> Result<Vec<Region>> {
        let url = format!("{}/v1/projects/{}/locations", self.base_url(), project);
        let mut regions = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let query: Vec<(&str, &str)> = match page_token.as_deref() {
                Some(token) => vec![("pageToken", token)],
                None => Vec::new(),
            };
            let page: ListLocationsResponse = self.get_json(&url, &query).await?;

            regions.extend(
                page.locations
                    .into_iter()
                    .map(|loc| Region::new(loc.location_id, loc.display_name)),
            );

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        Ok(regions)
    }

    async fn list_services(&self, project: &str, region: &Region) -> Result<Vec<Service>> {
        let url = format!(
            "{}/apis/serving.knative.dev/v1/namespaces/{}/services",
            self.regional_url(&region.id),
            project
        );
        let mut services = Vec::new();
        let mut continue_token: Option<String> = None;

        loop {
            let query: Vec<(&str, &str)> = match continue_token.as_deref() {
                Some(token) => vec![("continue", token)],
                None => Vec::new(),
            };
            let page: ListServicesResponse = self.get_json(&url, &query).await?;

            services.extend(page.items.into_iter().map(|item| {
                let identity = item.service_account().to_string();
                Service {
                    namespace: if item.metadata.namespace.is_empty() {
                        project.to_string()
                    } else {
                        item.metadata.namespace
                    },
                    name: item.metadata.name,
                    region: region.clone(),
                    identity,
                }
            }));

            match page
                .metadata
                .and_then(|m| m.continue_token)
                .filter(|t| !t.is_empty())
            {
                Some(next) => continue_token = Some(next),
                None => break,
            }
        }

        Ok(services)
    }

    async fn get_invokers(&self, service: &Service) -> Result<Vec<String>> {
        let url = format!(
            "{}/v1/{}:getIamPolicy",
            self.base_url(),
            service.resource_name()
        );
        let policy: Policy = self.get_json(&url, &[]).await?;

        Ok(policy
            .bindings
            .iter()
            .filter(|binding| binding.role == self.config.invoker_role)
            .flat_map(|binding| binding.members.iter())
            .filter_map(|member| member_identity(member))
            .map(str::to_string)
            .collect())
    }
}
