//! Compute Engine v1 REST client
//!
//! Credentials are not acquired here; an already-minted bearer token can be
//! supplied through configuration.

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::{
    InstanceStatus, InstanceSummary, OperationHandle, OperationSnapshot, OperationStatus,
    ResourceClient,
};
use crate::{config::ComputeConfig, protocol::RpcError, Error, Result};

#[derive(Clone)]
pub struct GceClient {
    client: Client,
    base_url: Url,
    access_token: Option<String>,
    page_size: u32,
}

impl GceClient {
    pub fn new(config: &ComputeConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: Url::parse(&config.api_base)?,
            access_token: config.access_token.clone(),
            page_size: config.list_page_size,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Config(format!("cannot build URLs from {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn instances_url(&self, project: &str, zone: &str, tail: &[&str]) -> Result<Url> {
        let mut segments = vec!["projects", project, "zones", zone, "instances"];
        segments.extend_from_slice(tail);
        self.endpoint(&segments)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Response> {
        let request = match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let response = request.send().await?;
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status().as_u16();
        let body = response.text().await?;
        let message = serde_json::from_str::<ApiErrorBody>(&body)
            .map(|e| e.error.message)
            .unwrap_or(body);
        Err(Error::Provider { status, message })
    }

    async fn mutate(
        &self,
        project: &str,
        zone: &str,
        name: &str,
        verb: &str,
    ) -> Result<OperationHandle> {
        let url = self.instances_url(project, zone, &[name, verb])?;
        debug!("POST {}", url);

        let op: ApiOperation = self.send(self.client.post(url)).await?.json().await?;
        let snapshot = op.snapshot();
        let mut handle = OperationHandle::new(op.name, OperationStatus::Pending);
        handle.observe(&snapshot);
        Ok(handle)
    }
}

#[async_trait]
impl ResourceClient for GceClient {
    async fn list_instances(&self, project: &str, zone: &str) -> Result<Vec<InstanceSummary>> {
        let mut instances = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = self.instances_url(project, zone, &[])?;
            url.query_pairs_mut()
                .append_pair("maxResults", &self.page_size.to_string());
            if let Some(token) = &page_token {
                url.query_pairs_mut().append_pair("pageToken", token);
            }
            debug!("GET {}", url);

            let page: ApiInstanceList = self.send(self.client.get(url)).await?.json().await?;
            instances.extend(page.items.into_iter().map(|item| InstanceSummary {
                name: item.name,
                status: InstanceStatus::from(item.status.as_str()),
            }));

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(instances)
    }

    async fn start_instance(
        &self,
        project: &str,
        zone: &str,
        name: &str,
    ) -> Result<OperationHandle> {
        self.mutate(project, zone, name, "start").await
    }

    async fn stop_instance(
        &self,
        project: &str,
        zone: &str,
        name: &str,
    ) -> Result<OperationHandle> {
        self.mutate(project, zone, name, "stop").await
    }

    async fn get_operation(
        &self,
        project: &str,
        zone: &str,
        id: &str,
    ) -> Result<OperationSnapshot> {
        let url = self.endpoint(&["projects", project, "zones", zone, "operations", id])?;
        let op: ApiOperation = self.send(self.client.get(url)).await?.json().await?;
        Ok(op.snapshot())
    }

    async fn get_instance(
        &self,
        project: &str,
        zone: &str,
        name: &str,
    ) -> Result<InstanceStatus> {
        let url = self.instances_url(project, zone, &[name])?;
        let instance: ApiInstance = self.send(self.client.get(url)).await?.json().await?;
        Ok(InstanceStatus::from(instance.status.as_str()))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiInstanceList {
    #[serde(default)]
    items: Vec<ApiInstance>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiInstance {
    #[serde(default)]
    name: String,
    #[serde(default)]
    status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiOperation {
    name: String,
    status: OperationStatus,
    error: Option<ApiOperationError>,
    http_error_status_code: Option<i64>,
}

impl ApiOperation {
    fn snapshot(&self) -> OperationSnapshot {
        let error = self.error.as_ref().map(|e| {
            let message = e
                .errors
                .iter()
                .map(|detail| detail.message.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            RpcError {
                code: self.http_error_status_code.unwrap_or(0),
                message,
            }
        });

        OperationSnapshot {
            status: self.status,
            error,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiOperationError {
    #[serde(default)]
    errors: Vec<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorMessage,
}

#[derive(Debug, Deserialize)]
struct ApiErrorMessage {
    message: String,
}
