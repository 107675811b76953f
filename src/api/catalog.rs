//! Static catalog lookups: models, tools, data sources, app and theme config.
//!
//! Every call is a single idempotent GET. Transport failures and non-success
//! statuses are reported to the caller; a body whose shape does not match is
//! treated as an empty catalog instead.

use serde::de::DeserializeOwned;
use tracing::debug;

use crate::api::{
    AppConfig, DataSourceInfo, DataSourcesResponse, ModelInfo, ModelsResponse, ThemeConfig,
    ToolInfo, ToolsResponse,
};
use crate::core::config::Endpoints;
use crate::core::error::ChatError;
use crate::utils::url::construct_api_url;

#[derive(Clone)]
pub struct CatalogClient {
    client: reqwest::Client,
    base_url: String,
    endpoints: Endpoints,
}

/// Everything the front-end shows in its pickers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    pub app: Option<AppConfig>,
    pub theme: Option<ThemeConfig>,
    pub models: Vec<ModelInfo>,
    pub tools: Vec<ToolInfo>,
    pub data_sources: Vec<DataSourceInfo>,
}

impl CatalogClient {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, endpoints: Endpoints) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            endpoints,
        }
    }

    /// GET `path` and decode it as `T`. `Ok(None)` means the body did not
    /// have the expected shape.
    async fn fetch<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, ChatError> {
        let url = construct_api_url(&self.base_url, path);
        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ChatError::Network(format!(
                "GET {path} failed with status {status}: {}",
                error_text.trim()
            )));
        }

        let body = response.bytes().await?;
        match serde_json::from_slice::<T>(&body) {
            Ok(value) => Ok(Some(value)),
            Err(err) => {
                debug!(path, error = %err, "Catalog response did not match the expected shape");
                Ok(None)
            }
        }
    }

    pub async fn models(&self) -> Result<Vec<ModelInfo>, ChatError> {
        Ok(self
            .fetch::<ModelsResponse>(&self.endpoints.models)
            .await?
            .map(ModelsResponse::into_models)
            .unwrap_or_default())
    }

    pub async fn tools(&self) -> Result<Vec<ToolInfo>, ChatError> {
        Ok(self
            .fetch::<ToolsResponse>(&self.endpoints.tools)
            .await?
            .map(|response| response.tools)
            .unwrap_or_default())
    }

    pub async fn data_sources(&self) -> Result<Vec<DataSourceInfo>, ChatError> {
        Ok(self
            .fetch::<DataSourcesResponse>(&self.endpoints.data_sources)
            .await?
            .map(|response| response.data_sources)
            .unwrap_or_default())
    }

    pub async fn app_config(&self) -> Result<Option<AppConfig>, ChatError> {
        self.fetch(&self.endpoints.app_config).await
    }

    pub async fn theme(&self) -> Result<Option<ThemeConfig>, ChatError> {
        self.fetch(&self.endpoints.theme).await
    }
}
