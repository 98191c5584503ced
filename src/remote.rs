//! Remote conversion backend: a hosted RapidAPI service performs the extraction and hands back
//! a link to the finished file.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

use crate::{
    config::{RemoteConfig, RemoteDelivery},
    error::ConversionError,
    job::{ConversionResult, Converter, RemoteMetadata, validate_source_url},
};

#[derive(Debug, Deserialize)]
struct RemoteAudioPayload {
    title: Option<String>,
    download: Option<String>,
    duration: Option<serde_json::Value>,
    #[serde(rename = "type")]
    file_type: Option<serde_json::Value>,
    size: Option<serde_json::Value>,
}

pub struct RemoteConverter {
    http_client: reqwest::Client,
    endpoint: String,
    host: String,
    key: String,
    delivery: RemoteDelivery,
}

impl RemoteConverter {
    pub fn new(http_client: reqwest::Client, config: &RemoteConfig) -> Self {
        Self {
            http_client,
            endpoint: config.endpoint.clone(),
            host: config.host.clone(),
            key: config.key.clone(),
            delivery: config.delivery,
        }
    }

    pub fn from_config(config: &RemoteConfig) -> Result<Self, ConversionError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|error| {
                ConversionError::Internal(format!("could not build HTTP client: {error}"))
            })?;
        Ok(Self::new(http_client, config))
    }

    async fn fetch(&self, url: &str) -> Result<RemoteAudioPayload, ConversionError> {
        let response = self
            .http_client
            .get(&self.endpoint)
            .header("x-rapidapi-host", &self.host)
            .header("x-rapidapi-key", &self.key)
            .query(&[("url", url)])
            .send()
            .await
            .map_err(|error| {
                ConversionError::Internal(format!("conversion API request failed: {error}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Conversion API error {status}: {body}");
            return Err(ConversionError::UpstreamStatus(status));
        }

        response
            .json::<RemoteAudioPayload>()
            .await
            .map_err(|error| {
                ConversionError::Internal(format!("conversion API returned invalid JSON: {error}"))
            })
    }
}

#[async_trait]
impl Converter for RemoteConverter {
    fn name(&self) -> &'static str {
        "RapidAPI"
    }

    async fn convert(&self, url: &str) -> Result<ConversionResult, ConversionError> {
        let url = validate_source_url(url)?;
        info!("Conversion started for: {url}");

        let payload = self.fetch(url).await?;
        let Some(download_url) = payload
            .download
            .filter(|value| !value.trim().is_empty())
        else {
            warn!("No download URL found in conversion API response for {url}");
            return Err(ConversionError::MissingDownloadLink);
        };

        let title = payload
            .title
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| "Unknown".to_string());
        info!("Conversion successful for: {title}");

        Ok(match self.delivery {
            RemoteDelivery::Redirect => ConversionResult::Redirect(download_url),
            RemoteDelivery::Json => ConversionResult::Metadata(RemoteMetadata {
                success: true,
                title,
                file_type: payload.file_type,
                size: payload.size,
                download_url,
                duration: payload.duration,
            }),
        })
    }
}
