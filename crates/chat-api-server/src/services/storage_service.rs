use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::config::StorageConfig;

/// Narrow blob-storage contract: upload bytes, get a URL back; fetch bytes
/// by URL when an attachment is fed to the model.
#[derive(Clone)]
pub struct StorageService {
    client: Client,
    config: StorageConfig,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    url: String,
}

impl StorageService {
    pub fn new(config: StorageConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(60))
                .build()
                .unwrap_or_else(|_| Client::new()),
            config,
        }
    }

    pub async fn upload(&self, bytes: Vec<u8>, name: &str, mime_type: &str) -> Result<String> {
        let size = bytes.len();
        let response = self
            .client
            .post(format!("{}/upload", self.config.base_url))
            .query(&[("name", name), ("folder", self.config.folder.as_str())])
            .header(reqwest::header::CONTENT_TYPE, mime_type)
            .body(bytes)
            .send()
            .await
            .context("Failed to reach blob storage")?;

        if !response.status().is_success() {
            return Err(anyhow!("Blob upload failed: {}", response.status()));
        }

        let upload: UploadResponse = response
            .json()
            .await
            .context("Failed to parse upload response")?;

        debug!(name, size, "Uploaded blob");
        Ok(upload.url)
    }

    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to fetch blob")?;

        if !response.status().is_success() {
            return Err(anyhow!("Blob fetch failed: {}", response.status()));
        }

        Ok(response.bytes().await?.to_vec())
    }
}
