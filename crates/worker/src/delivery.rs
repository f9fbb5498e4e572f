//! HTTP client for the front door: input fetch and result delivery.
//!
//! Delivery is fire-and-forget. Each artifact gets exactly one attempt; a
//! failure is returned to the caller, which logs it and moves on. A task
//! whose log never arrives stays in progress from the poller's view.

use std::time::Duration;

use advex_core::artifacts::{self, ArtifactKind};
use advex_core::task_id::TaskId;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};

/// Name of the multipart field carrying the artifact.
pub const UPLOAD_FIELD: &str = "data";

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// Network, DNS, timeout or body errors.
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The front door answered with a non-2xx status.
    #[error("Front door returned HTTP {0}")]
    HttpStatus(u16),
}

// ---------------------------------------------------------------------------
// FrontDoor
// ---------------------------------------------------------------------------

/// What a worker needs from the front door.
#[async_trait]
pub trait FrontDoor: Send + Sync {
    /// Download the normalised input image `{id}.png`.
    async fn fetch_input(&self, task_id: &TaskId) -> Result<Vec<u8>, DeliveryError>;

    /// Upload one artifact to the result receiver.
    async fn deliver(
        &self,
        kind: ArtifactKind,
        task_id: &TaskId,
        bytes: Vec<u8>,
    ) -> Result<(), DeliveryError>;
}

/// [`FrontDoor`] over HTTP.
#[derive(Debug, Clone)]
pub struct ResultCallbackClient {
    client: reqwest::Client,
    base_url: String,
    upload_url: String,
}

impl ResultCallbackClient {
    /// `base_url` is the front door root; `upload_path` the receiver's
    /// path segment.
    pub fn new(base_url: &str, upload_path: &str, timeout: Duration) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let base_url = base_url.trim_end_matches('/').to_string();
        let upload_url = format!("{base_url}/{}", upload_path.trim_matches('/'));
        Ok(Self {
            client,
            base_url,
            upload_url,
        })
    }

    pub fn upload_url(&self) -> &str {
        &self.upload_url
    }

    pub fn input_url(&self, task_id: &TaskId) -> String {
        format!(
            "{}/static/{}",
            self.base_url,
            artifacts::filename(task_id, ArtifactKind::Input)
        )
    }
}

#[async_trait]
impl FrontDoor for ResultCallbackClient {
    async fn fetch_input(&self, task_id: &TaskId) -> Result<Vec<u8>, DeliveryError> {
        let response = self.client.get(self.input_url(task_id)).send().await?;
        if !response.status().is_success() {
            return Err(DeliveryError::HttpStatus(response.status().as_u16()));
        }
        Ok(response.bytes().await?.to_vec())
    }

    async fn deliver(
        &self,
        kind: ArtifactKind,
        task_id: &TaskId,
        bytes: Vec<u8>,
    ) -> Result<(), DeliveryError> {
        let part = Part::bytes(bytes)
            .file_name(artifacts::filename(task_id, kind))
            .mime_str(kind.content_type())?;
        let form = Form::new().part(UPLOAD_FIELD, part);

        let response = self
            .client
            .post(&self.upload_url)
            .multipart(form)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(DeliveryError::HttpStatus(response.status().as_u16()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
