//! The Task Engine's view of the Plugin Service control API.

use std::time::Duration;

use async_trait::async_trait;
use picket_model::{
    Acknowledgement, ApiResponse, Configuration, ErrorCode, FileId, Issue,
    PluginSessionSummary, SessionBody, SessionCommand, SessionId, SessionResultsBody,
};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::trace;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("plugin service request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("plugin service answered {0}")]
    Rejected(ErrorCode),

    #[error("plugin service answered with status {0}")]
    Status(StatusCode),

    #[error("plugin service returned an empty payload")]
    EmptyPayload,
}

pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Control calls the coordinator makes against the Plugin Service.
#[async_trait]
pub trait PluginServiceApi: Send + Sync + std::fmt::Debug {
    async fn create_session(
        &self,
        plugin_name: &str,
        configuration: &Configuration,
    ) -> ClientResult<PluginSessionSummary>;

    async fn get_session(&self, id: SessionId) -> ClientResult<PluginSessionSummary>;

    async fn change_state(&self, id: SessionId, command: SessionCommand) -> ClientResult<()>;

    async fn results(&self, id: SessionId) -> ClientResult<Vec<Issue>>;

    async fn file(&self, id: SessionId, file: FileId) -> ClientResult<Vec<u8>>;
}

/// [`PluginServiceApi`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpPluginServiceClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpPluginServiceClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> ClientResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn acknowledged(response: reqwest::Response) -> ClientResult<()> {
        let status = response.status();
        let body = response.bytes().await?;
        match serde_json::from_slice::<Acknowledgement>(&body) {
            Ok(Acknowledgement { success: true, .. }) => Ok(()),
            Ok(Acknowledgement { error: Some(code), .. }) => Err(ClientError::Rejected(code)),
            _ => Err(ClientError::Status(status)),
        }
    }

    async fn envelope<T: DeserializeOwned>(response: reqwest::Response) -> ClientResult<T> {
        let status = response.status();
        let body = response.bytes().await?;
        match serde_json::from_slice::<ApiResponse<T>>(&body) {
            Ok(ApiResponse {
                success: true,
                data: Some(data),
                ..
            }) => Ok(data),
            Ok(ApiResponse { success: true, .. }) => Err(ClientError::EmptyPayload),
            Ok(ApiResponse { error: Some(code), .. }) => Err(ClientError::Rejected(code)),
            _ => Err(ClientError::Status(status)),
        }
    }
}

#[async_trait]
impl PluginServiceApi for HttpPluginServiceClient {
    async fn create_session(
        &self,
        plugin_name: &str,
        configuration: &Configuration,
    ) -> ClientResult<PluginSessionSummary> {
        let response = self
            .client
            .put(self.url(&format!("/session/create/{plugin_name}")))
            .json(configuration)
            .send()
            .await?;
        let body: SessionBody = Self::envelope(response).await?;
        Ok(body.session)
    }

    async fn get_session(&self, id: SessionId) -> ClientResult<PluginSessionSummary> {
        let response = self.client.get(self.url(&format!("/session/{id}"))).send().await?;
        let body: SessionBody = Self::envelope(response).await?;
        Ok(body.session)
    }

    async fn change_state(&self, id: SessionId, command: SessionCommand) -> ClientResult<()> {
        trace!(session_id = %id, ?command, "changing plugin session state");
        let response = self
            .client
            .put(self.url(&format!("/session/{id}/state")))
            .json(&command)
            .send()
            .await?;
        Self::acknowledged(response).await
    }

    async fn results(&self, id: SessionId) -> ClientResult<Vec<Issue>> {
        let response = self
            .client
            .get(self.url(&format!("/session/{id}/results")))
            .send()
            .await?;
        let body: SessionResultsBody = Self::envelope(response).await?;
        Ok(body.issues)
    }

    async fn file(&self, id: SessionId, file: FileId) -> ClientResult<Vec<u8>> {
        let response = self
            .client
            .get(self.url(&format!("/session/{id}/file/{file}")))
            .send()
            .await?;
        if response.status().is_success() {
            return Ok(response.bytes().await?.to_vec());
        }
        Self::acknowledged(response).await?;
        Err(ClientError::EmptyPayload)
    }
}
