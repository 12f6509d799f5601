use std::time::Duration;

use async_trait::async_trait;
use picket_contracts::{CallbackError, PluginCallbacks};
use picket_model::{
    Acknowledgement, ArtifactReport, Configuration, IssueReport, Progress, ReportedError,
    SessionId,
};
use serde::Serialize;
use tracing::debug;

use super::RunnerError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// [`PluginCallbacks`] implementation that posts every report to the
/// session's report endpoints on the Plugin Service.
#[derive(Debug)]
pub struct HttpCallbacks {
    client: reqwest::Client,
    base_url: String,
    session_id: SessionId,
}

impl HttpCallbacks {
    pub fn new(base_url: impl Into<String>, session_id: SessionId) -> Result<Self, RunnerError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session_id,
        })
    }

    fn session_url(&self, tail: &str) -> String {
        format!("{}/session/{}/{}", self.base_url, self.session_id, tail)
    }

    /// Configuration the session was created with.
    pub async fn fetch_configuration(&self) -> Result<Configuration, RunnerError> {
        let response = self
            .client
            .get(self.session_url("configuration"))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(RunnerError::Rejected(format!(
                "configuration request returned {}",
                response.status()
            )));
        }
        Ok(response.json::<Configuration>().await?)
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        kind: &str,
        body: &B,
    ) -> Result<(), CallbackError> {
        let url = self.session_url(&format!("report/{kind}"));
        debug!(%url, "posting report");
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|err| CallbackError::Transport(err.to_string()))?;
        let status = response.status();
        let ack = response
            .json::<Acknowledgement>()
            .await
            .map_err(|err| CallbackError::Transport(err.to_string()))?;
        if ack.success {
            Ok(())
        } else {
            let reason = ack
                .error
                .map(|code| code.to_string())
                .unwrap_or_else(|| status.to_string());
            Err(CallbackError::Rejected(reason))
        }
    }
}

#[async_trait]
impl PluginCallbacks for HttpCallbacks {
    async fn report_progress(&self, progress: Progress) -> Result<(), CallbackError> {
        self.post("progress", &progress).await
    }

    async fn report_results(&self, issues: Vec<IssueReport>) -> Result<(), CallbackError> {
        self.post("results", &issues).await
    }

    async fn report_errors(&self, errors: Vec<ReportedError>) -> Result<(), CallbackError> {
        self.post("errors", &errors).await
    }

    async fn report_artifacts(&self, artifact: ArtifactReport) -> Result<(), CallbackError> {
        self.post("files", &[artifact]).await
    }

    async fn report_finish(&self) -> Result<(), CallbackError> {
        self.post("finish", &serde_json::json!({})).await
    }

    /// The runner turns an abort into its exit code; nothing is posted.
    async fn report_abort(&self, _exit_code: i32) -> Result<(), CallbackError> {
        Ok(())
    }
}
