// SPDX-License-Identifier: MIT
//! HTTP client for the external collaborators: the task store and the AI
//! parsing service.
//!
//! The rest of the crate talks to [`TaskBackend`] / [`AiBackend`] traits, so
//! tests inject in-memory fakes and the arbiter/mutation manager never see a
//! socket. [`ApiClient`] is the real implementation over reqwest.
//!
//! Credentials are not stored here: a [`CredentialProvider`] supplies the
//! current bearer token per request, and logout is handled upstream by the
//! store (full cache clear) — this layer just stops getting tokens.

pub mod autocomplete;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::model::{NewTask, TaskId, TaskPatch, TaskRecord};
use crate::suggest::{AiHealth, ParseContext, ParseResponse, SuggestionEnvelope};

// ─── Seams ───────────────────────────────────────────────────────────────────

/// Supplies the bearer credential attached to every request. Owned by an
/// external collaborator (session bootstrap); `None` means logged out.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn bearer_token(&self) -> Option<String>;
}

/// The task store contract (`/tasks/`).
#[async_trait]
pub trait TaskBackend: Send + Sync {
    async fn list_tasks(&self) -> Result<Vec<TaskRecord>, SyncError>;
    async fn get_task(&self, id: TaskId) -> Result<TaskRecord, SyncError>;
    async fn create_task(&self, new: &NewTask) -> Result<TaskRecord, SyncError>;
    async fn update_task(&self, id: TaskId, patch: &TaskPatch) -> Result<TaskRecord, SyncError>;
    async fn delete_task(&self, id: TaskId) -> Result<(), SyncError>;
}

/// The AI collaborator contract (`/ai/`).
#[async_trait]
pub trait AiBackend: Send + Sync {
    async fn parse_task(
        &self,
        input: &str,
        context: Option<&ParseContext>,
    ) -> Result<ParseResponse, SyncError>;
    async fn suggest_improvements(
        &self,
        task_id: TaskId,
        input: Option<&str>,
    ) -> Result<Vec<SuggestionEnvelope>, SyncError>;
    async fn autocomplete(&self, input: &str) -> Result<Vec<String>, SyncError>;
    async fn health(&self) -> Result<AiHealth, SyncError>;
}

// ─── Wire helpers ────────────────────────────────────────────────────────────

/// `GET /tasks/` answers either a bare array or `{items: [...]}` depending
/// on server version. Accept both transparently.
#[derive(Deserialize)]
#[serde(untagged)]
enum TaskListBody {
    Wrapped { items: Vec<TaskRecord> },
    Bare(Vec<TaskRecord>),
}

impl TaskListBody {
    fn into_tasks(self) -> Vec<TaskRecord> {
        match self {
            TaskListBody::Wrapped { items } => items,
            TaskListBody::Bare(tasks) => tasks,
        }
    }
}

#[derive(Serialize)]
struct ParseTaskBody<'a> {
    input: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<&'a ParseContext>,
}

// ─── ApiClient ───────────────────────────────────────────────────────────────

/// reqwest-backed implementation of both backend traits.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    credentials: Arc<dyn CredentialProvider>,
}

impl ApiClient {
    /// Build a client with the configured per-request timeout. A timeout is
    /// surfaced as a plain transport failure like any other.
    pub fn new(
        config: &SyncConfig,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self, SyncError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            http,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            credentials,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.credentials.bearer_token().await {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Map HTTP status onto the error taxonomy: 5xx is transport (transient,
    /// retryable), anything else non-2xx is a rejection.
    async fn checked(response: reqwest::Response) -> Result<reqwest::Response, SyncError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        if status.is_server_error() {
            Err(SyncError::Transport(format!("{status}: {body}")))
        } else {
            Err(SyncError::Rejected(format!("{status}: {body}")))
        }
    }
}

#[async_trait]
impl TaskBackend for ApiClient {
    async fn list_tasks(&self) -> Result<Vec<TaskRecord>, SyncError> {
        let request = self.authed(self.http.get(self.url("/tasks/"))).await;
        let response = Self::checked(request.send().await?).await?;
        let body: TaskListBody = response.json().await?;
        let tasks = body.into_tasks();
        debug!(count = tasks.len(), "task list fetched");
        Ok(tasks)
    }

    async fn get_task(&self, id: TaskId) -> Result<TaskRecord, SyncError> {
        let request = self.authed(self.http.get(self.url(&format!("/tasks/{id}")))).await;
        let response = Self::checked(request.send().await?).await?;
        Ok(response.json().await?)
    }

    async fn create_task(&self, new: &NewTask) -> Result<TaskRecord, SyncError> {
        let request = self
            .authed(self.http.post(self.url("/tasks/")).json(new))
            .await;
        let response = Self::checked(request.send().await?).await?;
        Ok(response.json().await?)
    }

    async fn update_task(&self, id: TaskId, patch: &TaskPatch) -> Result<TaskRecord, SyncError> {
        let request = self
            .authed(self.http.put(self.url(&format!("/tasks/{id}"))).json(patch))
            .await;
        let response = Self::checked(request.send().await?).await?;
        Ok(response.json().await?)
    }

    async fn delete_task(&self, id: TaskId) -> Result<(), SyncError> {
        let request = self
            .authed(self.http.delete(self.url(&format!("/tasks/{id}"))))
            .await;
        Self::checked(request.send().await?).await?;
        Ok(())
    }
}

#[async_trait]
impl AiBackend for ApiClient {
    async fn parse_task(
        &self,
        input: &str,
        context: Option<&ParseContext>,
    ) -> Result<ParseResponse, SyncError> {
        let body = ParseTaskBody { input, context };
        let request = self
            .authed(self.http.post(self.url("/ai/parse-task")).json(&body))
            .await;
        let response = Self::checked(request.send().await?).await?;
        Ok(response.json().await?)
    }

    async fn suggest_improvements(
        &self,
        task_id: TaskId,
        input: Option<&str>,
    ) -> Result<Vec<SuggestionEnvelope>, SyncError> {
        let mut request = self
            .http
            .get(self.url(&format!("/ai/suggest-improvements/{task_id}")));
        if let Some(input) = input {
            request = request.query(&[("input", input)]);
        }
        let response = Self::checked(self.authed(request).await.send().await?).await?;
        Ok(response.json().await?)
    }

    async fn autocomplete(&self, input: &str) -> Result<Vec<String>, SyncError> {
        let request = self
            .authed(
                self.http
                    .get(self.url("/ai/autocomplete"))
                    .query(&[("input", input)]),
            )
            .await;
        let response = Self::checked(request.send().await?).await?;
        Ok(response.json().await?)
    }

    async fn health(&self) -> Result<AiHealth, SyncError> {
        let request = self.authed(self.http.get(self.url("/ai/health"))).await;
        let response = Self::checked(request.send().await?).await?;
        Ok(response.json().await?)
    }
}
