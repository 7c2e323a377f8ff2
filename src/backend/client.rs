//! HTTP client for the VoiceForge backend.
//!
//! No session awareness. Just the three REST calls a session needs.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};

use super::{Backend, BackendError, ProjectContext, RunResult, SessionTarget};
use crate::config::SessionConfig;
use crate::session::editor::{EditorState, Language};

/// Record shape returned by `GET /projects/{id}` and `GET /learn-books/{id}`.
#[derive(Debug, Deserialize)]
struct RecordResponse {
    id: String,
    name: String,
    language: Option<Language>,
    code: Option<String>,
}

#[derive(Debug, Serialize)]
struct RecordUpdate<'a> {
    code: &'a str,
    language: Language,
}

#[derive(Debug, Serialize)]
struct RunRequest<'a> {
    code: &'a str,
}

/// reqwest-backed `Backend`.
#[derive(Debug)]
pub struct HttpBackend {
    http: Client,
    base_url: String,
    access_token: Option<String>,
}

impl HttpBackend {
    /// Create a client against `base_url` (no trailing slash needed).
    pub fn new(base_url: impl Into<String>, access_token: Option<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token,
        }
    }

    /// Build from session configuration.
    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(config.backend_url.clone(), config.access_token.clone())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Map non-success statuses to `BackendError`.
    async fn check(response: Response, what: &str) -> Result<Response, BackendError> {
        let status = response.status().as_u16();
        if status == 404 {
            return Err(BackendError::NotFound(what.to_string()));
        }
        if status >= 400 {
            let body = response.text().await.unwrap_or_else(|_| "(no body)".into());
            return Err(BackendError::ApiError {
                status,
                message: body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn load(&self, target: &SessionTarget) -> Result<ProjectContext, BackendError> {
        let response = self
            .authorize(self.http.get(self.url(&target.path())))
            .send()
            .await?;
        let response = Self::check(response, &target.to_string()).await?;

        let record: RecordResponse = response
            .json()
            .await
            .map_err(|e| BackendError::InvalidResponse(format!("failed to parse record: {e}")))?;

        Ok(ProjectContext {
            id: record.id,
            name: record.name,
            language: record.language.unwrap_or_default(),
            code: record.code.unwrap_or_default(),
        })
    }

    async fn save(&self, target: &SessionTarget, state: &EditorState) -> Result<(), BackendError> {
        let body = RecordUpdate {
            code: &state.code,
            language: state.language,
        };
        let response = self
            .authorize(self.http.put(self.url(&target.path())))
            .json(&body)
            .send()
            .await?;
        Self::check(response, &target.to_string()).await?;
        Ok(())
    }

    async fn run(&self, code: &str) -> Result<RunResult, BackendError> {
        let response = self
            .authorize(self.http.post(self.url("/ai/run")))
            .json(&RunRequest { code })
            .send()
            .await?;
        let response = Self::check(response, "run endpoint").await?;

        response
            .json()
            .await
            .map_err(|e| BackendError::InvalidResponse(format!("failed to parse run result: {e}")))
    }
}
