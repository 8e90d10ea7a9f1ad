use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::input::SelectedFile;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

pub const UPLOAD_PATH: &str = "/upload";
pub const CHAT_PATH: &str = "/chat";

/// The two calls the flows rely on. `HttpBackend` is the real one.
#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    async fn upload(&self, file: &SelectedFile, query: &str) -> Result<String, ApiError>;

    async fn chat(&self, query: &str) -> Result<String, ApiError>;
}

#[derive(Serialize, Debug)]
struct ChatRequest<'a> {
    query: &'a str,
}

#[derive(Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    config: ClientConfig,
}

impl HttpBackend {
    pub fn new(config: ClientConfig) -> Result<Self, ApiError> {
        let mut builder = reqwest::Client::builder().cookie_store(config.keep_session);
        if let Some(secs) = config.timeout_seconds {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder.build().map_err(ApiError::Client)?;

        Ok(Self { client, config })
    }

    async fn read_answer(resp: reqwest::Response) -> Result<String, ApiError> {
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status,
                body: body.trim().to_string(),
            });
        }

        let body = resp.text().await.map_err(ApiError::Transport)?;
        parse_answer(&body)
    }
}

#[async_trait]
impl AnalysisBackend for HttpBackend {
    async fn upload(&self, file: &SelectedFile, query: &str) -> Result<String, ApiError> {
        let bytes = tokio::fs::read(&file.path)
            .await
            .map_err(|source| ApiError::ReadFile {
                path: file.path.clone(),
                source,
            })?;
        let form = Form::new()
            .part("file", Part::bytes(bytes).file_name(file.file_name.clone()))
            .text("query", query.to_string());

        let resp = self
            .client
            .post(self.config.endpoint(UPLOAD_PATH))
            .header(ACCEPT, "application/json")
            .multipart(form)
            .send()
            .await
            .map_err(ApiError::Transport)?;

        Self::read_answer(resp).await
    }

    async fn chat(&self, query: &str) -> Result<String, ApiError> {
        let resp = self
            .client
            .post(self.config.endpoint(CHAT_PATH))
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .json(&ChatRequest { query })
            .send()
            .await
            .map_err(ApiError::Transport)?;

        Self::read_answer(resp).await
    }
}

/// The body must be a JSON object. Only `answer` is read; every other
/// field is ignored whatever its type.
fn parse_answer(body: &str) -> Result<String, ApiError> {
    let value: Value =
        serde_json::from_str(body).map_err(|err| ApiError::Decode(err.to_string()))?;
    let Value::Object(mut fields) = value else {
        return Err(ApiError::Decode(format!(
            "expected a JSON object, got: {}",
            body.trim()
        )));
    };
    if let Some(Value::String(status)) = fields.get("status") {
        tracing::debug!(status = status.as_str(), "backend status");
    }

    Ok(extract_answer(fields.remove("answer")))
}

/// A missing or null answer becomes an empty string; non-string values
/// are shown as their JSON text.
fn extract_answer(answer: Option<Value>) -> String {
    match answer {
        Some(Value::String(text)) => text,
        Some(Value::Null) | None => {
            tracing::warn!("response has no answer field");
            String::new()
        }
        Some(other) => other.to_string(),
    }
}
