use reqwest::StatusCode;
use std::path::PathBuf;
use thiserror::Error;

/// Failures talking to the analysis service.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("cannot build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("cannot read {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("unreadable response body: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn is_connection_refused(&self) -> bool {
        match self {
            Self::Transport(err) => err.is_connect(),
            _ => false,
        }
    }
}

/// Failures of the upload and chat flows, caught at the flow boundary.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("no file selected")]
    MissingFile,

    #[error("upload failed: {0}")]
    UploadRequest(#[source] ApiError),

    #[error("chat failed: {0}")]
    ChatRequest(#[source] ApiError),
}

impl FlowError {
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            Self::MissingFile => None,
            Self::UploadRequest(err) | Self::ChatRequest(err) => Some(err),
        }
    }
}
