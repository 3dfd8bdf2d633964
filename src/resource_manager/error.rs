use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::TokenRetrieverError;
use crate::http_client::HttpClientError;

/// Error code reported when a deployment with the same name is still running.
pub const DEPLOYMENT_ACTIVE_CODE: &str = "DeploymentActive";

#[derive(Error, Debug)]
pub enum ArmError {
    #[error("transport error: `{0}`")]
    Transport(#[from] HttpClientError),
    #[error("authenticating against azure: `{0}`")]
    Token(#[from] TokenRetrieverError),
    /// The Resource Manager rejected the request.
    #[error("azure operation error `{code}` (status {status}): {message}")]
    Operation {
        status: u16,
        code: String,
        message: String,
        body: Value,
    },
    #[error("error encoding request: `{0}`")]
    Encode(String),
    #[error("error decoding response: `{0}`")]
    Decode(String),
    #[error("giving up after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<ArmError>,
    },
}

impl ArmError {
    /// Timeouts and connection failures. Everything the provider answered is final.
    pub fn is_transient(&self) -> bool {
        matches!(self, ArmError::Transport(err) if err.is_transient())
    }

    pub fn is_deployment_active(&self) -> bool {
        matches!(self, ArmError::Operation { code, .. } if code == DEPLOYMENT_ACTIVE_CODE)
    }

    /// Short label used when reporting a retry.
    pub fn kind(&self) -> &'static str {
        match self {
            ArmError::Transport(err) => err.kind(),
            ArmError::Token(_) => "Authentication error",
            ArmError::Operation { .. } => "Operation error",
            ArmError::Encode(_) => "Encoding error",
            ArmError::Decode(_) => "Decoding error",
            ArmError::RetriesExhausted { .. } => "Retries exhausted",
        }
    }

    /// Error body returned by the provider, if any.
    pub fn body(&self) -> Option<&Value> {
        match self {
            ArmError::Operation { body, .. } => Some(body),
            ArmError::RetriesExhausted { source, .. } => source.body(),
            _ => None,
        }
    }

    /// Builds the error for an unsuccessful response from its status and body.
    pub fn from_response(status: u16, body: &[u8]) -> Self {
        #[derive(Deserialize)]
        struct ErrorEnvelope {
            error: ErrorDetail,
        }
        #[derive(Deserialize)]
        struct ErrorDetail {
            code: String,
            #[serde(default)]
            message: String,
        }

        let parsed: Option<Value> = serde_json::from_slice(body).ok();
        let detail = parsed
            .as_ref()
            .and_then(|v| ErrorEnvelope::deserialize(v).ok())
            .map(|e| e.error);

        match detail {
            Some(detail) => ArmError::Operation {
                status,
                code: detail.code,
                message: detail.message,
                body: parsed.unwrap_or(Value::Null),
            },
            None => {
                let text = String::from_utf8_lossy(body).to_string();
                ArmError::Operation {
                    status,
                    code: http::StatusCode::from_u16(status)
                        .ok()
                        .and_then(|s| s.canonical_reason())
                        .unwrap_or("Unknown")
                        .to_string(),
                    message: text.clone(),
                    body: parsed.unwrap_or(Value::String(text)),
                }
            }
        }
    }
}
