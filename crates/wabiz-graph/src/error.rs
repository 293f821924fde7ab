use thiserror::Error;

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Provider request timed out")]
    Timeout,

    /// Non-2xx answer. `message` is the provider's own `error.message`.
    #[error("{message}")]
    Api { status: u16, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Missing field in provider response: {0}")]
    MissingField(&'static str),

    #[error("Invalid media: {0}")]
    InvalidMedia(String),
}

impl GraphError {
    /// Builds an [`GraphError::Api`] from a Graph error body,
    /// `{"error": {"message": ..., "code": ...}}`.
    pub fn from_response(status: u16, body: &str) -> Self {
        let message = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
            .unwrap_or_else(|| {
                let snippet: String = body.chars().take(200).collect();
                if snippet.is_empty() {
                    format!("Provider returned HTTP {status}")
                } else {
                    snippet
                }
            });
        GraphError::Api { status, message }
    }
}

pub type Result<T> = std::result::Result<T, GraphError>;
