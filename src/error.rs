use thiserror::Error;

#[derive(Debug, Error)]
pub enum Banana3dError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("HTTP request to {service} failed: {source}")]
    Http {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{service} returned {status}: {body}")]
    Upstream {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("Unexpected response from {service}: {reason}")]
    UnexpectedResponse { service: &'static str, reason: String },

    #[error("{service} did not finish within {secs}s")]
    Timeout { service: &'static str, secs: u64 },

    #[error("Views not generated yet, missing: {}", .0.join(", "))]
    MissingViews(Vec<String>),

    #[error("Another generation step is already running")]
    Busy,
}

pub type Result<T> = std::result::Result<T, Banana3dError>;
