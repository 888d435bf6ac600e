use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("required setting {name} is not set")]
    Missing { name: &'static str },

    #[error("invalid value for {name}: {details}")]
    Invalid { name: &'static str, details: String },

    #[error("unknown {kind} provider: {value}")]
    UnknownProvider { kind: &'static str, value: String },
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("request failed: {0}")]
    Request(String),

    #[error("embedding dimension {actual} does not match index dimension {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("service not available yet: {0}")]
    NotReady(String),
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("unsupported file type: {0} (expected .pdf or .txt)")]
    UnsupportedFileType(String),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error(transparent)]
    Service(#[from] ServiceError),
}

#[derive(Debug, Error)]
pub enum FeedbackError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("sources column is not valid json: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("unknown feedback label: {0}")]
    UnknownLabel(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
