use thiserror::Error;

#[derive(Debug, Error)]
pub enum PinpointError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed or out-of-range bbox payload.
    #[error("Decode error: {0}")]
    Decode(String),

    /// No valid structured payload could be recovered from model text.
    /// The message carries an excerpt of the raw response.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Model channel or page driver unreachable / timed out.
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),
}

pub type PinpointResult<T> = Result<T, PinpointError>;
