use thiserror::Error;

pub type Result<T> = std::result::Result<T, AgnoError>;

#[derive(Debug, Error)]
pub enum AgnoError {
    #[error("tool `{0}` not found")]
    ToolNotFound(String),

    #[error("tool `{name}` invocation failed: {source}")]
    ToolInvocation {
        name: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("language model error: {0}")]
    LanguageModel(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unknown {kind} `{value}`")]
    UnknownVariant { kind: &'static str, value: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("unsupported operation: {0}")]
    Unsupported(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

impl AgnoError {
    pub(crate) fn unknown_variant(kind: &'static str, value: impl Into<String>) -> Self {
        AgnoError::UnknownVariant {
            kind,
            value: value.into(),
        }
    }
}
