#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Decode failed for {context}: {source}")]
    Decode {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Expected a JSON object in {0}")]
    NotAnObject(String),

    #[error("Missing field: {0}")]
    MissingField(String),

    #[error("Field {0} is not a string")]
    NotAString(String),

    #[error("Encode failed: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),
}
