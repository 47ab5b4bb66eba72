use crate::conn::ConnError;

#[derive(Debug, thiserror::Error)]
pub enum ExporterError {
    #[error("Initialization error: {0}")]
    Initialization(String),

    #[error("Transport error: {0}")]
    Transport(#[from] ConnError),

    #[error("Failed to parse {what}: {source}")]
    Parse {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid version: {0:?}")]
    InvalidVersion(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ExporterError {
    /// Wrap a JSON decoding failure with the name of the payload it came from.
    pub fn parse(what: &'static str) -> impl FnOnce(serde_json::Error) -> Self {
        move |source| ExporterError::Parse { what, source }
    }
}

impl From<prometheus::Error> for ExporterError {
    fn from(err: prometheus::Error) -> Self {
        ExporterError::Initialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ExporterError>;
