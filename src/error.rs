use datafusion::{arrow::error::ArrowError, error::DataFusionError};
use thiserror::Error;

/// Failure classes a caller can branch on without matching every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transport,
    Remote,
    Parse,
    Persistence,
    Config,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("API responded with {status}: {message}")]
    Remote { status: u16, message: String },

    #[error("Unexpected response payload: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Failed to parse URL: {0}")]
    UrlParsingFailed(#[from] url::ParseError),

    #[error("Record for entity '{entity_id}' is missing required field '{field}'")]
    IncompleteRecord {
        field: &'static str,
        entity_id: String,
    },

    #[error("History for entity '{entity_id}' could not be fetched: {source}")]
    EntityFailed {
        entity_id: String,
        #[source]
        source: Box<Error>,
    },

    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Arrow: {0}")]
    Arrow(#[from] ArrowError),

    #[error("DataFusion: {0}")]
    DataFusion(#[from] DataFusionError),

    #[error("Logging setup failed: {0}")]
    Logging(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Transport { .. } => ErrorKind::Transport,
            Error::Remote { .. } => ErrorKind::Remote,
            Error::Parse(_) | Error::IncompleteRecord { .. } => ErrorKind::Parse,
            Error::EntityFailed { source, .. } => source.kind(),
            Error::Io(_) | Error::Database(_) | Error::Arrow(_) | Error::DataFusion(_) => {
                ErrorKind::Persistence
            }
            Error::UrlParsingFailed(_) | Error::Logging(_) => ErrorKind::Config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_failure_reports_inner_kind() {
        let err = Error::EntityFailed {
            entity_id: "B".to_string(),
            source: Box::new(Error::Remote {
                status: 400,
                message: "Unsupported get request".to_string(),
            }),
        };
        assert_eq!(err.kind(), ErrorKind::Remote);
        assert!(err.to_string().contains("'B'"));
    }

    #[test]
    fn test_parse_and_persistence_kinds() {
        let parse = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert_eq!(Error::from(parse).kind(), ErrorKind::Parse);

        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        assert_eq!(Error::from(io).kind(), ErrorKind::Persistence);
    }
}
