use config::ConfigError;
use reqwest::StatusCode;
use thiserror::Error;

/// Fatal startup errors.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to parse url: {0}")]
    UrlParse(#[from] url::ParseError),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

/// Errors reported by the container runtime.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("docker: {0}")]
    Docker(#[from] bollard::errors::Error),

    #[error("runtime unavailable: {0}")]
    Unavailable(String),
}

/// Reasons an image reference could not be turned into catalog records.
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("unable to find image {0:?} without a tag")]
    NoTag(String),

    #[error("runtime connection failed: {0}")]
    Connection(#[source] RuntimeError),

    #[error("failed to inspect image: {0}")]
    Query(#[source] RuntimeError),

    #[error("unable to find repo digests for {0:?} image")]
    NoDigests(String),
}

/// Failure of a single publish attempt.
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("failed to encode image record: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("got http status code {0} from catalog")]
    Server(StatusCode),

    #[error("bad request, status {0} from catalog")]
    Client(StatusCode),
}

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("failed to read events: {0}")]
    EventStream(#[source] RuntimeError),
}
