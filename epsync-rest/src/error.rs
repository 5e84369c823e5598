//! Errors raised while setting up the REST client.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RestError {
    #[error("invalid organization url {0:?}: must start with http:// or https://")]
    InvalidUrl(String),

    #[error("http client: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, RestError>;
