//! Authorization error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Failed to build API client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    #[error("Failed to create SelfSubjectAccessReview: {0}")]
    Request(#[from] reqwest::Error),

    #[error("SelfSubjectAccessReview returned HTTP {0}")]
    UnexpectedStatus(u16),
}

pub type Result<T> = std::result::Result<T, AuthError>;
