//! Registry probe エラー型

/// レジストリ問い合わせのエラー
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    #[error("registry request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected HTTP status code: {0}")]
    UnexpectedStatus(u16),
}

pub type Result<T> = std::result::Result<T, ProbeError>;
