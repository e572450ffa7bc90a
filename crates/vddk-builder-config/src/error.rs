use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("設定値が空です: {0}")]
    EmptyValue(&'static str),

    #[error("アップロード上限は 1 バイト以上を指定してください")]
    ZeroUploadLimit,

    #[error("環境変数の解析に失敗しました: {0}")]
    Parse(#[from] clap::Error),

    #[error("IO エラー: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
