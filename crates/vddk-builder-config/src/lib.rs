//! vddk-builder の設定
//!
//! すべての設定は環境変数（または同名のロングフラグ）から読み込みます。
//! 未設定の項目はクラスタ内デプロイ向けのデフォルト値になります。

pub mod error;

pub use error::*;

use clap::builder::BoolishValueParser;
use clap::{CommandFactory, FromArgMatches, Parser};
use std::ffi::OsString;
use std::path::PathBuf;

/// デーモン全体の設定
#[derive(Debug, Clone, Parser)]
#[command(name = "vddk-builderd")]
#[command(about = "Build-trigger service for a cluster-internal image registry", long_about = None)]
pub struct Config {
    /// `image` クエリが省略されたときに使うイメージ名
    #[arg(long, env = "IMAGE_NAME", default_value = "vddk")]
    pub image_name: String,

    /// TLS サーバー証明書 (PEM)
    #[arg(long, env = "CA_PUBLIC_KEY", default_value = "/etc/tls/server.crt")]
    pub ca_public_key: PathBuf,

    /// TLS 秘密鍵 (PEM)
    #[arg(long, env = "PRIVATE_KEY", default_value = "/etc/tls/server.key")]
    pub private_key: PathBuf,

    /// 待ち受けポート
    #[arg(long, env = "SERVER_PORT", default_value_t = 8443)]
    pub server_port: u16,

    /// アップロードされたアーカイブの一時保存先
    #[arg(long, env = "UPLOAD_DIR", default_value = "/tmp/uploads")]
    pub upload_dir: PathBuf,

    /// プッシュ先レジストリのホスト（ポート込み）
    #[arg(
        long,
        env = "IMAGE_REGISTRY",
        default_value = "image-registry.openshift-image-registry.svc:5000"
    )]
    pub image_registry: String,

    /// Bearer トークンによる認可を必須にする
    #[arg(
        long,
        env = "REQUIRE_AUTH",
        default_value = "false",
        value_parser = BoolishValueParser::new(),
        action = clap::ArgAction::Set
    )]
    pub require_auth: bool,

    /// SelfSubjectAccessReview を発行する API サーバー
    #[arg(long, env = "KUBE_API_SERVER", default_value = "https://kubernetes.default.svc")]
    pub kube_api_server: String,

    /// 展開用の作業ディレクトリ（配下の `extracted` を使い回す）
    #[arg(long, env = "WORK_DIR", default_value = "./tmp")]
    pub work_dir: PathBuf,

    /// ビルドレシピのファイル名（ビルドコンテキスト相対）
    #[arg(long, env = "BUILD_FILE", default_value = "Containerfile.vddk")]
    pub build_file: String,

    /// イメージビルドに使う実行ファイル
    #[arg(long, env = "BUILD_TOOL", default_value = "podman")]
    pub build_tool: String,

    /// イメージプッシュに使う実行ファイル
    #[arg(long, env = "PUSH_TOOL", default_value = "skopeo")]
    pub push_tool: String,

    /// アップロードボディの上限（バイト）
    #[arg(long, env = "UPLOAD_MAX_BYTES", default_value_t = 1024 * 1024 * 1024)]
    pub upload_max_bytes: usize,
}

impl Config {
    /// プロセスの引数と環境変数から読み込む
    pub fn load() -> Result<Self> {
        Self::load_from(std::env::args_os())
    }

    /// `args` と環境変数から読み込んで検証する
    ///
    /// 空文字列の環境変数は未設定として扱い、デフォルト値を使う。
    pub fn load_from<I, T>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let command = Self::command().mut_args(|arg| {
            let empty = arg
                .get_env()
                .and_then(std::env::var_os)
                .is_some_and(|value| value.is_empty());
            if empty { arg.env(None::<&str>) } else { arg }
        });

        let matches = command.try_get_matches_from(args)?;
        let config = Self::from_arg_matches(&matches)?;
        config.validate()?;
        Ok(config)
    }

    /// 空文字列などの明らかに不正な値を拒否
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("IMAGE_NAME", self.image_name.as_str()),
            ("IMAGE_REGISTRY", self.image_registry.as_str()),
            ("KUBE_API_SERVER", self.kube_api_server.as_str()),
            ("BUILD_FILE", self.build_file.as_str()),
            ("BUILD_TOOL", self.build_tool.as_str()),
            ("PUSH_TOOL", self.push_tool.as_str()),
        ];
        for (key, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::EmptyValue(key));
            }
        }

        let paths = [
            ("CA_PUBLIC_KEY", &self.ca_public_key),
            ("PRIVATE_KEY", &self.private_key),
            ("UPLOAD_DIR", &self.upload_dir),
            ("WORK_DIR", &self.work_dir),
        ];
        for (key, path) in paths {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::EmptyValue(key));
            }
        }

        if self.upload_max_bytes == 0 {
            return Err(ConfigError::ZeroUploadLimit);
        }

        Ok(())
    }

    /// アップロードディレクトリを作成（既存なら何もしない）
    pub fn ensure_upload_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.upload_dir)?;
        Ok(())
    }

    /// ステージングに使う作業ディレクトリ配下の固定パス
    pub fn staging_dir(&self) -> PathBuf {
        self.work_dir.join("extracted")
    }
}
