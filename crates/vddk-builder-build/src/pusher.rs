//! イメージプッシュ処理
//!
//! ローカルの containers-storage にビルドしたイメージをレジストリへコピーします。

use crate::command::ToolCommand;
use crate::error::{BuildError, BuildResult};
use async_trait::async_trait;

/// プッシュ先レジストリの認証情報
#[derive(Clone, PartialEq, Eq)]
pub struct RegistryCredentials {
    pub username: String,
    pub password: String,
}

impl RegistryCredentials {
    /// Bearer トークンを認証情報として使う（ユーザー名は空、トークンがパスワード）
    pub fn from_token(token: impl Into<String>) -> Self {
        Self {
            username: String::new(),
            password: token.into(),
        }
    }

    /// `--dest-creds` に渡す `user:password` 形式
    fn as_creds_arg(&self) -> String {
        format!("{}:{}", self.username, self.password)
    }
}

impl std::fmt::Debug for RegistryCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryCredentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// イメージプッシュの抽象
#[async_trait]
pub trait ImagePusher: Send + Sync {
    async fn push(&self, tag: &str, credentials: Option<&RegistryCredentials>) -> BuildResult<()>;
}

/// `skopeo copy` によるプッシュ
///
/// クラスタ内レジストリは自己署名証明書のため、宛先の TLS 検証は無効にする。
#[derive(Debug, Clone)]
pub struct SkopeoPusher {
    program: String,
}

impl Default for SkopeoPusher {
    fn default() -> Self {
        Self::new("skopeo")
    }
}

impl SkopeoPusher {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn command(&self, tag: &str, credentials: Option<&RegistryCredentials>) -> ToolCommand {
        let mut cmd = ToolCommand::new(&self.program)
            .arg("copy")
            .arg("--dest-tls-verify=false");

        if let Some(creds) = credentials {
            cmd = cmd.arg("--dest-creds").secret_arg(creds.as_creds_arg());
        }

        cmd.arg(format!("containers-storage:{}", tag))
            .arg(format!("docker://{}", tag))
    }
}

#[async_trait]
impl ImagePusher for SkopeoPusher {
    async fn push(&self, tag: &str, credentials: Option<&RegistryCredentials>) -> BuildResult<()> {
        tracing::info!("Pushing image: {}", tag);

        let cmd = self.command(tag, credentials);
        let run = cmd.run().await.map_err(|e| BuildError::PushTool {
            tag: tag.to_string(),
            status: format!("failed to start {}: {}", cmd.program(), e),
            output: String::new(),
        })?;

        if !run.success() {
            return Err(BuildError::PushTool {
                tag: tag.to_string(),
                status: run.status.to_string(),
                output: run.combined,
            });
        }

        tracing::info!("Successfully pushed: {}", tag);
        Ok(())
    }
}
