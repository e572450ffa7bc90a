//! 外部ツール（podman / skopeo）の起動ラッパー

use std::io;
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

/// 1 回分の実行結果
#[derive(Debug)]
pub struct ToolRun {
    pub status: ExitStatus,
    /// stdout と stderr を届いた順に行単位でまとめたもの
    pub combined: String,
}

impl ToolRun {
    pub fn success(&self) -> bool {
        self.status.success()
    }
}

/// 引数を組み立てて実行するコマンド
///
/// `secret_arg` で追加した値はログ表示時（`Debug` を含む）にマスクされる。
#[derive(Clone)]
pub struct ToolCommand {
    program: String,
    args: Vec<String>,
    secret_indices: Vec<usize>,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            secret_indices: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn secret_arg(mut self, arg: impl Into<String>) -> Self {
        self.secret_indices.push(self.args.len());
        self.args.push(arg.into());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// ログ用のコマンドライン表現
    pub fn display(&self) -> String {
        let mut line = self.program.clone();
        for (i, arg) in self.args.iter().enumerate() {
            line.push(' ');
            if self.secret_indices.contains(&i) {
                line.push_str("***");
            } else {
                line.push_str(arg);
            }
        }
        line
    }

    /// 実行して終了を待つ
    ///
    /// 起動自体に失敗した場合のみ `Err` を返す。非ゼロ終了は `ToolRun` で判定する。
    pub async fn run(&self) -> io::Result<ToolRun> {
        tracing::debug!("Running: {}", self.display());

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("stdout was not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| io::Error::other("stderr was not captured"))?;

        let mut stdout = BufReader::new(stdout).split(b'\n');
        let mut stderr = BufReader::new(stderr).split(b'\n');
        let (mut stdout_open, mut stderr_open) = (true, true);
        let mut combined = String::new();

        while stdout_open || stderr_open {
            let line = tokio::select! {
                line = stdout.next_segment(), if stdout_open => {
                    let line = line?;
                    stdout_open = line.is_some();
                    line
                }
                line = stderr.next_segment(), if stderr_open => {
                    let line = line?;
                    stderr_open = line.is_some();
                    line
                }
            };
            if let Some(line) = line {
                combined.push_str(&String::from_utf8_lossy(&line));
                combined.push('\n');
            }
        }

        let status = child.wait().await?;

        Ok(ToolRun { status, combined })
    }
}

impl std::fmt::Debug for ToolCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ToolCommand").field(&self.display()).finish()
    }
}
