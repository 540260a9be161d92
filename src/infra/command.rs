//! 命令执行器
//!
//! 以参数向量的形式启动部署命令：
//! - 不经过 shell
//! - stdout/stderr 捕获后返回，不做流式输出
//! - 超时后终止子进程
//! - 工作目录与环境变量继承自当前进程

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

/// 命令执行错误
#[derive(Debug, Error)]
pub enum CommandError {
    /// 参数向量为空或可执行文件为空
    #[error("Command is empty")]
    EmptyCommand,
    /// 命令启动失败（如可执行文件不存在）
    #[error("Failed to spawn command: {0}")]
    SpawnFailed(#[source] std::io::Error),
    /// 等待命令完成失败
    #[error("Failed to wait for command: {0}")]
    WaitFailed(#[source] std::io::Error),
    /// 命令超时
    #[error("Command timed out after {0:?}")]
    Timeout(Duration),
}

/// 命令执行结果
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutput {
    /// 退出码，被信号终止时为 None
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// 进程执行抽象，便于测试时替换
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// 执行 `argv`，`argv[0]` 为可执行文件
    async fn run(&self, argv: &[String], timeout: Duration) -> Result<CommandOutput, CommandError>;
}

/// 基于 `tokio::process` 的命令执行器
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandRunner;

#[async_trait]
impl ProcessRunner for CommandRunner {
    async fn run(&self, argv: &[String], timeout: Duration) -> Result<CommandOutput, CommandError> {
        let (program, args) = match argv.split_first() {
            Some((program, args)) if !program.is_empty() => (program, args),
            _ => return Err(CommandError::EmptyCommand),
        };

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(CommandError::SpawnFailed)?;

        // 超时后 future 被丢弃，kill_on_drop 负责终止子进程
        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| CommandError::Timeout(timeout))?
            .map_err(CommandError::WaitFailed)?;

        Ok(CommandOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
