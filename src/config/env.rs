//! 启动参数与环境变量配置

use clap::Parser;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::StartupError;

/// 共享密钥所在的环境变量（全程只绑定这一个名字）
pub const SECRET_ENV: &str = "APP_TOKEN";

/// 命令行参数（均可通过环境变量设置）
#[derive(Debug, Clone, Parser)]
#[command(
    name = "harbor-deploy-relay",
    version,
    about = "Runs a configured deploy command when the registry reports a pushed artifact"
)]
pub struct RuntimeArgs {
    /// 配置文件路径（相对路径基于当前工作目录）
    #[arg(long = "config", env = "CONFIG_FILE", default_value = "deploy.yaml")]
    pub config_file: PathBuf,

    /// 监听地址
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// 监听端口
    #[arg(long, env = "PORT", default_value_t = constants::DEFAULT_PORT)]
    pub port: u16,

    /// 部署命令默认超时（秒）
    #[arg(long, env = "DEPLOY_TIMEOUT_SECS", default_value_t = constants::DEPLOY_TIMEOUT_SECS)]
    pub deploy_timeout_secs: u64,
}

/// 进程级共享密钥
#[derive(Clone)]
pub struct SecretToken(String);

impl SecretToken {
    pub fn new(value: impl Into<String>) -> Result<Self, StartupError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(StartupError::MissingSecret(SECRET_ENV));
        }
        Ok(Self(value))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretToken(***)")
    }
}

/// 环境配置
#[derive(Clone, Debug)]
pub struct EnvConfig {
    /// Bearer token 对应的密钥
    pub secret: SecretToken,
    /// 应用配置文件
    pub config_file: PathBuf,
    /// 监听地址 host:port
    pub bind_addr: String,
    /// 部署命令默认超时
    pub deploy_timeout: Duration,
}

impl EnvConfig {
    /// 从命令行参数和环境变量加载配置
    pub fn from_env(args: RuntimeArgs) -> Result<Self, StartupError> {
        Self::resolve(args, env::var(SECRET_ENV).ok())
    }

    fn resolve(args: RuntimeArgs, secret: Option<String>) -> Result<Self, StartupError> {
        let secret = secret
            .ok_or(StartupError::MissingSecret(SECRET_ENV))
            .and_then(SecretToken::new)?;

        if args.deploy_timeout_secs == 0 {
            return Err(StartupError::InvalidSetting(
                "DEPLOY_TIMEOUT_SECS must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            secret,
            config_file: args.config_file,
            bind_addr: format!("{}:{}", args.host, args.port),
            deploy_timeout: Duration::from_secs(args.deploy_timeout_secs),
        })
    }
}

/// 常量
pub mod constants {
    /// 默认监听端口
    pub const DEFAULT_PORT: u16 = 8080;

    /// 部署超时（秒）
    pub const DEPLOY_TIMEOUT_SECS: u64 = 1800; // 30 分钟

    /// 服务名称
    pub const SERVICE_NAME: &str = "harbor-deploy-relay";

    /// 版本号
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");
}
