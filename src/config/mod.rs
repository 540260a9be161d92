//! 配置模块
//!
//! 启动参数、共享密钥与应用部署配置

pub mod application;
pub mod env;

pub use application::{ApplicationConfig, Applications, ConfigError};
pub use env::{EnvConfig, RuntimeArgs, SecretToken};
