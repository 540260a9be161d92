//! 应用状态

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{Applications, EnvConfig, SecretToken};
use crate::infra::{CommandRunner, ProcessRunner};
use crate::services::Dispatcher;

/// 应用状态
///
/// 启动时构建一次，通过 `Arc<AppState>` 注入各 handler，运行期间只读
pub struct AppState {
    /// Bearer token 密钥
    pub secret: SecretToken,
    /// 部署分发器（持有应用配置）
    pub dispatcher: Dispatcher,
    /// 服务启动时间
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// 使用真实命令执行器创建
    pub fn new(config: &EnvConfig, applications: Applications) -> Self {
        Self::with_runner(
            config.secret.clone(),
            applications,
            Arc::new(CommandRunner),
            config.deploy_timeout,
        )
    }

    pub fn with_runner(
        secret: SecretToken,
        applications: Applications,
        runner: Arc<dyn ProcessRunner>,
        deploy_timeout: Duration,
    ) -> Self {
        tracing::info!(
            secret_len = secret.expose().len(),
            application_count = applications.len(),
            deploy_timeout_secs = deploy_timeout.as_secs(),
            "Loaded configuration"
        );

        for app in applications.iter() {
            tracing::info!(
                application = %app.id,
                executable = app.deploy_command.first().map(String::as_str).unwrap_or_default(),
                tag_filter = ?app.tag_filter,
                "Registered application"
            );
        }

        if applications.is_empty() {
            tracing::warn!("No applications configured, every push will be answered with 404");
        }

        Self {
            secret,
            dispatcher: Dispatcher::new(applications, runner, deploy_timeout),
            started_at: Utc::now(),
        }
    }
}
