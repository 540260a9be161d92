//! Harbor Deploy Relay - registry 推送触发部署
//!
//! 收到 `PUSH_ARTIFACT` webhook 后，按仓库名查找配置的部署命令，
//! 替换 `$TAG` / `$REGISTRY_URL` 后直接执行（不经过 shell）。

pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod infra;
pub mod middleware;
pub mod services;
pub mod state;

use std::sync::Arc;
use tokio::net::TcpListener;

pub use config::RuntimeArgs;
pub use error::StartupError;

use config::{Applications, EnvConfig};
use state::AppState;

/// 加载配置并启动 HTTP 服务
///
/// 密钥缺失或配置无效时在监听端口之前返回错误。
pub async fn init_and_run(args: RuntimeArgs) -> Result<(), StartupError> {
    let config = EnvConfig::from_env(args)?;
    let applications = Applications::load_file(&config.config_file)?;
    tracing::info!(
        config_file = %config.config_file.display(),
        "Configuration validated"
    );

    let state = Arc::new(AppState::new(&config, applications));
    let app = api::router(state);

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .map_err(|source| StartupError::Bind {
            addr: config.bind_addr.clone(),
            source,
        })?;
    tracing::info!(addr = %config.bind_addr, "Deploy relay listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(StartupError::Serve)?;

    tracing::info!("Deploy relay stopped");
    Ok(())
}

/// 等待 Ctrl-C 或 SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("Shutdown signal received");
}
