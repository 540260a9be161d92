//! Harbor Deploy Relay
//!
//! Usage:
//! - `APP_TOKEN=... harbor-deploy-relay`
//! - `APP_TOKEN=... harbor-deploy-relay --config /etc/relay/deploy.yaml --port 9000`
//! - `LOG_FORMAT=json RUST_LOG=harbor_deploy_relay=debug harbor-deploy-relay`

use clap::Parser;
use tracing_subscriber::EnvFilter;

use harbor_deploy_relay::RuntimeArgs;

fn main() {
    let args = RuntimeArgs::parse();

    init_tracing();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create runtime: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = rt.block_on(harbor_deploy_relay::init_and_run(args)) {
        tracing::error!(error = %e, "Deploy relay failed to start");
        std::process::exit(1);
    }
}

/// 初始化日志，`LOG_FORMAT=json` 输出 JSON
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
