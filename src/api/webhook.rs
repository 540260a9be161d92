//! Webhook 部署 API
//!
//! 包含 /webhook/deploy 和 /webhook/deploy/*app_id 端点
//!
//! 应用 ID 形如 `namespace/name`，路径路由用通配段整体捕获。

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn, Instrument};
use uuid::Uuid;

use crate::domain::DeployOutcome;
use crate::error::{ApiError, MessageResponse};
use crate::middleware::RequireBearerToken;
use crate::state::AppState;

/// 创建 webhook 路由
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/webhook/deploy", post(deploy))
        .route("/webhook/deploy/*app_id", post(deploy_application))
}

/// 根据负载中的仓库名部署
///
/// POST /webhook/deploy
/// 需要 Bearer token
async fn deploy(
    _auth: RequireBearerToken,
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> DeployOutcome {
    process(&state, &body, None).await
}

/// 部署路径中指定的应用
///
/// POST /webhook/deploy/{namespace}/{name}
/// 需要 Bearer token
async fn deploy_application(
    _auth: RequireBearerToken,
    State(state): State<Arc<AppState>>,
    Path(app_id): Path<String>,
    body: Bytes,
) -> DeployOutcome {
    let app_id = app_id.trim_start_matches('/');
    if app_id.trim().is_empty() {
        return DeployOutcome::MalformedRequest {
            reason: "app_id is required".to_string(),
        };
    }
    process(&state, &body, Some(app_id)).await
}

async fn process(state: &AppState, body: &[u8], application_id: Option<&str>) -> DeployOutcome {
    let span = tracing::info_span!("webhook", delivery_id = %Uuid::new_v4());

    async move {
        let payload: Value = match serde_json::from_slice(body) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Webhook body is not valid JSON");
                return DeployOutcome::MalformedRequest {
                    reason: format!("invalid JSON body: {}", e),
                };
            }
        };

        let outcome = state.dispatcher.handle(&payload, application_id).await;
        info!(outcome = outcome.as_str(), "Webhook handled");
        outcome
    }
    .instrument(span)
    .await
}

impl IntoResponse for DeployOutcome {
    fn into_response(self) -> Response {
        match self {
            DeployOutcome::Success { .. } => {
                (StatusCode::OK, Json(MessageResponse::new("success"))).into_response()
            }
            DeployOutcome::Ignored { .. } => {
                (StatusCode::OK, Json(MessageResponse::new("ignored"))).into_response()
            }
            DeployOutcome::ApplicationNotFound { application } => ApiError::not_found(format!(
                "{} was not found in the configuration",
                application
            ))
            .into_response(),
            DeployOutcome::MalformedRequest { reason } => {
                ApiError::bad_request(reason).into_response()
            }
            // 命令输出只写日志，不返回给调用方
            DeployOutcome::CommandFailed { application, .. } => ApiError::internal(format!(
                "Failed to trigger deploy command for {}",
                application
            ))
            .into_response(),
        }
    }
}
