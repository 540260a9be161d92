//! 部署相关领域模型

use std::collections::HashMap;

use super::webhook::WebhookEvent;

/// 占位符：镜像 tag
pub const TAG_VAR: &str = "TAG";
/// 占位符：完整镜像地址
pub const REGISTRY_URL_VAR: &str = "REGISTRY_URL";

/// 单次部署的占位符取值
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SubstitutionContext {
    values: HashMap<String, String>,
}

impl SubstitutionContext {
    /// 根据推送事件构建 `{TAG, REGISTRY_URL}`
    pub fn from_event(event: &WebhookEvent) -> Self {
        let mut values = HashMap::with_capacity(2);
        values.insert(TAG_VAR.to_string(), event.tag.clone());
        values.insert(REGISTRY_URL_VAR.to_string(), event.resource_url.clone());
        Self { values }
    }

    pub fn values(&self) -> &HashMap<String, String> {
        &self.values
    }
}

/// 一次分发的结果，只用于生成 HTTP 响应
#[derive(Clone, Debug, PartialEq)]
pub enum DeployOutcome {
    Success { application: String },
    Ignored { reason: String },
    ApplicationNotFound { application: String },
    CommandFailed { application: String, reason: String },
    MalformedRequest { reason: String },
}

impl DeployOutcome {
    /// 转换为字符串
    pub fn as_str(&self) -> &'static str {
        match self {
            DeployOutcome::Success { .. } => "success",
            DeployOutcome::Ignored { .. } => "ignored",
            DeployOutcome::ApplicationNotFound { .. } => "application_not_found",
            DeployOutcome::CommandFailed { .. } => "command_failed",
            DeployOutcome::MalformedRequest { .. } => "malformed_request",
        }
    }

    /// 是否应返回成功状态码
    pub fn is_ok(&self) -> bool {
        matches!(self, DeployOutcome::Success { .. } | DeployOutcome::Ignored { .. })
    }
}
