//! Registry webhook 事件模型
//!
//! 只处理 `PUSH_ARTIFACT` 事件，负载格式：
//!
//! ```json
//! {
//!   "type": "PUSH_ARTIFACT",
//!   "event_data": {
//!     "repository": { "repo_full_name": "library/backend" },
//!     "resources": [ { "tag": "v2", "resource_url": "registry.local/library/backend:v2" } ]
//!   }
//! }
//! ```

use serde::Deserialize;
use serde_json::Value;

/// 触发部署的事件类型
pub const PUSH_ARTIFACT: &str = "PUSH_ARTIFACT";

/// 一次推送事件中部署需要的字段
#[derive(Clone, Debug, PartialEq)]
pub struct WebhookEvent {
    pub event_type: String,
    /// 仓库全名，用作应用 ID
    pub repository_id: String,
    pub tag: String,
    pub resource_url: String,
    pub digest: Option<String>,
}

/// 事件解析结果
#[derive(Clone, Debug, PartialEq)]
pub enum Interpretation {
    /// 推送事件，需要部署
    Acted(WebhookEvent),
    /// 其他事件类型，正常响应但不处理
    Ignored { event_type: String },
    /// 推送事件但结构不完整
    Malformed(String),
}

#[derive(Debug, Deserialize)]
struct EventData {
    repository: Repository,
    resources: Vec<Resource>,
}

#[derive(Debug, Deserialize)]
struct Repository {
    repo_full_name: String,
}

#[derive(Debug, Deserialize)]
struct Resource {
    tag: String,
    resource_url: String,
    #[serde(default)]
    digest: Option<String>,
}

/// 解析 webhook 负载
pub fn interpret(payload: &Value) -> Interpretation {
    let Some(body) = payload.as_object() else {
        return Interpretation::Malformed("payload must be a JSON object".to_string());
    };

    let event_type = match body.get("type") {
        Some(Value::String(t)) => t.clone(),
        Some(_) => return Interpretation::Malformed("`type` must be a string".to_string()),
        None => return Interpretation::Malformed("missing `type`".to_string()),
    };

    if event_type != PUSH_ARTIFACT {
        return Interpretation::Ignored { event_type };
    }

    let Some(raw_data) = body.get("event_data") else {
        return Interpretation::Malformed("missing `event_data`".to_string());
    };
    let data: EventData = match EventData::deserialize(raw_data) {
        Ok(data) => data,
        Err(e) => return Interpretation::Malformed(format!("invalid `event_data`: {}", e)),
    };

    if data.repository.repo_full_name.trim().is_empty() {
        return Interpretation::Malformed("`repo_full_name` must not be empty".to_string());
    }

    // registry 保证 push 事件至少带一个 resource，取第一个作为部署对象
    let Some(resource) = data.resources.into_iter().next() else {
        return Interpretation::Malformed("`resources` must not be empty".to_string());
    };

    Interpretation::Acted(WebhookEvent {
        event_type,
        repository_id: data.repository.repo_full_name,
        tag: resource.tag,
        resource_url: resource.resource_url,
        digest: resource.digest,
    })
}
