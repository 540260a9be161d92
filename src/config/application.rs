//! 应用部署配置
//!
//! 配置文档格式：
//!
//! ```yaml
//! application:
//!   library/backend:
//!     deploy-command: ["./deploy.sh", "$TAG", "$REGISTRY_URL"]
//!     tag-filter: ["latest"]   # 可选，仅这些 tag 触发部署
//!     timeout-secs: 600        # 可选，覆盖全局超时
//! ```
//!
//! 启动时一次性加载并校验，之后只读。

use serde_yaml_ng::{Mapping, Value};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::error::StartupError;

/// 顶层键
pub const APPLICATION_KEY: &str = "application";

const DEPLOY_COMMAND_KEY: &str = "deploy-command";
const TAG_FILTER_KEY: &str = "tag-filter";
const TIMEOUT_KEY: &str = "timeout-secs";

/// 配置校验错误
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("configuration document is empty")]
    EmptyDocument,

    #[error("configuration document must be a mapping")]
    DocumentNotAMapping,

    #[error("missing top-level `application` mapping")]
    MissingApplications,

    #[error("`application` must be a mapping of application id to settings")]
    ApplicationsNotAMapping,

    #[error("unknown top-level key `{0}`")]
    UnknownTopLevelKey(String),

    #[error("application ids must be non-empty strings, got `{0}`")]
    InvalidApplicationId(String),

    #[error("application `{0}` must be a mapping")]
    ApplicationNotAMapping(String),

    #[error("application `{application}`: unknown key `{key}`")]
    UnknownKey { application: String, key: String },

    #[error("application `{0}`: `deploy-command` is required")]
    MissingDeployCommand(String),

    #[error("application `{0}`: `deploy-command` must not be empty")]
    EmptyDeployCommand(String),

    #[error("application `{0}`: the executable in `deploy-command` must not be blank")]
    BlankExecutable(String),

    #[error("application `{application}`: `{key}` must be a sequence of strings")]
    NotASequence { application: String, key: &'static str },

    #[error("application `{application}`: `{key}` element {index} must be a string")]
    NonStringElement {
        application: String,
        key: &'static str,
        index: usize,
    },

    #[error("application `{0}`: `timeout-secs` must be a positive integer")]
    InvalidTimeout(String),
}

/// 单个应用的部署配置
#[derive(Debug, Clone, PartialEq)]
pub struct ApplicationConfig {
    /// 应用标识（与 registry 的 repo_full_name 一致，如 `namespace/name`）
    pub id: String,
    /// 部署命令模板，第一个元素是可执行文件
    pub deploy_command: Vec<String>,
    /// 允许触发部署的 tag 列表，None 表示任意 tag
    pub tag_filter: Option<Vec<String>>,
    /// 单独的超时设置
    pub timeout: Option<Duration>,
}

impl ApplicationConfig {
    pub fn new(id: impl Into<String>, deploy_command: Vec<String>) -> Self {
        Self {
            id: id.into(),
            deploy_command,
            tag_filter: None,
            timeout: None,
        }
    }

    pub fn with_tag_filter(mut self, tags: Vec<String>) -> Self {
        self.tag_filter = Some(tags);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// tag 是否允许触发部署
    pub fn accepts_tag(&self, tag: &str) -> bool {
        self.tag_filter
            .as_ref()
            .map_or(true, |tags| tags.iter().any(|t| t == tag))
    }
}

/// 全部应用配置（按应用 ID 索引）
#[derive(Debug, Clone, Default)]
pub struct Applications {
    entries: HashMap<String, ApplicationConfig>,
}

impl Applications {
    /// 从已解析的配置文档加载并校验
    pub fn load(document: &Value) -> Result<Self, ConfigError> {
        let root = match document {
            Value::Null => return Err(ConfigError::EmptyDocument),
            Value::Mapping(m) if m.is_empty() => return Err(ConfigError::EmptyDocument),
            Value::Mapping(m) => m,
            _ => return Err(ConfigError::DocumentNotAMapping),
        };

        let apps = root
            .get(APPLICATION_KEY)
            .ok_or(ConfigError::MissingApplications)?
            .as_mapping()
            .ok_or(ConfigError::ApplicationsNotAMapping)?;

        if let Some(key) = root.keys().find(|k| k.as_str() != Some(APPLICATION_KEY)) {
            return Err(ConfigError::UnknownTopLevelKey(describe_key(key)));
        }

        let mut entries = HashMap::with_capacity(apps.len());
        for (key, value) in apps {
            let id = match key.as_str() {
                Some(id) if !id.trim().is_empty() => id.to_string(),
                _ => return Err(ConfigError::InvalidApplicationId(describe_key(key))),
            };
            let settings = value
                .as_mapping()
                .ok_or_else(|| ConfigError::ApplicationNotAMapping(id.clone()))?;
            let app = parse_application(id, settings)?;
            entries.insert(app.id.clone(), app);
        }

        Ok(Self { entries })
    }

    /// 读取并校验配置文件
    pub fn load_file(path: &Path) -> Result<Self, StartupError> {
        let raw = std::fs::read_to_string(path).map_err(|source| StartupError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let document: Value =
            serde_yaml_ng::from_str(&raw).map_err(|source| StartupError::ConfigParse {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self::load(&document)?)
    }

    pub fn from_entries(apps: impl IntoIterator<Item = ApplicationConfig>) -> Self {
        Self {
            entries: apps.into_iter().map(|a| (a.id.clone(), a)).collect(),
        }
    }

    pub fn get(&self, id: &str) -> Option<&ApplicationConfig> {
        self.entries.get(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ApplicationConfig> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn parse_application(id: String, settings: &Mapping) -> Result<ApplicationConfig, ConfigError> {
    for key in settings.keys() {
        match key.as_str() {
            Some(DEPLOY_COMMAND_KEY | TAG_FILTER_KEY | TIMEOUT_KEY) => {}
            _ => {
                return Err(ConfigError::UnknownKey {
                    application: id,
                    key: describe_key(key),
                })
            }
        }
    }

    let deploy_command = match settings.get(DEPLOY_COMMAND_KEY) {
        None | Some(Value::Null) => return Err(ConfigError::MissingDeployCommand(id)),
        Some(value) => string_list(&id, DEPLOY_COMMAND_KEY, value)?,
    };
    match deploy_command.first() {
        None => return Err(ConfigError::EmptyDeployCommand(id)),
        Some(program) if program.trim().is_empty() => {
            return Err(ConfigError::BlankExecutable(id))
        }
        Some(_) => {}
    }

    let tag_filter = settings
        .get(TAG_FILTER_KEY)
        .map(|value| string_list(&id, TAG_FILTER_KEY, value))
        .transpose()?;

    let timeout = match settings.get(TIMEOUT_KEY) {
        None => None,
        Some(value) => match value.as_u64() {
            Some(secs) if secs > 0 => Some(Duration::from_secs(secs)),
            _ => return Err(ConfigError::InvalidTimeout(id)),
        },
    };

    Ok(ApplicationConfig {
        id,
        deploy_command,
        tag_filter,
        timeout,
    })
}

fn string_list(
    application: &str,
    key: &'static str,
    value: &Value,
) -> Result<Vec<String>, ConfigError> {
    let items = value.as_sequence().ok_or_else(|| ConfigError::NotASequence {
        application: application.to_string(),
        key,
    })?;

    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| ConfigError::NonStringElement {
                    application: application.to_string(),
                    key,
                    index,
                })
        })
        .collect()
}

fn describe_key(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        other => serde_yaml_ng::to_string(other)
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|_| "<unprintable>".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn parse(yaml: &str) -> Result<Applications, ConfigError> {
        let doc: Value = serde_yaml_ng::from_str(yaml).unwrap();
        Applications::load(&doc)
    }

    #[test]
    fn test_load_valid_document() {
        let apps = parse(
            r#"
application:
  app/one:
    deploy-command: ["deploy.sh", "$TAG", "$REGISTRY_URL"]
  app/two:
    deploy-command: ["kubectl", "rollout", "restart", "deployment/two"]
    tag-filter: ["latest", "stable"]
    timeout-secs: 120
"#,
        )
        .unwrap();

        assert_eq!(apps.len(), 2);
        let one = apps.get("app/one").unwrap();
        assert_eq!(one.deploy_command, vec!["deploy.sh", "$TAG", "$REGISTRY_URL"]);
        assert!(one.tag_filter.is_none());
        assert!(one.timeout.is_none());

        let two = apps.get("app/two").unwrap();
        assert_eq!(
            two.tag_filter,
            Some(vec!["latest".to_string(), "stable".to_string()])
        );
        assert_eq!(two.timeout, Some(Duration::from_secs(120)));
    }

    #[test]
    fn test_empty_document_rejected() {
        assert_eq!(parse("").unwrap_err(), ConfigError::EmptyDocument);
        assert_eq!(parse("{}").unwrap_err(), ConfigError::EmptyDocument);
    }

    #[test]
    fn test_missing_application_key() {
        assert_eq!(
            parse("apps:\n  a: {}\n").unwrap_err(),
            ConfigError::MissingApplications
        );
    }

    #[test]
    fn test_unknown_top_level_key() {
        assert_eq!(
            parse("application: {}\nlisten: 8080\n").unwrap_err(),
            ConfigError::UnknownTopLevelKey("listen".to_string())
        );
    }

    #[test]
    fn test_application_must_be_mapping() {
        assert_eq!(
            parse("application: [1, 2]\n").unwrap_err(),
            ConfigError::ApplicationsNotAMapping
        );
        assert_eq!(
            parse("application:\n").unwrap_err(),
            ConfigError::ApplicationsNotAMapping
        );
    }

    #[test]
    fn test_entry_must_be_mapping() {
        assert_eq!(
            parse("application:\n  app/one: deploy.sh\n").unwrap_err(),
            ConfigError::ApplicationNotAMapping("app/one".to_string())
        );
    }

    #[test]
    fn test_deploy_command_must_be_sequence() {
        assert_eq!(
            parse("application:\n  app/one:\n    deploy-command: deploy.sh\n").unwrap_err(),
            ConfigError::NotASequence {
                application: "app/one".to_string(),
                key: "deploy-command",
            }
        );
    }

    #[test]
    fn test_deploy_command_rejects_non_string_elements() {
        assert_eq!(
            parse("application:\n  app/one:\n    deploy-command: [deploy.sh, 42]\n").unwrap_err(),
            ConfigError::NonStringElement {
                application: "app/one".to_string(),
                key: "deploy-command",
                index: 1,
            }
        );
    }

    #[test]
    fn test_deploy_command_missing_or_empty() {
        assert_eq!(
            parse("application:\n  app/one: {}\n").unwrap_err(),
            ConfigError::MissingDeployCommand("app/one".to_string())
        );
        assert_eq!(
            parse("application:\n  app/one:\n    deploy-command: []\n").unwrap_err(),
            ConfigError::EmptyDeployCommand("app/one".to_string())
        );
        assert_eq!(
            parse("application:\n  app/one:\n    deploy-command: [\" \"]\n").unwrap_err(),
            ConfigError::BlankExecutable("app/one".to_string())
        );
    }

    #[test]
    fn test_unknown_application_key_rejected() {
        assert_eq!(
            parse("application:\n  app/one:\n    deploy-command: [a]\n    workdir: /tmp\n")
                .unwrap_err(),
            ConfigError::UnknownKey {
                application: "app/one".to_string(),
                key: "workdir".to_string(),
            }
        );
    }

    #[test]
    fn test_invalid_timeout() {
        assert_eq!(
            parse("application:\n  app/one:\n    deploy-command: [a]\n    timeout-secs: 0\n")
                .unwrap_err(),
            ConfigError::InvalidTimeout("app/one".to_string())
        );
    }

    #[test]
    fn test_accepts_tag() {
        let app = ApplicationConfig::new("app/one", vec!["deploy.sh".to_string()]);
        assert!(app.accepts_tag("v1"));

        let app = app.with_tag_filter(vec!["latest".to_string()]);
        assert!(app.accepts_tag("latest"));
        assert!(!app.accepts_tag("v1"));
    }

    #[test]
    fn test_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "application:\n  app/one:\n    deploy-command: [deploy.sh, $TAG]"
        )
        .unwrap();

        let apps = Applications::load_file(file.path()).unwrap();
        assert_eq!(apps.ids().collect::<Vec<_>>(), vec!["app/one"]);
    }

    #[test]
    fn test_load_file_missing() {
        let err = Applications::load_file(Path::new("/nonexistent/deploy.yaml")).unwrap_err();
        assert!(matches!(err, StartupError::ConfigRead { .. }));
    }

    #[test]
    fn test_load_file_invalid_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "application: [unclosed").unwrap();

        let err = Applications::load_file(file.path()).unwrap_err();
        assert!(matches!(err, StartupError::ConfigParse { .. }));
    }
}
