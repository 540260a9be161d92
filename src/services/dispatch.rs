//! 部署分发
//!
//! webhook 负载 → 事件解析 → 查找应用 → 展开命令模板 → 执行 → 结果分类

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::Applications;
use crate::domain::{interpret, DeployOutcome, Interpretation, SubstitutionContext, WebhookEvent};
use crate::infra::ProcessRunner;

use super::template;

/// 部署分发器
///
/// 应用配置在构建后只读；每个应用一把锁，同一应用的部署串行执行，
/// 不同应用之间互不阻塞。
pub struct Dispatcher {
    applications: Applications,
    locks: HashMap<String, Arc<Mutex<()>>>,
    runner: Arc<dyn ProcessRunner>,
    default_timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        applications: Applications,
        runner: Arc<dyn ProcessRunner>,
        default_timeout: Duration,
    ) -> Self {
        let locks = applications
            .ids()
            .map(|id| (id.to_string(), Arc::new(Mutex::new(()))))
            .collect();

        Self {
            applications,
            locks,
            runner,
            default_timeout,
        }
    }

    pub fn applications(&self) -> &Applications {
        &self.applications
    }

    /// 处理一次 webhook
    ///
    /// `application_id` 为 None 时使用负载中的 `repo_full_name` 查找应用。
    pub async fn handle(&self, payload: &Value, application_id: Option<&str>) -> DeployOutcome {
        let event = match interpret(payload) {
            Interpretation::Acted(event) => event,
            Interpretation::Ignored { event_type } => {
                info!(event_type = %event_type, "Ignoring webhook event");
                return DeployOutcome::Ignored {
                    reason: format!("event type `{}` is not handled", event_type),
                };
            }
            Interpretation::Malformed(reason) => {
                warn!(reason = %reason, "Malformed webhook payload");
                return DeployOutcome::MalformedRequest { reason };
            }
        };

        let application_id = application_id.unwrap_or(&event.repository_id);
        self.dispatch(application_id, &event).await
    }

    /// 为指定应用执行部署
    pub async fn dispatch(&self, application_id: &str, event: &WebhookEvent) -> DeployOutcome {
        let Some(app) = self.applications.get(application_id) else {
            warn!(application = %application_id, "Application not configured");
            return DeployOutcome::ApplicationNotFound {
                application: application_id.to_string(),
            };
        };

        if !app.accepts_tag(&event.tag) {
            info!(application = %app.id, tag = %event.tag, "Tag not in tag-filter, skipping");
            return DeployOutcome::Ignored {
                reason: format!("tag `{}` is not deployed for {}", event.tag, app.id),
            };
        }

        // 锁在构建时按应用 ID 创建，get 总能命中
        let lock = self.locks.get(&app.id).cloned().unwrap_or_default();
        let _guard = lock.lock().await;

        let context = SubstitutionContext::from_event(event);
        let argv = template::expand(&app.deploy_command, context.values());
        let timeout = app.timeout.unwrap_or(self.default_timeout);

        info!(
            application = %app.id,
            tag = %event.tag,
            digest = event.digest.as_deref().unwrap_or("-"),
            command = ?argv,
            timeout_secs = timeout.as_secs(),
            "Running deploy command"
        );

        let started = Instant::now();
        let result = self.runner.run(&argv, timeout).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(output) if output.success() => {
                info!(application = %app.id, elapsed_ms, "Deploy command succeeded");
                debug!(
                    application = %app.id,
                    stdout = %output.stdout,
                    stderr = %output.stderr,
                    "Deploy command output"
                );
                DeployOutcome::Success {
                    application: app.id.clone(),
                }
            }
            Ok(output) => {
                warn!(
                    application = %app.id,
                    exit_code = ?output.exit_code,
                    elapsed_ms,
                    stdout = %output.stdout,
                    stderr = %output.stderr,
                    "Deploy command failed"
                );
                DeployOutcome::CommandFailed {
                    application: app.id.clone(),
                    reason: match output.exit_code {
                        Some(code) => format!("exit code {}", code),
                        None => "terminated by signal".to_string(),
                    },
                }
            }
            Err(e) => {
                error!(application = %app.id, elapsed_ms, error = %e, "Failed to run deploy command");
                DeployOutcome::CommandFailed {
                    application: app.id.clone(),
                    reason: e.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApplicationConfig;
    use crate::infra::command::testing::{RecordingRunner, Scripted};
    use serde_json::json;

    fn argv(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn applications() -> Applications {
        Applications::from_entries([
            ApplicationConfig::new("app/one", argv(&["deploy.sh", "$TAG", "$REGISTRY_URL"])),
            ApplicationConfig::new("app/two", argv(&["restart.sh"])),
            ApplicationConfig::new("app/stable", argv(&["deploy.sh", "$TAG"]))
                .with_tag_filter(argv(&["latest"])),
            ApplicationConfig::new("app/slow", argv(&["migrate.sh"]))
                .with_timeout(Duration::from_secs(600)),
        ])
    }

    fn dispatcher(runner: Arc<RecordingRunner>) -> Dispatcher {
        Dispatcher::new(applications(), runner, Duration::from_secs(30))
    }

    fn push(repo: &str, tag: &str) -> Value {
        json!({
            "type": "PUSH_ARTIFACT",
            "event_data": {
                "repository": { "repo_full_name": repo },
                "resources": [ { "tag": tag, "resource_url": format!("registry/app:{}", tag) } ]
            }
        })
    }

    #[tokio::test]
    async fn test_successful_deploy() {
        let runner = Arc::new(RecordingRunner::exiting(0));
        let outcome = dispatcher(runner.clone())
            .handle(&push("app/one", "v2"), None)
            .await;

        assert_eq!(
            outcome,
            DeployOutcome::Success {
                application: "app/one".to_string()
            }
        );
        assert_eq!(
            runner.calls(),
            vec![argv(&["deploy.sh", "v2", "registry/app:v2"])]
        );
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_command_failed() {
        let runner = Arc::new(RecordingRunner::exiting(1));
        let outcome = dispatcher(runner.clone())
            .handle(&push("app/one", "v2"), None)
            .await;

        assert_eq!(
            outcome,
            DeployOutcome::CommandFailed {
                application: "app/one".to_string(),
                reason: "exit code 1".to_string(),
            }
        );
        assert_eq!(runner.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_spawn_failure_and_timeout_are_command_failed() {
        for scripted in [Scripted::SpawnFails, Scripted::TimesOut] {
            let runner = Arc::new(RecordingRunner::new(scripted));
            let outcome = dispatcher(runner.clone())
                .handle(&push("app/two", "v1"), None)
                .await;

            assert!(matches!(outcome, DeployOutcome::CommandFailed { .. }));
            assert_eq!(runner.calls(), vec![argv(&["restart.sh"])]);
        }
    }

    #[tokio::test]
    async fn test_unknown_application_launches_nothing() {
        let runner = Arc::new(RecordingRunner::exiting(0));
        let outcome = dispatcher(runner.clone())
            .handle(&push("app/unknown", "v2"), None)
            .await;

        assert_eq!(
            outcome,
            DeployOutcome::ApplicationNotFound {
                application: "app/unknown".to_string()
            }
        );
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_ignored_and_malformed_launch_nothing() {
        let runner = Arc::new(RecordingRunner::exiting(0));
        let dispatcher = dispatcher(runner.clone());

        let outcome = dispatcher
            .handle(&json!({ "type": "OTHER" }), None)
            .await;
        assert!(matches!(outcome, DeployOutcome::Ignored { .. }));

        let outcome = dispatcher
            .handle(&json!({ "type": "PUSH_ARTIFACT", "event_data": { "resources": [] } }), None)
            .await;
        assert!(matches!(outcome, DeployOutcome::MalformedRequest { .. }));

        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_path_application_overrides_payload() {
        let runner = Arc::new(RecordingRunner::exiting(0));
        let outcome = dispatcher(runner.clone())
            .handle(&push("library/whatever", "v3"), Some("app/two"))
            .await;

        assert!(outcome.is_ok());
        assert_eq!(runner.calls(), vec![argv(&["restart.sh"])]);
    }

    #[tokio::test]
    async fn test_tag_filter() {
        let runner = Arc::new(RecordingRunner::exiting(0));
        let dispatcher = dispatcher(runner.clone());

        let outcome = dispatcher.handle(&push("app/stable", "v9"), None).await;
        assert!(matches!(outcome, DeployOutcome::Ignored { .. }));
        assert!(runner.calls().is_empty());

        let outcome = dispatcher.handle(&push("app/stable", "latest"), None).await;
        assert!(matches!(outcome, DeployOutcome::Success { .. }));
        assert_eq!(runner.calls(), vec![argv(&["deploy.sh", "latest"])]);
    }

    #[tokio::test]
    async fn test_application_timeout_overrides_default() {
        let runner = Arc::new(RecordingRunner::exiting(0));
        let dispatcher = dispatcher(runner.clone());

        dispatcher.handle(&push("app/slow", "v1"), None).await;
        dispatcher.handle(&push("app/two", "v1"), None).await;

        assert_eq!(
            runner.timeouts(),
            vec![Duration::from_secs(600), Duration::from_secs(30)]
        );
    }

    #[tokio::test]
    async fn test_malicious_tag_is_single_argument() {
        let runner = Arc::new(RecordingRunner::exiting(0));
        dispatcher(runner.clone())
            .handle(&push("app/one", "latest; rm -rf /"), None)
            .await;

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].len(), 3);
        assert_eq!(calls[0][1], "latest; rm -rf /");
    }

    #[tokio::test]
    async fn test_same_application_deploys_serialized() {
        let runner = Arc::new(RecordingRunner::exiting(0).with_delay(Duration::from_millis(50)));
        let dispatcher = dispatcher(runner.clone());

        let a = push("app/one", "v1");
        let b = push("app/one", "v2");
        let (first, second) = tokio::join!(dispatcher.handle(&a, None), dispatcher.handle(&b, None));

        assert!(first.is_ok() && second.is_ok());
        assert_eq!(runner.calls().len(), 2);
        assert_eq!(runner.max_in_flight(), 1);
    }

    #[tokio::test]
    async fn test_different_applications_deploy_concurrently() {
        let runner = Arc::new(RecordingRunner::exiting(0).with_delay(Duration::from_millis(50)));
        let dispatcher = dispatcher(runner.clone());

        let a = push("app/one", "v1");
        let b = push("app/two", "v1");
        let (first, second) = tokio::join!(dispatcher.handle(&a, None), dispatcher.handle(&b, None));

        assert!(first.is_ok() && second.is_ok());
        assert_eq!(runner.max_in_flight(), 2);
    }
}
