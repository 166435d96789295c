//! 动作派发器
//!
//! 持有 Desktop、home 目录与单个动作超时；dispatch 对一批动作并发执行（join_all，无顺序保证、无共享可变状态），
//! 结果按输入顺序汇总。每个动作的失败被隔离为 ActionStatus::Failed，不中止兄弟动作；每次执行输出结构化审计日志（JSON）。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::actions::Action;
use crate::desktop::{ActionError, Desktop};
use crate::dispatch::{
    resolve_path, ActionOutcome, ActionStatus, DispatchReport, FetchedInfo, FetchedPayload,
    FileListResult,
};

/// request_list_files 单次最多返回的条目数；total_count 仍是过滤后的总数
pub const MAX_LISTED_FILES: usize = 200;

/// 处理器的成功产出
enum HandlerOutput {
    Done,
    Skipped(String),
    Text(String),
    Fact(FetchedPayload),
}

pub struct Dispatcher {
    desktop: Arc<dyn Desktop>,
    home: PathBuf,
    timeout: Duration,
}

impl Dispatcher {
    pub fn new(desktop: Arc<dyn Desktop>, home: impl Into<PathBuf>, timeout_secs: u64) -> Self {
        Self {
            desktop,
            home: home.into(),
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn home(&self) -> &std::path::Path {
        &self.home
    }

    pub fn desktop(&self) -> &Arc<dyn Desktop> {
        &self.desktop
    }

    pub fn resolve(&self, raw: &str) -> PathBuf {
        resolve_path(&self.home, raw)
    }

    /// 并发执行一批动作
    pub async fn dispatch(&self, actions: &[Action], cancel: &CancellationToken) -> DispatchReport {
        let runs = actions
            .iter()
            .enumerate()
            .map(|(index, action)| self.run_one(index, action, cancel));
        let mut report = DispatchReport::default();
        for (outcome, fetched) in join_all(runs).await {
            report.outcomes.push(outcome);
            if let Some(info) = fetched {
                report.fetched.push(info);
            }
        }
        report
    }

    async fn run_one(
        &self,
        index: usize,
        action: &Action,
        cancel: &CancellationToken,
    ) -> (ActionOutcome, Option<FetchedInfo>) {
        let start = Instant::now();
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ActionError::Cancelled),
            r = timeout(self.timeout, self.handle(action)) => {
                r.unwrap_or_else(|_| Err(ActionError::Timeout(self.timeout.as_secs())))
            }
        };

        let outcome_label = match &result {
            Ok(HandlerOutput::Skipped(_)) => "skipped",
            Ok(_) => "ok",
            Err(ActionError::Timeout(_)) => "timeout",
            Err(_) => "error",
        };
        let audit = serde_json::json!({
            "event": "action_audit",
            "action": action.id(),
            "index": index,
            "outcome": outcome_label,
            "duration_ms": start.elapsed().as_millis() as u64,
        });
        tracing::info!(audit = %audit.to_string(), "action");

        let fetched_path = || {
            action
                .path()
                .map(|p| self.resolve(p).to_string_lossy().to_string())
                .unwrap_or_default()
        };
        let mut outcome = ActionOutcome {
            index,
            id: action.id(),
            description: action.description().to_string(),
            status: ActionStatus::Succeeded,
            output: None,
        };
        let mut fetched = None;

        match result {
            Ok(HandlerOutput::Done) => {}
            Ok(HandlerOutput::Skipped(reason)) => outcome.status = ActionStatus::Skipped { reason },
            Ok(HandlerOutput::Text(text)) => outcome.output = Some(text),
            Ok(HandlerOutput::Fact(payload)) => {
                fetched = Some(FetchedInfo {
                    index,
                    action_id: action.id(),
                    description: action.description().to_string(),
                    path: fetched_path(),
                    payload,
                });
            }
            Err(e) => {
                tracing::warn!(action = action.id(), index, error = %e, "action failed");
                if action.is_request() {
                    fetched = Some(FetchedInfo {
                        index,
                        action_id: action.id(),
                        description: action.description().to_string(),
                        path: fetched_path(),
                        payload: FetchedPayload::Error(e.to_string()),
                    });
                }
                outcome.status = ActionStatus::Failed {
                    error: e.to_string(),
                };
            }
        }
        (outcome, fetched)
    }

    /// 穷尽匹配：新增动作种类而未添加处理器将无法通过编译
    async fn handle(&self, action: &Action) -> Result<HandlerOutput, ActionError> {
        match action {
            Action::DisplayText { content, .. } => Ok(HandlerOutput::Text(content.clone())),
            Action::OpenUrl { url, .. } => {
                reqwest::Url::parse(url).map_err(|_| ActionError::InvalidUrl(url.clone()))?;
                self.desktop.open_url(url).await?;
                Ok(HandlerOutput::Done)
            }
            Action::ExecuteFile { path, .. } => {
                self.desktop.open_path(&self.resolve(path)).await?;
                Ok(HandlerOutput::Done)
            }
            Action::RevealPath { path, .. } => {
                self.desktop.reveal_path(&self.resolve(path)).await?;
                Ok(HandlerOutput::Done)
            }
            Action::CreateFile {
                path,
                content,
                overwrite,
                ..
            } => {
                let target = self.resolve(path);
                if !overwrite && self.desktop.exists(&target).await {
                    tracing::info!(path = %target.display(), "create_file skipped, target exists");
                    return Ok(HandlerOutput::Skipped(format!(
                        "{} already exists and overwrite is false",
                        target.display()
                    )));
                }
                let body = content.as_deref().unwrap_or("");
                self.desktop.write_file(&target, body.as_bytes()).await?;
                Ok(HandlerOutput::Done)
            }
            Action::CopyToClipboard { content, .. } => {
                self.desktop.copy_to_clipboard(content).await?;
                Ok(HandlerOutput::Done)
            }
            Action::RequestListFiles { path, pattern, .. } => {
                let dir = self.resolve(path);
                let matcher = pattern
                    .as_deref()
                    .filter(|p| !p.trim().is_empty())
                    .map(|p| {
                        glob::Pattern::new(p).map_err(|e| ActionError::InvalidPattern {
                            pattern: p.to_string(),
                            reason: e.to_string(),
                        })
                    })
                    .transpose()?;
                let mut files = self.desktop.list_dir(&dir).await?;
                if let Some(m) = &matcher {
                    files.retain(|f| m.matches(&f.name));
                }
                files.sort_by(|a, b| a.name.cmp(&b.name));
                let total_count = files.len();
                files.truncate(MAX_LISTED_FILES);
                Ok(HandlerOutput::Fact(FetchedPayload::FileList(FileListResult {
                    files,
                    total_count,
                })))
            }
            Action::RequestStatPath { path, .. } => {
                let info = self.desktop.stat(&self.resolve(path)).await?;
                Ok(HandlerOutput::Fact(FetchedPayload::PathInfo(info)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::desktop::{DesktopCall, RecordingDesktop};

    fn dispatcher(home: &std::path::Path) -> (Dispatcher, Arc<RecordingDesktop>) {
        let desktop = Arc::new(RecordingDesktop::new().failing_url("broken.example"));
        (Dispatcher::new(desktop.clone(), home, 5), desktop)
    }

    fn create(path: &str, content: Option<&str>, overwrite: bool) -> Action {
        Action::CreateFile {
            description: "create".into(),
            path: path.into(),
            content: content.map(String::from),
            overwrite,
        }
    }

    #[tokio::test]
    async fn test_create_file_guard_keeps_existing_bytes() {
        let home = tempfile::tempdir().unwrap();
        let target = home.path().join("notes.txt");
        std::fs::write(&target, "original").unwrap();
        let (d, _) = dispatcher(home.path());

        let report = d
            .dispatch(&[create("notes.txt", Some("new"), false)], &CancellationToken::new())
            .await;

        assert!(matches!(report.outcomes[0].status, ActionStatus::Skipped { .. }));
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "original");
    }

    #[tokio::test]
    async fn test_create_file_overwrite_replaces_content() {
        let home = tempfile::tempdir().unwrap();
        let target = home.path().join("notes.txt");
        std::fs::write(&target, "original content that is longer").unwrap();
        let (d, _) = dispatcher(home.path());

        let report = d
            .dispatch(&[create("~/notes.txt", Some("new"), true)], &CancellationToken::new())
            .await;

        assert_eq!(report.outcomes[0].status, ActionStatus::Succeeded);
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "new");
    }

    #[tokio::test]
    async fn test_create_file_null_content_and_nested_dirs() {
        let home = tempfile::tempdir().unwrap();
        let (d, _) = dispatcher(home.path());

        let report = d
            .dispatch(&[create("a/b/empty.txt", None, false)], &CancellationToken::new())
            .await;

        assert_eq!(report.outcomes[0].status, ActionStatus::Succeeded);
        assert_eq!(
            std::fs::read_to_string(home.path().join("a/b/empty.txt")).unwrap(),
            ""
        );
    }

    #[tokio::test]
    async fn test_effects_resolve_paths_and_return_no_facts() {
        let home = tempfile::tempdir().unwrap();
        let (d, desktop) = dispatcher(home.path());
        let actions = vec![
            Action::OpenUrl {
                description: "yt".into(),
                url: "https://www.youtube.com".into(),
            },
            Action::RevealPath {
                description: "docs".into(),
                path: "~/Documents".into(),
            },
            Action::ExecuteFile {
                description: "run".into(),
                path: "script.sh".into(),
            },
            Action::CopyToClipboard {
                description: "copy".into(),
                content: "hello".into(),
            },
            Action::DisplayText {
                description: "show".into(),
                content: "shown".into(),
            },
        ];

        let report = d.dispatch(&actions, &CancellationToken::new()).await;

        assert!(report.fetched.is_empty());
        assert_eq!(report.failures().count(), 0);
        assert_eq!(report.outcomes[4].output.as_deref(), Some("shown"));
        let calls = desktop.calls();
        assert_eq!(calls.len(), 4);
        assert!(calls.contains(&DesktopCall::RevealPath(home.path().join("Documents"))));
        assert!(calls.contains(&DesktopCall::OpenPath(home.path().join("script.sh"))));
        assert!(calls.contains(&DesktopCall::Clipboard("hello".into())));
    }

    #[tokio::test]
    async fn test_failure_is_isolated_per_action() {
        let home = tempfile::tempdir().unwrap();
        let (d, desktop) = dispatcher(home.path());
        let actions = vec![
            Action::OpenUrl {
                description: "bad".into(),
                url: "https://broken.example/x".into(),
            },
            Action::OpenUrl {
                description: "not a url".into(),
                url: "youtube".into(),
            },
            create("ok.txt", Some("fine"), false),
        ];

        let report = d.dispatch(&actions, &CancellationToken::new()).await;

        assert!(report.outcomes[0].is_failure());
        assert!(report.outcomes[1].is_failure());
        assert_eq!(report.outcomes[2].status, ActionStatus::Succeeded);
        assert!(home.path().join("ok.txt").exists());
        assert!(desktop.calls().is_empty());
    }

    #[tokio::test]
    async fn test_list_files_with_pattern() {
        let home = tempfile::tempdir().unwrap();
        let docs = home.path().join("Documents");
        std::fs::create_dir(&docs).unwrap();
        std::fs::write(docs.join("b.txt"), "bb").unwrap();
        std::fs::write(docs.join("a.txt"), "a").unwrap();
        std::fs::write(docs.join("c.md"), "c").unwrap();
        let (d, _) = dispatcher(home.path());

        let report = d
            .dispatch(
                &[Action::RequestListFiles {
                    description: "txt files".into(),
                    path: "Documents".into(),
                    pattern: Some("*.txt".into()),
                }],
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(report.fetched.len(), 1);
        let FetchedPayload::FileList(list) = &report.fetched[0].payload else {
            panic!("expected file list");
        };
        assert_eq!(list.total_count, 2);
        let names: Vec<_> = list.files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "b.txt"]);
        assert_eq!(list.files[1].size, Some(2));
        assert_eq!(report.fetched[0].path, docs.to_string_lossy());
    }

    #[tokio::test]
    async fn test_failed_request_still_reports_fact() {
        let home = tempfile::tempdir().unwrap();
        let (d, _) = dispatcher(home.path());

        let report = d
            .dispatch(
                &[
                    Action::RequestListFiles {
                        description: "missing".into(),
                        path: "nope".into(),
                        pattern: None,
                    },
                    Action::RequestStatPath {
                        description: "stat".into(),
                        path: "nope".into(),
                    },
                ],
                &CancellationToken::new(),
            )
            .await;

        assert!(report.outcomes[0].is_failure());
        assert!(matches!(report.fetched[0].payload, FetchedPayload::Error(_)));
        let FetchedPayload::PathInfo(info) = &report.fetched[1].payload else {
            panic!("expected path info");
        };
        assert!(!info.exists);
    }

    #[tokio::test]
    async fn test_same_input_same_report() {
        let home = tempfile::tempdir().unwrap();
        std::fs::write(home.path().join("x.txt"), "x").unwrap();
        let (d, _) = dispatcher(home.path());
        let actions = vec![
            Action::RequestStatPath {
                description: "s".into(),
                path: "x.txt".into(),
            },
            Action::RequestListFiles {
                description: "l".into(),
                path: ".".into(),
                pattern: None,
            },
            Action::DisplayText {
                description: "d".into(),
                content: "c".into(),
            },
        ];

        let first = d.dispatch(&actions, &CancellationToken::new()).await;
        let second = d.dispatch(&actions, &CancellationToken::new()).await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_cancelled_batch() {
        let home = tempfile::tempdir().unwrap();
        let (d, _) = dispatcher(home.path());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = d.dispatch(&[create("c.txt", Some("x"), false)], &cancel).await;
        assert!(report.outcomes[0].is_failure());
    }

    #[tokio::test]
    async fn test_list_files_is_capped() {
        let home = tempfile::tempdir().unwrap();
        for i in 0..MAX_LISTED_FILES + 5 {
            std::fs::write(home.path().join(format!("f{i:04}.log")), "").unwrap();
        }
        let (d, _) = dispatcher(home.path());

        let report = d
            .dispatch(
                &[Action::RequestListFiles {
                    description: "logs".into(),
                    path: "~".into(),
                    pattern: None,
                }],
                &CancellationToken::new(),
            )
            .await;

        let FetchedPayload::FileList(list) = &report.fetched[0].payload else {
            panic!("expected file list");
        };
        assert_eq!(list.files.len(), MAX_LISTED_FILES);
        assert_eq!(list.total_count, MAX_LISTED_FILES + 5);
        assert_eq!(list.files[0].name, "f0000.log");
    }

    /// 打开 URL 时卡住的桌面
    struct StalledDesktop;

    #[async_trait::async_trait]
    impl Desktop for StalledDesktop {
        async fn open_url(&self, _url: &str) -> Result<(), ActionError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        }
        async fn open_path(&self, _path: &std::path::Path) -> Result<(), ActionError> {
            Ok(())
        }
        async fn reveal_path(&self, _path: &std::path::Path) -> Result<(), ActionError> {
            Ok(())
        }
        async fn copy_to_clipboard(&self, _text: &str) -> Result<(), ActionError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_stalled_action_times_out_alone() {
        let home = tempfile::tempdir().unwrap();
        let d = Dispatcher::new(Arc::new(StalledDesktop), home.path(), 1);

        let report = d
            .dispatch(
                &[
                    Action::OpenUrl {
                        description: "slow".into(),
                        url: "https://slow.example".into(),
                    },
                    Action::DisplayText {
                        description: "say".into(),
                        content: "still here".into(),
                    },
                ],
                &CancellationToken::new(),
            )
            .await;

        let ActionStatus::Failed { error } = &report.outcomes[0].status else {
            panic!("expected timeout failure");
        };
        assert_eq!(error, &ActionError::Timeout(1).to_string());
        assert_eq!(report.outcomes[1].status, ActionStatus::Succeeded);
        assert_eq!(report.outcomes[1].output.as_deref(), Some("still here"));
    }
}
