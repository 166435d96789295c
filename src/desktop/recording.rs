//! 记录型桌面（用于测试与演练，不启动任何外部程序）
//!
//! 启动类调用只记录为 DesktopCall；文件系统原语沿用默认实现，因此对临时目录的读写是真实的。

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::desktop::{ActionError, Desktop, InstalledProgram};

/// 被记录的一次启动类调用
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DesktopCall {
    OpenUrl(String),
    OpenPath(PathBuf),
    RevealPath(PathBuf),
    Clipboard(String),
}

#[derive(Debug, Default)]
pub struct RecordingDesktop {
    calls: Mutex<Vec<DesktopCall>>,
    programs: Vec<InstalledProgram>,
    /// 打开包含该子串的 URL 时返回失败
    failing_url: Option<String>,
}

impl RecordingDesktop {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_programs(mut self, programs: Vec<InstalledProgram>) -> Self {
        self.programs = programs;
        self
    }

    pub fn failing_url(mut self, fragment: impl Into<String>) -> Self {
        self.failing_url = Some(fragment.into());
        self
    }

    pub fn calls(&self) -> Vec<DesktopCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn record(&self, call: DesktopCall) {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(call);
    }
}

#[async_trait]
impl Desktop for RecordingDesktop {
    async fn open_url(&self, url: &str) -> Result<(), ActionError> {
        if let Some(fragment) = &self.failing_url {
            if url.contains(fragment.as_str()) {
                return Err(ActionError::Launch {
                    program: "browser".to_string(),
                    reason: "simulated failure".to_string(),
                });
            }
        }
        self.record(DesktopCall::OpenUrl(url.to_string()));
        Ok(())
    }

    async fn open_path(&self, path: &Path) -> Result<(), ActionError> {
        self.record(DesktopCall::OpenPath(path.to_path_buf()));
        Ok(())
    }

    async fn reveal_path(&self, path: &Path) -> Result<(), ActionError> {
        self.record(DesktopCall::RevealPath(path.to_path_buf()));
        Ok(())
    }

    async fn copy_to_clipboard(&self, text: &str) -> Result<(), ActionError> {
        self.record(DesktopCall::Clipboard(text.to_string()));
        Ok(())
    }

    async fn installed_programs(&self) -> Vec<InstalledProgram> {
        self.programs.clone()
    }
}
