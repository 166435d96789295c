//! 桌面自动化边界
//!
//! Desktop trait 是派发器接触外部世界的唯一入口：打开 URL / 路径、在文件管理器中定位、写剪贴板、
//! 已安装程序清单，以及文件系统原语（默认基于 tokio::fs 实现，测试替身只需覆盖启动类方法）。

pub mod recording;
pub mod system;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::io::AsyncWriteExt;

pub use recording::{DesktopCall, RecordingDesktop};
pub use system::SystemDesktop;

/// 单个动作执行失败的原因；按动作隔离，不影响同批其它动作
#[derive(Error, Debug)]
pub enum ActionError {
    #[error("{}: {}", .path.display(), .source)]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot launch {program}: {reason}")]
    Launch { program: String, reason: String },

    #[error("invalid URL '{0}'")]
    InvalidUrl(String),

    #[error("invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("timed out after {0}s")]
    Timeout(u64),

    #[error("cancelled")]
    Cancelled,
}

impl ActionError {
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        ActionError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// 目录列表中的一项
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileEntry {
    pub name: String,
    pub path: String,
    pub is_directory: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// 路径状态（不跟随符号链接）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathInfo {
    pub path: String,
    pub exists: bool,
    pub is_directory: bool,
    pub is_symlink: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// RFC 3339
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<String>,
}

/// 已安装程序
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstalledProgram {
    pub name: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
}

/// 注入 system prompt 的程序清单最多条目数
const MAX_INVENTORY_ENTRIES: usize = 200;

/// 渲染已安装程序清单；为空时返回 None
pub fn render_inventory(programs: &[InstalledProgram]) -> Option<String> {
    if programs.is_empty() {
        return None;
    }
    let mut out = String::from("Installed programs on this computer:\n");
    for p in programs.iter().take(MAX_INVENTORY_ENTRIES) {
        out.push_str(&format!("- {} ({})\n", p.name, p.path));
    }
    if programs.len() > MAX_INVENTORY_ENTRIES {
        out.push_str(&format!(
            "... and {} more\n",
            programs.len() - MAX_INVENTORY_ENTRIES
        ));
    }
    Some(out)
}

#[async_trait]
pub trait Desktop: Send + Sync {
    async fn open_url(&self, url: &str) -> Result<(), ActionError>;

    /// 用默认关联程序打开文件或目录
    async fn open_path(&self, path: &Path) -> Result<(), ActionError>;

    /// 在文件管理器中定位
    async fn reveal_path(&self, path: &Path) -> Result<(), ActionError>;

    async fn copy_to_clipboard(&self, text: &str) -> Result<(), ActionError>;

    async fn installed_programs(&self) -> Vec<InstalledProgram> {
        Vec::new()
    }

    /// 路径是否存在（悬空符号链接也算存在）
    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::symlink_metadata(path).await.is_ok()
    }

    /// 创建或截断文件并写入全部内容（缺失的父目录一并创建）；文件句柄在返回前关闭
    async fn write_file(&self, path: &Path, content: &[u8]) -> Result<(), ActionError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ActionError::io(parent, e))?;
        }
        let mut file = tokio::fs::File::create(path)
            .await
            .map_err(|e| ActionError::io(path, e))?;
        file.write_all(content)
            .await
            .map_err(|e| ActionError::io(path, e))?;
        file.flush().await.map_err(|e| ActionError::io(path, e))?;
        Ok(())
    }

    async fn list_dir(&self, path: &Path) -> Result<Vec<FileEntry>, ActionError> {
        let mut dir = tokio::fs::read_dir(path)
            .await
            .map_err(|e| ActionError::io(path, e))?;
        let mut entries = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| ActionError::io(path, e))?
        {
            let meta = entry.metadata().await.ok();
            let is_directory = meta.as_ref().map(|m| m.is_dir()).unwrap_or(false);
            entries.push(FileEntry {
                name: entry.file_name().to_string_lossy().to_string(),
                path: entry.path().to_string_lossy().to_string(),
                is_directory,
                size: meta.filter(|m| m.is_file()).map(|m| m.len()),
            });
        }
        Ok(entries)
    }

    async fn stat(&self, path: &Path) -> Result<PathInfo, ActionError> {
        let display = path.to_string_lossy().to_string();
        match tokio::fs::symlink_metadata(path).await {
            Ok(meta) => Ok(PathInfo {
                path: display,
                exists: true,
                is_directory: meta.is_dir(),
                is_symlink: meta.file_type().is_symlink(),
                size: meta.is_file().then(|| meta.len()),
                modified: meta
                    .modified()
                    .ok()
                    .map(|t| chrono::DateTime::<chrono::Utc>::from(t).to_rfc3339()),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(PathInfo {
                path: display,
                exists: false,
                is_directory: false,
                is_symlink: false,
                size: None,
                modified: None,
            }),
            Err(e) => Err(ActionError::io(path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 只实现启动类方法，文件系统原语走默认实现
    struct Inert;

    #[async_trait]
    impl Desktop for Inert {
        async fn open_url(&self, _url: &str) -> Result<(), ActionError> {
            Ok(())
        }
        async fn open_path(&self, _path: &Path) -> Result<(), ActionError> {
            Ok(())
        }
        async fn reveal_path(&self, _path: &Path) -> Result<(), ActionError> {
            Ok(())
        }
        async fn copy_to_clipboard(&self, _text: &str) -> Result<(), ActionError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_write_then_stat() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        Inert.write_file(&file, b"hello").await.unwrap();

        let info = Inert.stat(&file).await.unwrap();
        assert!(info.exists);
        assert!(!info.is_directory);
        assert_eq!(info.size, Some(5));
        assert!(info.modified.is_some());

        let missing = Inert.stat(&dir.path().join("nope")).await.unwrap();
        assert!(!missing.exists);
    }

    #[tokio::test]
    async fn test_write_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, "a much longer previous body").unwrap();
        Inert.write_file(&file, b"short").await.unwrap();
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "short");
    }

    #[tokio::test]
    async fn test_list_dir_reports_types() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("f.txt"), "1234").unwrap();

        let mut entries = Inert.list_dir(dir.path()).await.unwrap();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "f.txt");
        assert_eq!(entries[0].size, Some(4));
        assert!(entries[1].is_directory);
        assert_eq!(entries[1].size, None);

        assert!(Inert.list_dir(&dir.path().join("missing")).await.is_err());
    }

    #[test]
    fn test_render_inventory() {
        assert!(render_inventory(&[]).is_none());
        let text = render_inventory(&[InstalledProgram {
            name: "Firefox".into(),
            path: "/usr/bin/firefox".into(),
            version: None,
            publisher: None,
        }])
        .unwrap();
        assert!(text.contains("- Firefox (/usr/bin/firefox)"));
    }
}
