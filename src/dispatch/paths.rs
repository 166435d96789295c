//! 路径归一化
//!
//! 模型给出的路径一律相对用户 home 目录：去掉开头的 `~/`（或单独的 `~`）后拼到 home 下；
//! 绝对路径保持不变。

use std::path::{Path, PathBuf};

use crate::core::EngineError;

/// 把模型给出的路径解析为绝对路径
pub fn resolve_path(home: &Path, raw: &str) -> PathBuf {
    let trimmed = raw.trim();
    if trimmed == "~" {
        return home.to_path_buf();
    }
    if let Some(rest) = trimmed
        .strip_prefix("~/")
        .or_else(|| trimmed.strip_prefix("~\\"))
    {
        return home.join(rest.trim_start_matches(['/', '\\']));
    }
    let candidate = Path::new(trimmed);
    if candidate.is_absolute() {
        return candidate.to_path_buf();
    }
    let relative = trimmed.strip_prefix("./").unwrap_or(trimmed);
    home.join(relative)
}

/// home 目录：配置覆盖优先，否则取系统 home
pub fn resolve_home(configured: Option<&Path>) -> Result<PathBuf, EngineError> {
    if let Some(path) = configured {
        return Ok(path.to_path_buf());
    }
    dirs::home_dir()
        .ok_or_else(|| EngineError::Configuration("cannot resolve the home directory".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tilde_prefix_joins_home() {
        for home in ["/home/alice", "/Users/bob", "/tmp/x y"] {
            let home = Path::new(home);
            assert_eq!(resolve_path(home, "~/docs/a.txt"), home.join("docs/a.txt"));
        }
    }

    #[test]
    fn test_relative_and_bare_paths() {
        let home = Path::new("/home/alice");
        assert_eq!(resolve_path(home, "notes.txt"), home.join("notes.txt"));
        assert_eq!(resolve_path(home, "./Downloads"), home.join("Downloads"));
        assert_eq!(resolve_path(home, "~"), home.to_path_buf());
        assert_eq!(resolve_path(home, " ~/Desktop "), home.join("Desktop"));
    }

    #[cfg(unix)]
    #[test]
    fn test_absolute_paths_stay_absolute() {
        let home = Path::new("/home/alice");
        assert_eq!(resolve_path(home, "/etc/hosts"), PathBuf::from("/etc/hosts"));
        assert_eq!(resolve_path(home, "~//etc"), home.join("etc"));
    }

    #[test]
    fn test_configured_home_wins() {
        let home = resolve_home(Some(Path::new("/srv/home"))).unwrap();
        assert_eq!(home, PathBuf::from("/srv/home"));
    }
}
