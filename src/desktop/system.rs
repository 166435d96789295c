//! 真实桌面：通过平台自带程序完成打开 / 定位 / 剪贴板
//!
//! macOS 用 open / pbcopy，Windows 用 rundll32 url.dll / explorer / clip，其余（Linux 等）用 xdg-open 与 wl-copy / xclip。
//! 模型给出的目标只作为单个 argv 元素传给目标程序，任何平台都不经过 shell（Windows 不经过 cmd.exe）。
//! 启动通过 tokio::process，带 tracing 审计；文件系统原语沿用 Desktop 的默认实现。

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::desktop::{ActionError, Desktop, InstalledProgram};

#[derive(Debug, Clone, Default)]
pub struct SystemDesktop;

impl SystemDesktop {
    pub fn new() -> Self {
        Self
    }
}

/// 启动命令按平台选择；与编译目标分离，便于在任意主机上测试各平台的 argv
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    MacOs,
    Windows,
    /// Linux 及其它 freedesktop 平台
    Unix,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            Platform::MacOs
        } else if cfg!(target_os = "windows") {
            Platform::Windows
        } else {
            Platform::Unix
        }
    }
}

/// 一次外部程序调用（程序 + 参数）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Launch {
    pub program: &'static str,
    pub args: Vec<String>,
}

/// 用默认程序打开 URL 或路径
///
/// Windows 上 `cmd /C start` 会把 `&`、`|`、`^` 当作命令分隔符，因此改由 url.dll 的
/// FileProtocolHandler（ShellExecute）打开，目标原样作为一个参数。
pub fn open_launch(platform: Platform, target: &str) -> Launch {
    match platform {
        Platform::MacOs => Launch {
            program: "open",
            args: vec![target.to_string()],
        },
        Platform::Windows => Launch {
            program: "rundll32",
            args: vec![
                "url.dll,FileProtocolHandler".to_string(),
                target.to_string(),
            ],
        },
        Platform::Unix => Launch {
            program: "xdg-open",
            args: vec![target.to_string()],
        },
    }
}

/// 写剪贴板的程序；文本从 stdin 传入
pub fn clipboard_launch(platform: Platform, wayland: bool) -> Launch {
    let (program, args): (&'static str, &[&str]) = match platform {
        Platform::MacOs => ("pbcopy", &[]),
        Platform::Windows => ("clip", &[]),
        Platform::Unix if wayland => ("wl-copy", &[]),
        Platform::Unix => ("xclip", &["-selection", "clipboard"]),
    };
    Launch {
        program,
        args: args.iter().map(|a| a.to_string()).collect(),
    }
}

/// 写入剪贴板程序 stdin 的字节
///
/// clip.exe 按 OEM 代码页读取无 BOM 的输入，带 BOM 的 UTF-16LE 才能保留非 ASCII 字符。
pub fn clipboard_bytes(platform: Platform, text: &str) -> Vec<u8> {
    match platform {
        Platform::Windows => {
            let mut bytes = vec![0xFF, 0xFE];
            for unit in text.encode_utf16() {
                bytes.extend_from_slice(&unit.to_le_bytes());
            }
            bytes
        }
        Platform::MacOs | Platform::Unix => text.as_bytes().to_vec(),
    }
}

/// 运行一个外部程序并等待退出；`tolerate_status` 用于退出码不可靠的程序（explorer、rundll32）
async fn launch(call: &Launch, tolerate_status: bool) -> Result<(), ActionError> {
    tracing::info!(program = %call.program, args = ?call.args, "desktop launch");
    let status = Command::new(call.program)
        .args(&call.args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map_err(|e| ActionError::Launch {
            program: call.program.to_string(),
            reason: e.to_string(),
        })?;
    if status.success() || tolerate_status {
        Ok(())
    } else {
        Err(ActionError::Launch {
            program: call.program.to_string(),
            reason: format!("exited with {status}"),
        })
    }
}

async fn open_target(target: &str) -> Result<(), ActionError> {
    let platform = Platform::current();
    launch(&open_launch(platform, target), platform == Platform::Windows).await
}

#[async_trait]
impl Desktop for SystemDesktop {
    async fn open_url(&self, url: &str) -> Result<(), ActionError> {
        open_target(url).await
    }

    async fn open_path(&self, path: &Path) -> Result<(), ActionError> {
        open_target(&path.to_string_lossy()).await
    }

    async fn reveal_path(&self, path: &Path) -> Result<(), ActionError> {
        let target = path.to_string_lossy().to_string();
        match Platform::current() {
            Platform::MacOs => {
                let call = Launch {
                    program: "open",
                    args: vec!["-R".to_string(), target],
                };
                launch(&call, false).await
            }
            Platform::Windows => {
                let call = Launch {
                    program: "explorer",
                    args: vec![format!("/select,{target}")],
                };
                launch(&call, true).await
            }
            Platform::Unix => {
                // xdg-open 无「选中」语义：文件则打开其所在目录
                let dir = if self.stat(path).await.map(|i| i.is_directory).unwrap_or(false) {
                    path.to_path_buf()
                } else {
                    path.parent().map(Path::to_path_buf).unwrap_or_else(|| path.to_path_buf())
                };
                open_target(&dir.to_string_lossy()).await
            }
        }
    }

    async fn copy_to_clipboard(&self, text: &str) -> Result<(), ActionError> {
        let platform = Platform::current();
        let call = clipboard_launch(platform, std::env::var_os("WAYLAND_DISPLAY").is_some());
        tracing::info!(program = %call.program, chars = text.chars().count(), "clipboard write");
        let launch_err = |reason: String| ActionError::Launch {
            program: call.program.to_string(),
            reason,
        };
        let mut child = Command::new(call.program)
            .args(&call.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| launch_err(e.to_string()))?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&clipboard_bytes(platform, text))
                .await
                .map_err(|e| launch_err(e.to_string()))?;
        }
        let status = child.wait().await.map_err(|e| launch_err(e.to_string()))?;
        if status.success() {
            Ok(())
        } else {
            Err(launch_err(format!("exited with {status}")))
        }
    }

    async fn installed_programs(&self) -> Vec<InstalledProgram> {
        match Platform::current() {
            Platform::MacOs => scan_app_bundles(Path::new("/Applications")).await,
            Platform::Windows => {
                match tokio::task::spawn_blocking(registry::installed_programs).await {
                    Ok(programs) => programs,
                    Err(e) => {
                        tracing::warn!(error = %e, "registry scan failed");
                        Vec::new()
                    }
                }
            }
            Platform::Unix => {
                let mut search_dirs = vec![PathBuf::from("/usr/share/applications")];
                if let Some(data) = dirs::data_dir() {
                    search_dirs.push(data.join("applications"));
                }
                let mut programs = Vec::new();
                for dir in search_dirs {
                    programs.extend(scan_desktop_entries(&dir).await);
                }
                sort_and_dedup(&mut programs);
                programs
            }
        }
    }
}

fn sort_and_dedup(programs: &mut Vec<InstalledProgram>) {
    programs.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
    programs.dedup_by(|a, b| a.name == b.name);
}

/// 注册表 Uninstall 键下的一项 → InstalledProgram；没有 DisplayName 的条目（补丁、组件）跳过
pub fn uninstall_entry(
    key: &str,
    display_name: Option<String>,
    install_location: Option<String>,
    version: Option<String>,
    publisher: Option<String>,
) -> Option<InstalledProgram> {
    let name = display_name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())?;
    let non_empty = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
    Some(InstalledProgram {
        name,
        path: non_empty(install_location).unwrap_or_else(|| key.to_string()),
        version: non_empty(version),
        publisher: non_empty(publisher),
    })
}

/// Windows：HKLM 下 64 位与 32 位（WOW6432Node）的 Uninstall 键
#[cfg(windows)]
mod registry {
    use winreg::enums::{HKEY_LOCAL_MACHINE, KEY_READ};
    use winreg::RegKey;

    use super::{sort_and_dedup, uninstall_entry};
    use crate::desktop::InstalledProgram;

    const UNINSTALL_PATHS: [&str; 2] = [
        "SOFTWARE\\Microsoft\\Windows\\CurrentVersion\\Uninstall",
        "SOFTWARE\\WOW6432Node\\Microsoft\\Windows\\CurrentVersion\\Uninstall",
    ];

    pub fn installed_programs() -> Vec<InstalledProgram> {
        let hklm = RegKey::predef(HKEY_LOCAL_MACHINE);
        let mut programs = Vec::new();
        for path in UNINSTALL_PATHS {
            let Ok(uninstall) = hklm.open_subkey_with_flags(path, KEY_READ) else {
                tracing::debug!(path, "uninstall key not readable");
                continue;
            };
            for name in uninstall.enum_keys().flatten() {
                let Ok(sub) = uninstall.open_subkey_with_flags(&name, KEY_READ) else {
                    continue;
                };
                let value = |field: &str| sub.get_value::<String, _>(field).ok();
                if let Some(program) = uninstall_entry(
                    &format!("HKLM\\{path}\\{name}"),
                    value("DisplayName"),
                    value("InstallLocation"),
                    value("DisplayVersion"),
                    value("Publisher"),
                ) {
                    programs.push(program);
                }
            }
        }
        sort_and_dedup(&mut programs);
        programs
    }
}

#[cfg(not(windows))]
mod registry {
    use crate::desktop::InstalledProgram;

    pub fn installed_programs() -> Vec<InstalledProgram> {
        Vec::new()
    }
}

/// macOS：/Applications 下的 *.app
async fn scan_app_bundles(dir: &Path) -> Vec<InstalledProgram> {
    let mut programs = Vec::new();
    let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
        return programs;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            let display_name = name.strip_suffix(".app").unwrap_or(name).to_string();
            programs.push(InstalledProgram {
                name: display_name,
                path: path.to_string_lossy().to_string(),
                version: None,
                publisher: None,
            });
        }
    }
    programs.sort_by(|a, b| a.name.cmp(&b.name));
    programs
}

/// Linux：*.desktop 条目
async fn scan_desktop_entries(dir: &Path) -> Vec<InstalledProgram> {
    let mut programs = Vec::new();
    let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
        return programs;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("desktop") {
            continue;
        }
        if let Ok(text) = tokio::fs::read_to_string(&path).await {
            if let Some(program) = parse_desktop_entry(&text, &path) {
                programs.push(program);
            }
        }
    }
    programs
}

/// 解析 [Desktop Entry] 段的 Name / Exec；NoDisplay=true 或 Hidden=true 的条目跳过
pub fn parse_desktop_entry(text: &str, file: &Path) -> Option<InstalledProgram> {
    let mut in_entry = false;
    let mut name = None;
    let mut exec = None;
    for line in text.lines().map(str::trim) {
        if line.starts_with('[') {
            in_entry = line == "[Desktop Entry]";
            continue;
        }
        if !in_entry {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        match key.trim() {
            "Name" if name.is_none() => name = Some(value.trim().to_string()),
            "Exec" if exec.is_none() => {
                exec = value.split_whitespace().next().map(str::to_string);
            }
            "NoDisplay" | "Hidden" if value.trim().eq_ignore_ascii_case("true") => return None,
            _ => {}
        }
    }
    Some(InstalledProgram {
        name: name?,
        path: exec.unwrap_or_else(|| file.to_string_lossy().to_string()),
        version: None,
        publisher: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_desktop_entry() {
        let text = "[Desktop Entry]\nVersion=1.0\nName=Firefox\nName[de]=Firefox DE\nExec=firefox %u\n\n[Desktop Action new-window]\nName=New Window\n";
        let program = parse_desktop_entry(text, Path::new("/usr/share/applications/firefox.desktop"))
            .unwrap();
        assert_eq!(program.name, "Firefox");
        assert_eq!(program.path, "firefox");
    }

    #[test]
    fn test_hidden_entries_skipped() {
        let text = "[Desktop Entry]\nName=Helper\nNoDisplay=true\nExec=helper\n";
        assert!(parse_desktop_entry(text, Path::new("helper.desktop")).is_none());
        assert!(parse_desktop_entry("[Other]\nName=x\n", Path::new("x.desktop")).is_none());
    }

    #[test]
    fn test_windows_open_keeps_target_as_one_argument() {
        for target in ["https://x.example/?a=1&calc", "C:\\Users\\me\\a&calc.exe", "x|y^z"] {
            let call = open_launch(Platform::Windows, target);
            assert_ne!(call.program, "cmd");
            assert!(call.args.iter().all(|a| !a.eq_ignore_ascii_case("/c")));
            assert_eq!(call.args.last().map(String::as_str), Some(target));
        }
    }

    #[test]
    fn test_open_launch_per_platform() {
        let mac = open_launch(Platform::MacOs, "/tmp/a b");
        assert_eq!((mac.program, mac.args), ("open", vec!["/tmp/a b".to_string()]));
        let unix = open_launch(Platform::Unix, "https://example.com");
        assert_eq!(unix.program, "xdg-open");
        assert_eq!(unix.args, vec!["https://example.com".to_string()]);
    }

    #[test]
    fn test_windows_clipboard_is_utf16_with_bom() {
        let text = "café 日本";
        let bytes = clipboard_bytes(Platform::Windows, text);
        assert_eq!(&bytes[..2], &[0xFF, 0xFE]);
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();
        assert_eq!(String::from_utf16(&units).unwrap(), text);

        assert_eq!(clipboard_bytes(Platform::MacOs, text), text.as_bytes());
        assert_eq!(clipboard_launch(Platform::Windows, false).program, "clip");
        assert_eq!(clipboard_launch(Platform::Unix, true).program, "wl-copy");
    }

    #[test]
    fn test_uninstall_entry() {
        let program = uninstall_entry(
            "HKLM\\...\\7-Zip",
            Some("7-Zip 23.01 (x64)".to_string()),
            Some("C:\\Program Files\\7-Zip\\".to_string()),
            Some("23.01".to_string()),
            Some(" Igor Pavlov ".to_string()),
        )
        .unwrap();
        assert_eq!(program.name, "7-Zip 23.01 (x64)");
        assert_eq!(program.path, "C:\\Program Files\\7-Zip\\");
        assert_eq!(program.version.as_deref(), Some("23.01"));
        assert_eq!(program.publisher.as_deref(), Some("Igor Pavlov"));

        let no_location =
            uninstall_entry("HKLM\\x\\Tool", Some("Tool".into()), Some(String::new()), None, None)
                .unwrap();
        assert_eq!(no_location.path, "HKLM\\x\\Tool");
        assert!(uninstall_entry("KB5001", None, None, None, None).is_none());
        assert!(uninstall_entry("x", Some("  ".into()), None, None, None).is_none());
    }

    #[tokio::test]
    async fn test_scan_app_bundles() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("Safari.app")).unwrap();
        std::fs::create_dir(dir.path().join("Notes.app")).unwrap();
        let programs = scan_app_bundles(dir.path()).await;
        let names: Vec<_> = programs.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Notes", "Safari"]);
    }
}
