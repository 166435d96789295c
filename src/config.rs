//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `PARROT__*` 覆盖（双下划线表示嵌套，如 `PARROT__LLM__PROVIDER=ollama`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub engine: EngineSection,
    pub session: SessionSection,
}

/// [app] 段：应用名、home 目录覆盖
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
    /// 解析相对路径时使用的 home 目录；未设置时用 dirs::home_dir()
    pub home_dir: Option<PathBuf>,
}

/// [llm] 段：后端选择、默认模型与超时
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：ollama / openai / deepseek / mock
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    #[serde(default)]
    pub ollama: LlmOllamaSection,
    #[serde(default)]
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            ollama: LlmOllamaSection::default(),
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

fn default_provider() -> String {
    "ollama".to_string()
}

fn default_model() -> String {
    "llama3.1:8b-instruct-q4_0".to_string()
}

/// [llm.ollama] 段：本地 Ollama 服务地址、是否由本进程拉起、缺模型时是否自动拉取
#[derive(Debug, Clone, Deserialize)]
pub struct LlmOllamaSection {
    #[serde(default = "default_ollama_host")]
    pub host: String,
    #[serde(default = "default_ollama_port")]
    pub port: u16,
    #[serde(default)]
    pub spawn_server: bool,
    #[serde(default)]
    pub auto_pull: bool,
}

impl Default for LlmOllamaSection {
    fn default() -> Self {
        Self {
            host: default_ollama_host(),
            port: default_ollama_port(),
            spawn_server: false,
            auto_pull: false,
        }
    }
}

fn default_ollama_host() -> String {
    "http://localhost".to_string()
}

fn default_ollama_port() -> u16 {
    11434
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmTimeoutsSection {
    /// 单次模型调用超时（秒）
    #[serde(default = "default_request_timeout")]
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: default_request_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    60
}

/// 请求类动作的执行时机
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RequestPolicy {
    /// 只含请求类动作的响应在规划阶段立即执行并重新提问
    #[default]
    Eager,
    /// 所有动作都等待调用方显式执行
    Deferred,
}

/// [engine] 段：轮数上限、单个动作超时、请求策略、是否注入已安装程序清单
#[derive(Debug, Clone, Deserialize)]
pub struct EngineSection {
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,
    #[serde(default = "default_action_timeout_secs")]
    pub action_timeout_secs: u64,
    #[serde(default)]
    pub request_policy: RequestPolicy,
    #[serde(default = "default_true")]
    pub include_installed_programs: bool,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            action_timeout_secs: default_action_timeout_secs(),
            request_policy: RequestPolicy::default(),
            include_installed_programs: true,
        }
    }
}

fn default_max_rounds() -> usize {
    4
}

fn default_action_timeout_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

/// [session] 段：是否跨命令保留上下文、保留轮数
#[derive(Debug, Clone, Deserialize)]
pub struct SessionSection {
    #[serde(default)]
    pub persist_history: bool,
    #[serde(default = "default_max_context_turns")]
    pub max_context_turns: usize,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            persist_history: false,
            max_context_turns: default_max_context_turns(),
        }
    }
}

fn default_max_context_turns() -> usize {
    10
}

/// 从 config 目录加载配置，环境变量 PARROT__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 PARROT__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("PARROT")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
