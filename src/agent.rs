//! 运行时装配
//!
//! 按配置选择模型后端、解析 home 目录、构建 Planner / Dispatcher / Orchestrator；
//! 使用 Ollama 时可选地拉起本地服务并确保默认模型已安装。

use std::sync::Arc;

use crate::config::AppConfig;
use crate::core::EngineError;
use crate::desktop::Desktop;
use crate::dispatch::{resolve_home, Dispatcher};
use crate::engine::{LoopSettings, Orchestrator, Planner};
use crate::llm::{
    create_deepseek_client, LlmClient, LlmError, MockLlmClient, OllamaClient, OllamaServer,
    OpenAiClient,
};

/// 等待本地 Ollama 服务就绪的轮询次数（每次 250ms）
const OLLAMA_READY_ATTEMPTS: usize = 40;

/// 按配置的 Ollama 地址构建客户端；llm.base_url 优先
pub fn ollama_client(cfg: &AppConfig) -> OllamaClient {
    match cfg.llm.base_url.as_deref() {
        Some(base) => OllamaClient::new(base),
        None => OllamaClient::from_host_port(&cfg.llm.ollama.host, cfg.llm.ollama.port),
    }
}

/// 按 llm.provider 选择后端；缺少所需 API Key 或 provider 未知时退回 Mock
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    match provider.as_str() {
        "ollama" => {
            let client = ollama_client(cfg);
            tracing::info!(base_url = %client.base_url(), "Using Ollama LLM");
            Arc::new(client)
        }
        "deepseek" => {
            tracing::info!("Using DeepSeek LLM");
            Arc::new(create_deepseek_client())
        }
        "openai" => match std::env::var("OPENAI_API_KEY") {
            Ok(key) => {
                tracing::info!("Using OpenAI-compatible LLM");
                Arc::new(OpenAiClient::new(cfg.llm.base_url.as_deref(), Some(&key)))
            }
            Err(_) => {
                tracing::warn!("OPENAI_API_KEY not set, using Mock LLM");
                Arc::new(MockLlmClient::new())
            }
        },
        "mock" => Arc::new(MockLlmClient::new()),
        other => {
            tracing::warn!(provider = %other, "Unknown LLM provider, using Mock LLM");
            Arc::new(MockLlmClient::new())
        }
    }
}

/// 由配置与给定后端、桌面构建编排器
pub fn create_orchestrator_with(
    cfg: &AppConfig,
    llm: Arc<dyn LlmClient>,
    desktop: Arc<dyn Desktop>,
) -> Result<Orchestrator, EngineError> {
    let home = resolve_home(cfg.app.home_dir.as_deref())?;
    tracing::info!(home = %home.display(), backend = llm.backend(), "orchestrator ready");
    let planner = Planner::new(llm, cfg.llm.timeouts.request);
    let dispatcher = Dispatcher::new(desktop, home, cfg.engine.action_timeout_secs);
    Orchestrator::new(planner, dispatcher, LoopSettings::from(&cfg.engine))
}

/// 由配置构建编排器（后端按 llm.provider 选择）
pub fn create_orchestrator(
    cfg: &AppConfig,
    desktop: Arc<dyn Desktop>,
) -> Result<Orchestrator, EngineError> {
    create_orchestrator_with(cfg, create_llm_from_config(cfg), desktop)
}

/// Ollama 准备：按需拉起 `ollama serve` 并等待就绪，按需拉取默认模型
///
/// 返回的 OllamaServer 需由调用方持有，Drop 时子进程随之结束。
pub async fn prepare_ollama(cfg: &AppConfig) -> Result<Option<OllamaServer>, LlmError> {
    if !cfg.llm.provider.eq_ignore_ascii_case("ollama") {
        return Ok(None);
    }
    let client = ollama_client(cfg);
    let mut server = None;
    if cfg.llm.ollama.spawn_server && client.list_models().await.is_err() {
        let mut spawned = OllamaServer::new(cfg.llm.ollama.host.clone(), cfg.llm.ollama.port);
        spawned
            .spawn()
            .map_err(|e| LlmError::Request(format!("cannot start ollama: {e}")))?;
        if !spawned.wait_ready(&client, OLLAMA_READY_ATTEMPTS).await {
            return Err(LlmError::Request(
                "ollama server did not become ready".to_string(),
            ));
        }
        server = Some(spawned);
    }
    if cfg.llm.ollama.auto_pull && client.ensure_model(&cfg.llm.model).await? {
        tracing::info!(model = %cfg.llm.model, "model pulled");
    }
    Ok(server)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::desktop::RecordingDesktop;

    #[test]
    fn test_provider_selection() {
        let mut cfg = AppConfig::default();
        assert_eq!(create_llm_from_config(&cfg).backend(), "ollama");

        cfg.llm.provider = "mock".into();
        assert_eq!(create_llm_from_config(&cfg).backend(), "mock");

        cfg.llm.provider = "something-else".into();
        assert_eq!(create_llm_from_config(&cfg).backend(), "mock");
    }

    #[test]
    fn test_ollama_base_url_override() {
        let mut cfg = AppConfig::default();
        assert_eq!(ollama_client(&cfg).base_url(), "http://localhost:11434");
        cfg.llm.base_url = Some("http://10.0.0.2:9999/".into());
        assert_eq!(ollama_client(&cfg).base_url(), "http://10.0.0.2:9999");
    }

    #[test]
    fn test_orchestrator_from_config() {
        let home = tempfile::tempdir().unwrap();
        let mut cfg = AppConfig::default();
        cfg.app.home_dir = Some(home.path().to_path_buf());
        cfg.llm.provider = "mock".into();
        let orch = create_orchestrator(&cfg, Arc::new(RecordingDesktop::new())).unwrap();
        assert_eq!(orch.dispatcher().home(), home.path());
        assert_eq!(orch.settings().max_rounds, 4);

        cfg.engine.max_rounds = 0;
        assert!(create_orchestrator(&cfg, Arc::new(RecordingDesktop::new())).is_err());
    }

    #[tokio::test]
    async fn test_prepare_skipped_for_other_providers() {
        let mut cfg = AppConfig::default();
        cfg.llm.provider = "mock".into();
        assert!(prepare_ollama(&cfg).await.unwrap().is_none());
    }
}
