//! Ollama 客户端（本地模型，默认后端）
//!
//! - `POST /api/chat`（stream=false，format 为输出 JSON Schema）完成对话
//! - `GET /api/tags` 列出已安装模型，`POST /api/pull` 拉取模型
//! - OllamaServer 可选地由本进程拉起 `ollama serve`，并提供存活检查

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::{Child, Command};

use crate::context::Message;
use crate::llm::{ChatRequest, LlmClient, LlmError};

/// Ollama HTTP 客户端
pub struct OllamaClient {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct ChatReply {
    message: ReplyMessage,
}

#[derive(Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: String,
}

/// 已安装模型（/api/tags 中的一项）
#[derive(Debug, Clone, Deserialize)]
pub struct InstalledModel {
    pub name: String,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub modified_at: Option<String>,
}

#[derive(Deserialize)]
struct TagsReply {
    #[serde(default)]
    models: Vec<InstalledModel>,
}

#[derive(Deserialize)]
struct PullReply {
    #[serde(default)]
    status: String,
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// host（含协议）+ 端口，如 http://localhost:11434
    pub fn from_host_port(host: &str, port: u16) -> Self {
        Self::new(format!("{}:{}", host.trim_end_matches('/'), port))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn list_models(&self) -> Result<Vec<InstalledModel>, LlmError> {
        let resp = self
            .http
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
            .map_err(|e| LlmError::Request(e.to_string()))?;
        let resp = check_status(resp).await?;
        let tags: TagsReply = resp
            .json()
            .await
            .map_err(|e| LlmError::Decode(e.to_string()))?;
        Ok(tags.models)
    }

    /// 拉取模型（阻塞到完成）
    pub async fn pull_model(&self, name: &str) -> Result<(), LlmError> {
        tracing::info!(model = %name, "pulling ollama model");
        let resp = self
            .http
            .post(format!("{}/api/pull", self.base_url))
            .json(&serde_json::json!({ "model": name, "stream": false }))
            .send()
            .await
            .map_err(|e| LlmError::Request(e.to_string()))?;
        let resp = check_status(resp).await?;
        let reply: PullReply = resp
            .json()
            .await
            .map_err(|e| LlmError::Decode(e.to_string()))?;
        if reply.status == "success" {
            Ok(())
        } else {
            Err(LlmError::Request(format!("pull ended with status '{}'", reply.status)))
        }
    }

    /// 模型未安装时拉取；返回是否发生了拉取
    pub async fn ensure_model(&self, name: &str) -> Result<bool, LlmError> {
        let installed = self.list_models().await?;
        if has_model(&installed, name) {
            return Ok(false);
        }
        self.pull_model(name).await?;
        Ok(true)
    }
}

/// 未写 tag 的模型名等价于 `:latest`
pub fn has_model(installed: &[InstalledModel], name: &str) -> bool {
    let wanted = if name.contains(':') {
        name.to_string()
    } else {
        format!("{name}:latest")
    };
    installed.iter().any(|m| m.name == wanted || m.name == name)
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, LlmError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(LlmError::Status {
        status: status.as_u16(),
        body,
    })
}

fn schema_value(schema: &str) -> Result<Option<serde_json::Value>, LlmError> {
    if schema.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str(schema)
        .map(Some)
        .map_err(|e| LlmError::Request(format!("Failed to parse JSON schema: {e}")))
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError> {
        let body = ChatBody {
            model: &request.model,
            messages: &request.messages,
            stream: false,
            format: schema_value(&request.schema)?,
        };
        let resp = self
            .http
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Request(e.to_string()))?;
        let resp = check_status(resp).await?;
        let reply: ChatReply = resp
            .json()
            .await
            .map_err(|e| LlmError::Decode(e.to_string()))?;
        Ok(reply.message.content)
    }

    fn backend(&self) -> &str {
        "ollama"
    }
}

/// 由本进程托管的 `ollama serve` 子进程；Drop 时随之结束
pub struct OllamaServer {
    process: Option<Child>,
    host: String,
    port: u16,
}

impl OllamaServer {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            process: None,
            host: host.into(),
            port,
        }
    }

    pub fn spawn(&mut self) -> std::io::Result<()> {
        let child = Command::new("ollama")
            .arg("serve")
            .env("OLLAMA_HOST", format!("{}:{}", self.host, self.port))
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;
        tracing::info!(host = %self.host, port = self.port, "started ollama server");
        self.process = Some(child);
        Ok(())
    }

    /// 子进程是否仍在运行
    pub fn is_running(&mut self) -> bool {
        let Some(process) = self.process.as_mut() else {
            tracing::debug!("ollama server process is not set");
            return false;
        };
        match process.try_wait() {
            Ok(Some(status)) => {
                tracing::warn!(%status, "ollama server exited");
                false
            }
            Ok(None) => true,
            Err(e) => {
                tracing::warn!(error = %e, "cannot check ollama server status");
                false
            }
        }
    }

    /// 轮询 /api/tags 直到服务可用或次数用尽
    pub async fn wait_ready(&mut self, client: &OllamaClient, attempts: usize) -> bool {
        for _ in 0..attempts {
            if !self.is_running() {
                return false;
            }
            if client.list_models().await.is_ok() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
        false
    }
}
