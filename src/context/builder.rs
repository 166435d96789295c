//! Context Builder：为单轮规划拼装发给模型的有序消息
//!
//! 顺序固定：
//! 1. 固定 system 指令（角色、动作词表、路径规则）——每轮恰好一条，不随轮次累积
//! 2. 可选的动态系统事实（如已安装程序清单）
//! 3. 可选的会话先前上下文
//! 4. 上一轮请求类动作取回的信息（只对紧接着的下一轮可见）
//! 5. 当前用户命令

use crate::actions::vocabulary_section;
use crate::context::Message;
use crate::dispatch::FetchedInfo;

/// 取回信息消息的前缀，便于模型区分「用户说的」与「系统提供的」
pub const FETCHED_INFO_PREFIX: &str = "[system information]";

const ROLE_INSTRUCTIONS: &str = "You are a friendly AI assistant who helps the user manage their desktop computer. \
You translate the user's command into a list of actions.

If you don't have enough information to complete a request, use actions that are prefixed with 'request_' \
to request more information from the system. The results will be provided to you and you will be asked again. \
Do not submit any actions other than request actions while you are making a request unless necessary.

When generating file paths, act as if you are in the user's home directory. \
Access folders directly using forward slashes without prefixes like '~' or '@'.

Only respond with JSON matching the schema: {\"summary\": string, \"actions\": [...]}. Do not add unnecessary actions.";

/// 单轮输入：命令本身与本轮可见的附加信息
#[derive(Debug, Clone, Copy)]
pub struct RoundInput<'a> {
    pub command: &'a str,
    pub system_facts: Option<&'a str>,
    pub prior_context: &'a [String],
    pub fetched: &'a [FetchedInfo],
}

impl<'a> RoundInput<'a> {
    pub fn new(command: &'a str) -> Self {
        Self {
            command,
            system_facts: None,
            prior_context: &[],
            fetched: &[],
        }
    }
}

/// 持有固定指令，按 RoundInput 生成消息列表；本身无跨轮状态
#[derive(Debug, Clone)]
pub struct ContextBuilder {
    instructions: String,
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextBuilder {
    pub fn new() -> Self {
        Self {
            instructions: format!("{}\n\n{}", ROLE_INSTRUCTIONS, vocabulary_section()),
        }
    }

    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    pub fn build(&self, input: &RoundInput<'_>) -> Vec<Message> {
        let mut messages = vec![Message::system(self.instructions.clone())];

        if let Some(facts) = input.system_facts.filter(|f| !f.trim().is_empty()) {
            messages.push(Message::system(format!("System facts:\n{}", facts)));
        }

        if !input.prior_context.is_empty() {
            let mut section = String::from("Earlier in this session:\n");
            for line in input.prior_context {
                section.push_str("- ");
                section.push_str(line);
                section.push('\n');
            }
            messages.push(Message::system(section));
        }

        for info in input.fetched {
            messages.push(Message::user(format!(
                "{} {}",
                FETCHED_INFO_PREFIX,
                info.render()
            )));
        }

        messages.push(Message::user(input.command.to_string()));
        tracing::debug!(
            count = messages.len(),
            fetched = input.fetched.len(),
            "context assembled"
        );
        messages
    }
}
