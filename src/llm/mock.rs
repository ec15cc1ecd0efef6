//! Mock LLM 客户端（测试与无 API Key 时的兜底）
//!
//! 支持脚本化响应：按顺序弹出预置文本；脚本耗尽后回落为「直接回答」JSON，
//! 把最后一条 User 消息回显进 thought，便于本地无 Key 跑通会话循环。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError};
use crate::memory::{Message, Role};

/// Mock 客户端：脚本化响应队列
#[derive(Debug, Default)]
pub struct MockLlmClient {
    script: Mutex<VecDeque<String>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置一串按序返回的响应
    pub fn scripted<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            script: Mutex::new(responses.into_iter().map(Into::into).collect()),
        }
    }

    pub fn push_response(&self, response: impl Into<String>) {
        self.script
            .lock()
            .expect("mock script lock")
            .push_back(response.into());
    }

    /// 剩余未消费的脚本条数（断言幂等跳过时不消耗脚本）
    pub fn remaining(&self) -> usize {
        self.script.lock().expect("mock script lock").len()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        if let Some(next) = self.script.lock().expect("mock script lock").pop_front() {
            return Ok(next);
        }

        let last_user = messages
            .iter()
            .rev()
            .find(|m| matches!(m.role, Role::User))
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");

        Ok(serde_json::json!({
            "thought": format!("Echo from Mock: {}", last_user),
            "plan": [],
        })
        .to_string())
    }
}
