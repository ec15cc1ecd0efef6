//! LLM 客户端抽象与限流重试
//!
//! 所有后端（OpenAI 兼容 / DeepSeek / Mock）实现 LlmClient::complete；
//! RetryingLlmClient 仅对 RateLimited 重试（优先服务端建议的等待时长，否则指数退避），
//! 其余错误立即返回，绝不跨边界 panic。

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::memory::Message;

/// LLM 调用错误；所有失败形态都以返回值表示
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    /// 限流；retry_after_ms 为服务端建议的等待毫秒数（若能从响应中解析出来）
    #[error("Rate limited (retry_after_ms: {retry_after_ms:?})")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(String),

    /// 空响应：调用方一律视为该轮硬失败
    #[error("Empty response from LLM")]
    EmptyResponse,
}

/// LLM 客户端 trait：发送消息序列，返回文本
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError>;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}

/// 重试策略：最大重试次数与初始退避毫秒数
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_retries: usize,
    pub initial_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 500,
        }
    }
}

impl RetryConfig {
    /// 第 attempt 次重试前的退避时长：服务端建议优先，否则 initial * 2^attempt
    fn delay_ms(&self, attempt: usize, suggested_ms: Option<u64>) -> u64 {
        suggested_ms.unwrap_or_else(|| self.initial_delay_ms.saturating_mul(1u64 << attempt.min(16)))
    }
}

/// 限流重试包装：仅 RateLimited 触发重试，预算耗尽后把最后一次限流错误原样返回
pub struct RetryingLlmClient {
    inner: Arc<dyn LlmClient>,
    config: RetryConfig,
}

impl RetryingLlmClient {
    pub fn new(inner: Arc<dyn LlmClient>) -> Self {
        Self {
            inner,
            config: RetryConfig::default(),
        }
    }

    pub fn with_config(inner: Arc<dyn LlmClient>, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl LlmClient for RetryingLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        let mut attempt = 0usize;
        loop {
            match self.inner.complete(messages).await {
                Ok(text) => return Ok(text),
                Err(LlmError::RateLimited { retry_after_ms }) if attempt < self.config.max_retries => {
                    let delay = self.config.delay_ms(attempt, retry_after_ms);
                    tracing::warn!(
                        attempt = attempt + 1,
                        max = self.config.max_retries,
                        delay_ms = delay,
                        "LLM rate limited, backing off"
                    );
                    tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn token_usage(&self) -> (u64, u64, u64) {
        self.inner.token_usage()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 前 fail_times 次返回 RateLimited，之后成功
    struct FlakyClient {
        fail_times: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LlmClient for FlakyClient {
        async fn complete(&self, _messages: &[Message]) -> Result<String, LlmError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_times {
                Err(LlmError::RateLimited {
                    retry_after_ms: Some(1),
                })
            } else {
                Ok("ok".to_string())
            }
        }
    }

    struct BrokenClient;

    #[async_trait]
    impl LlmClient for BrokenClient {
        async fn complete(&self, _messages: &[Message]) -> Result<String, LlmError> {
            Err(LlmError::Api("boom".to_string()))
        }
    }

    #[tokio::test]
    async fn retries_rate_limit_until_success() {
        let inner = Arc::new(FlakyClient {
            fail_times: 2,
            calls: AtomicUsize::new(0),
        });
        let client = RetryingLlmClient::with_config(
            inner.clone(),
            RetryConfig {
                max_retries: 3,
                initial_delay_ms: 1,
            },
        );
        let out = client.complete(&[Message::user("hi")]).await;
        assert_eq!(out.unwrap(), "ok");
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn returns_rate_limit_after_budget_exhausted() {
        let inner = Arc::new(FlakyClient {
            fail_times: 10,
            calls: AtomicUsize::new(0),
        });
        let client = RetryingLlmClient::with_config(
            inner.clone(),
            RetryConfig {
                max_retries: 2,
                initial_delay_ms: 1,
            },
        );
        let out = client.complete(&[Message::user("hi")]).await;
        assert!(matches!(out, Err(LlmError::RateLimited { .. })));
        // 首次调用 + 2 次重试
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_rate_limit_errors_are_never_retried() {
        let client = RetryingLlmClient::with_config(
            Arc::new(BrokenClient),
            RetryConfig {
                max_retries: 5,
                initial_delay_ms: 1,
            },
        );
        let out = client.complete(&[Message::user("hi")]).await;
        assert_eq!(out, Err(LlmError::Api("boom".to_string())));
    }

    #[test]
    fn delay_prefers_service_suggestion() {
        let cfg = RetryConfig {
            max_retries: 3,
            initial_delay_ms: 100,
        };
        assert_eq!(cfg.delay_ms(0, Some(42)), 42);
        assert_eq!(cfg.delay_ms(0, None), 100);
        assert_eq!(cfg.delay_ms(2, None), 400);
    }
}
