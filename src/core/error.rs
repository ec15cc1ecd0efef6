//! Agent 错误类型
//!
//! 传播策略：工具级错误在目标执行循环内部消化（写入 tool_logs，让 LLM 下一轮自行应对）；
//! 步骤级失败由计划纠正器在纠正预算内恢复；预算耗尽后失败对用户可见并终结本轮。

use thiserror::Error;

use crate::llm::LlmError;

/// Agent 运行过程中可能出现的错误（LLM、解析、工具、路径逃逸等）
#[derive(Error, Debug)]
pub enum AgentError {
    /// LLM 调用失败或返回空响应；调用方一律视为本轮硬失败，不再自行重试
    #[error("LLM error: {0}")]
    LlmError(LlmError),

    /// LLM 返回的计划/决策 JSON 无法解析或不符合 schema；携带原始文本供诊断
    #[error("Malformed plan response: {detail}")]
    MalformedPlanResponse { detail: String, raw: String },

    #[error("Tool execution failed: {0}")]
    ToolExecutionFailed(String),

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Path escape attempt: {0}")]
    PathEscape(String),

    /// 整计划重新生成次数超过预算，本轮放弃
    #[error("Correction budget exhausted after {0} attempt(s)")]
    CorrectionBudgetExhausted(usize),

    #[error("Cancelled")]
    Cancelled,
}
