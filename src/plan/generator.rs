//! 计划生成器
//!
//! 输入用户请求与有界对话历史，输出 (thought, steps 或 None)。
//! 校验后的计划为空且 thought 存在时返回 (thought, None)，表示无需执行的直接回答。

use std::sync::Arc;

use crate::core::AgentError;
use crate::llm::LlmClient;
use crate::memory::Message;
use crate::plan::parse::parse_plan_response;
use crate::plan::prompts::{build_plan_prompt, planner_system};
use crate::plan::types::ConceptualPlanStep;

/// 计划生成器：持有 LLM，组装 system + history + request 后请求并严格校验
pub struct PlanGenerator {
    llm: Arc<dyn LlmClient>,
}

impl PlanGenerator {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// 生成计划；steps 为 None 表示直接回答（thought 即回答内容）
    pub async fn generate(
        &self,
        user_request: &str,
        history: &[Message],
        tool_catalogue: &str,
    ) -> Result<(String, Option<Vec<ConceptualPlanStep>>), AgentError> {
        let mut messages = vec![Message::system(planner_system(tool_catalogue))];
        messages.extend(history.iter().cloned());
        messages.push(Message::user(build_plan_prompt(user_request)));

        let raw = self
            .llm
            .complete(&messages)
            .await
            .map_err(AgentError::LlmError)?;

        let (thought, steps) = parse_plan_response(&raw)?;
        tracing::info!(steps = steps.len(), "plan generated");

        if steps.is_empty() {
            Ok((thought, None))
        } else {
            Ok((thought, Some(steps)))
        }
    }
}
