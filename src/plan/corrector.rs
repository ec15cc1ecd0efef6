//! 计划纠正器
//!
//! 执行在某个目标上中止后触发：携带原始请求、历史、整个计划（含各步骤 tool_logs）
//! 与失败摘要，请求一份全新计划。返回的步骤整体替换当前计划，不做合并；
//! 返回空计划时 thought 即终局解释，本轮放弃。

use std::sync::Arc;

use crate::core::AgentError;
use crate::llm::LlmClient;
use crate::memory::Message;
use crate::plan::parse::parse_plan_response;
use crate::plan::prompts::{build_correction_prompt, planner_system};
use crate::plan::types::ConceptualPlanStep;

/// 计划纠正器：与生成器共用 JSON 提取与 schema 校验
pub struct PlanCorrector {
    llm: Arc<dyn LlmClient>,
}

impl PlanCorrector {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// 生成纠正计划；steps 为 None 表示 LLM 判定目标已不可达，thought 为给用户的解释
    pub async fn correct(
        &self,
        original_request: &str,
        history: &[Message],
        plan: &[ConceptualPlanStep],
        error_summary: &str,
        tool_catalogue: &str,
    ) -> Result<(String, Option<Vec<ConceptualPlanStep>>), AgentError> {
        let mut messages = vec![Message::system(planner_system(tool_catalogue))];
        messages.extend(history.iter().cloned());
        messages.push(Message::user(build_correction_prompt(
            original_request,
            plan,
            error_summary,
        )));

        let raw = self
            .llm
            .complete(&messages)
            .await
            .map_err(AgentError::LlmError)?;

        let (thought, steps) = parse_plan_response(&raw)?;
        tracing::info!(steps = steps.len(), "correction plan generated");

        if steps.is_empty() {
            Ok((thought, None))
        } else {
            Ok((thought, Some(steps)))
        }
    }
}
