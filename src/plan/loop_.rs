//! 会话主循环
//!
//! 驱动一轮用户请求：生成计划 → 逐目标执行 → 失败时在纠正预算内整体重新规划 →
//! 全部达成后请 LLM 把工具结果总结为面向用户的最终回答。
//! 会话上下文（有界历史 + 纠正计数）由本模块独占所有权，执行器与纠正器只读。

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::agent::AgentComponents;
use crate::core::AgentError;
use crate::memory::{ConversationMemory, Message};
use crate::plan::executor::{GoalExecutor, PlanOutcome};
use crate::plan::parse::parse_plan_response;
use crate::plan::prompts::{build_summary_prompt, planner_system};
use crate::plan::types::{ConceptualPlanStep, StepStatus};

/// 会话上下文：有界对话历史、纠正计数与会话标识
pub struct SessionContext {
    pub session_id: Uuid,
    pub conversation: ConversationMemory,
    /// 本轮已用的纠正次数；每个新的独立请求开始时归零
    corrections_used: usize,
}

impl SessionContext {
    pub fn new(max_turns: usize) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            conversation: ConversationMemory::new(max_turns),
            corrections_used: 0,
        }
    }

    pub fn corrections_used(&self) -> usize {
        self.corrections_used
    }
}

/// 处理一轮用户输入，返回面向用户的回答文本。
/// 除「外部取消」外的所有失败形态都折叠为回答文本；每轮结束时把交换写入历史。
pub async fn run_turn(
    components: &AgentComponents,
    ctx: &mut SessionContext,
    user_input: &str,
    cancel: CancellationToken,
) -> Result<String, AgentError> {
    ctx.corrections_used = 0;
    tracing::info!(session_id = %ctx.session_id, input = %user_input, "turn started");

    let answer = match turn_inner(components, ctx, user_input, &cancel).await {
        Ok(answer) => answer,
        Err(AgentError::Cancelled) => return Err(AgentError::Cancelled),
        Err(AgentError::CorrectionBudgetExhausted(budget)) => format!(
            "纠正预算已用尽（{budget} 次重新规划仍未成功），本轮请求放弃执行。请调整描述后重试。"
        ),
        Err(AgentError::MalformedPlanResponse { detail, raw }) => {
            format!("计划解析失败：{detail}\n原始 LLM 输出（供诊断）：\n{raw}")
        }
        Err(e) => format!("LLM 调用失败：{e}"),
    };

    ctx.conversation.push_exchange(user_input, answer.clone());
    tracing::info!(session_id = %ctx.session_id, "turn finished");
    Ok(answer)
}

async fn turn_inner(
    components: &AgentComponents,
    ctx: &mut SessionContext,
    user_input: &str,
    cancel: &CancellationToken,
) -> Result<String, AgentError> {
    let catalogue = components.executor.schema_json();
    let history = ctx.conversation.messages().to_vec();

    let (thought, steps) = components
        .generator
        .generate(user_input, &history, &catalogue)
        .await?;

    // 空计划：thought 即直接回答，不触发任何执行
    let Some(mut plan) = steps else {
        return Ok(thought);
    };
    tracing::info!(steps = plan.len(), thought = %thought, "executing plan");

    loop {
        let goals = GoalExecutor::new(&components.llm, &components.executor, cancel);
        match goals.run_plan(&mut plan).await? {
            PlanOutcome::Completed => {
                return summarize_outcomes(components, &plan, user_input).await;
            }
            PlanOutcome::Feedback { step_index } => {
                let step = &plan[step_index];
                return Ok(step
                    .feedback_message
                    .clone()
                    .or_else(|| step.reason_for_status.clone())
                    .unwrap_or_else(|| {
                        format!("目标「{}」需要用户介入后才能继续。", step.goal)
                    }));
            }
            PlanOutcome::Failed { step_index, summary } => {
                if ctx.corrections_used >= components.max_correction_attempts {
                    // 预算耗尽：失败步骤明确终结，不再纠正
                    plan[step_index].mark(
                        StepStatus::FailedTerminal,
                        format!(
                            "correction budget of {} exhausted",
                            components.max_correction_attempts
                        ),
                    );
                    return Err(AgentError::CorrectionBudgetExhausted(
                        components.max_correction_attempts,
                    ));
                }
                ctx.corrections_used += 1;
                tracing::warn!(
                    attempt = ctx.corrections_used,
                    budget = components.max_correction_attempts,
                    %summary,
                    "requesting correction plan"
                );

                let (correction_thought, corrected) = components
                    .corrector
                    .correct(user_input, &history, &plan, &summary, &catalogue)
                    .await?;
                match corrected {
                    // 纠正器也放弃了：thought 即终局解释
                    None => return Ok(correction_thought),
                    // 全新计划整体替换，旧计划（含其日志）弃用
                    Some(new_plan) => plan = new_plan,
                }
            }
        }
    }
}

/// 请 LLM 把已达成计划的工具结果总结为最终回答；
/// 总结只做呈现，解析失败时退回原始文本而不是让整轮失败
async fn summarize_outcomes(
    components: &AgentComponents,
    plan: &[ConceptualPlanStep],
    user_input: &str,
) -> Result<String, AgentError> {
    let messages = [
        Message::system(planner_system(&components.executor.schema_json())),
        Message::user(build_summary_prompt(user_input, plan)),
    ];
    let raw = components
        .llm
        .complete(&messages)
        .await
        .map_err(AgentError::LlmError)?;

    match parse_plan_response(&raw) {
        Ok((thought, _)) => Ok(thought),
        Err(_) => Ok(raw.trim().to_string()),
    }
}
