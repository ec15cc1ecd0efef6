//! 目标执行器
//!
//! 对一个概念目标跑有界内循环：每轮请 LLM 在「下一个工具调用」与「目标状态声明」间二选一，
//! 工具错误写入 tool_logs 后继续（期待 LLM 下一轮自行应对），动作预算耗尽或决策格式错误
//! 则步骤转 failed_needs_correction；任何失败态都会中止计划中后续步骤的执行。

use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::core::AgentError;
use crate::llm::LlmClient;
use crate::memory::Message;
use crate::plan::parse::{parse_decision_response, Decision};
use crate::plan::prompts::{build_decision_prompt, decision_system, render_prior_steps};
use crate::plan::types::{ConceptualPlanStep, StepStatus, ToolCallLogEntry};
use crate::tools::ToolExecutor;

/// 单个目标允许的最大决策/工具调用轮数，防止无界徘徊
pub const MAX_ACTIONS_PER_GOAL: usize = 5;

/// 整计划执行的收尾：全部达成 / 反馈中止 / 失败中止
#[derive(Debug, Clone, PartialEq)]
pub enum PlanOutcome {
    /// 所有步骤 achieved
    Completed,
    /// 某步骤进入反馈类状态（澄清、人工介入等），把 feedback 交给用户，不消耗纠正预算
    Feedback { step_index: usize },
    /// 某步骤失败（unachievable / failed_needs_correction），摘要供纠正器使用
    Failed { step_index: usize, summary: String },
}

/// 目标执行器：借用 LLM、工具执行器与取消令牌，逐步骤就地修改计划
pub struct GoalExecutor<'a> {
    llm: &'a Arc<dyn LlmClient>,
    tools: &'a ToolExecutor,
    cancel: &'a CancellationToken,
}

impl<'a> GoalExecutor<'a> {
    pub fn new(
        llm: &'a Arc<dyn LlmClient>,
        tools: &'a ToolExecutor,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self { llm, tools, cancel }
    }

    /// 按列表顺序执行计划；已终结的步骤直接跳过（幂等），
    /// 某步骤落入失败/反馈态后不再推进后续步骤
    pub async fn run_plan(&self, plan: &mut [ConceptualPlanStep]) -> Result<PlanOutcome, AgentError> {
        for index in 0..plan.len() {
            if plan[index].is_terminal() {
                tracing::debug!(step_id = %plan[index].step_id, "skipping terminal step");
                continue;
            }

            let prior_summary = render_prior_steps(&plan[..index]);
            self.run_step(&mut plan[index], prior_summary.as_deref())
                .await?;

            let step = &plan[index];
            if step.status.is_feedback() {
                tracing::info!(step_id = %step.step_id, status = ?step.status, "plan halted for user feedback");
                return Ok(PlanOutcome::Feedback { step_index: index });
            }
            if step.status.needs_correction() {
                let summary = format!(
                    "goal '{}' ended with status {:?}: {}",
                    step.goal,
                    step.status,
                    step.reason_for_status.as_deref().unwrap_or("(no reason given)")
                );
                tracing::warn!(step_id = %step.step_id, %summary, "plan halted on failed goal");
                return Ok(PlanOutcome::Failed {
                    step_index: index,
                    summary,
                });
            }
        }
        Ok(PlanOutcome::Completed)
    }

    /// 对单个步骤跑有界决策循环（就地修改步骤状态与日志）
    pub async fn run_step(
        &self,
        step: &mut ConceptualPlanStep,
        prior_summary: Option<&str>,
    ) -> Result<(), AgentError> {
        if step.is_terminal() {
            return Ok(());
        }

        step.status = StepStatus::InProgress;
        tracing::info!(step_id = %step.step_id, goal = %step.goal, "goal started");

        for action in 0..MAX_ACTIONS_PER_GOAL {
            if self.cancel.is_cancelled() {
                // 外部取消：放弃在途目标，不得标记 achieved
                return Err(AgentError::Cancelled);
            }

            let messages = [
                Message::system(decision_system(&self.tools.schema_json())),
                Message::user(build_decision_prompt(
                    &step.goal,
                    &step.tool_logs,
                    prior_summary,
                )),
            ];
            let raw = self
                .llm
                .complete(&messages)
                .await
                .map_err(AgentError::LlmError)?;

            let decision = match parse_decision_response(&raw) {
                Ok(d) => d,
                Err(e) => {
                    // 决策既无工具调用也无状态声明：立即失败并中止整个计划
                    step.mark(
                        StepStatus::FailedNeedsCorrection,
                        format!("malformed decision from LLM: {}", e),
                    );
                    return Ok(());
                }
            };

            match decision {
                Decision::GoalStatus {
                    thought,
                    status,
                    reason,
                    message_to_user,
                } => {
                    if status == StepStatus::Achieved {
                        let final_result = last_success_data(&step.tool_logs)
                            .unwrap_or_else(|| Value::String(reason.clone().unwrap_or(thought)));
                        step.mark_achieved(reason, final_result);
                        tracing::info!(step_id = %step.step_id, actions = step.tool_logs.len(), "goal achieved");
                    } else {
                        step.mark(
                            status,
                            reason.unwrap_or_else(|| "(no reason given)".to_string()),
                        );
                        step.feedback_message = message_to_user;
                        tracing::info!(step_id = %step.step_id, status = ?step.status, "goal ended without achievement");
                    }
                    return Ok(());
                }
                Decision::ToolCall {
                    tool_name, args, ..
                } => {
                    tracing::info!(
                        step_id = %step.step_id,
                        action = action + 1,
                        tool = %tool_name,
                        "dispatching tool call"
                    );
                    let entry = match self.tools.execute(&tool_name, args.clone()).await {
                        Ok(data) => ToolCallLogEntry::success(&tool_name, args, data),
                        // 未注册、超时、工具失败一律记进日志，循环继续，由 LLM 下一轮应对
                        Err(e) => ToolCallLogEntry::failure(&tool_name, args, e.to_string()),
                    };
                    step.tool_logs.push(entry);
                }
            }
        }

        // 预算耗尽仍未得到状态声明
        step.mark(
            StepStatus::FailedNeedsCorrection,
            format!(
                "action budget of {} exhausted before the goal was resolved",
                MAX_ACTIONS_PER_GOAL
            ),
        );
        Ok(())
    }
}

/// 最近一次成功调用的数据（achieved 时充当 final_result）
fn last_success_data(logs: &[ToolCallLogEntry]) -> Option<Value> {
    logs.iter()
        .rev()
        .find(|e| e.is_success())
        .and_then(|e| e.outcome_data.clone())
}
