//! Prompt 组装
//!
//! 规划、单步决策、纠正、结果总结四类请求共用同一个 LlmClient 能力，
//! 各自只是一个 prompt 构造函数；响应契约统一为单个 JSON 对象。

use serde_json::Value;

use crate::plan::types::{ConceptualPlanStep, ToolCallLogEntry};

/// 结果/参数预览最大字符数，避免 prompt 被长输出撑爆
const OUTCOME_PREVIEW_CHARS: usize = 400;

/// 强制 JSON-only 输出的收尾指令
pub const JSON_ONLY_REMINDER: &str = "IMPORTANT: Your entire response for this specific turn MUST be a single, valid JSON object. Start directly with '{' and end directly with '}'. Do not include any other text, explanations, conversational filler, or markdown formatting before or after the JSON object.";

/// 规划系统指令：分解为概念目标而非工具调用；非任务请求返回空计划 + 直接回答
pub fn planner_system(tool_catalogue: &str) -> String {
    format!(
        r#"You are Scout, an autonomous assistant that plans and executes tasks inside a sandboxed workspace.

Decompose the user's request into an ordered list of conceptual goals. Each goal is a natural-language objective that a separate execution loop will later pursue with the tools below. Do NOT plan individual tool calls; think in goals ("create the project skeleton", "summarise the report file"), not in invocations.

Available tools (JSON catalogue, for your awareness of what is executable):
{tool_catalogue}

Respond with a single JSON object of this exact shape:
{{"thought": "your reasoning about the request and the plan",
  "plan": [
    {{"step_id": "s1", "goal": "...", "status": "pending", "reason_for_status": null, "tool_logs": [], "final_result": null}}
  ]}}

Rules:
- "plan" must always be present as a list. Every step must carry exactly the fields shown, with status "pending", reason_for_status null, tool_logs [] and final_result null. step_id values must be unique.
- If the request is not a task (a greeting, a general question, a request for information needing no tools), return "plan": [] and put a direct, friendly answer to the user in "thought".
- Keep files and directories organised inside meaningfully named subdirectories of the workspace; avoid cluttering the top level.
- Later goals may rely on the side effects of earlier ones, so order them accordingly."#
    )
}

/// 单步决策系统指令：针对一个目标返回下一个工具调用或目标状态声明
pub fn decision_system(tool_catalogue: &str) -> String {
    format!(
        r#"You are the execution half of Scout. You are given one conceptual goal, the tool catalogue, the log of tool calls already made for this goal, and optionally a summary of earlier goals' outcomes. Pick the single next concrete action.

Available tools (JSON catalogue):
{tool_catalogue}

Respond with a single JSON object that is EXACTLY ONE of:
{{"thought": "...", "next_tool_call": {{"tool_name": "...", "args": {{ ... }}}}}}
{{"thought": "...", "goal_status": "achieved" | "unachievable", "reason": "..."}}

If the goal cannot proceed without the user, you may instead report:
{{"thought": "...", "goal_status": "clarification_needed" | "manual_intervention_requested" | "code_generation_requested" | "unsupported_action_identified", "reason": "...", "message_to_user": "what to tell the user"}}

Rules:
- Never emit both next_tool_call and goal_status in one response.
- If the log shows an error, react to it (different arguments, different tool, or declare the goal unachievable); do not repeat a failing call unchanged.
- An empty result (for example an empty directory listing) is a successful observation, not an error.
- Declare "achieved" as soon as the goal is met; do not keep calling tools for extra safety."#
    )
}

/// 决策调用的用户消息：目标 + 已有调用日志 + 先前目标结果摘要
pub fn build_decision_prompt(
    goal: &str,
    tool_logs: &[ToolCallLogEntry],
    prior_summary: Option<&str>,
) -> String {
    let mut prompt = String::new();
    if let Some(summary) = prior_summary {
        prompt.push_str("Outcomes of earlier goals in this plan (informational only):\n");
        prompt.push_str(summary);
        prompt.push_str("\n\n");
    }
    prompt.push_str("Current goal:\n");
    prompt.push_str(goal);
    prompt.push_str("\n\nTool calls made so far for this goal:\n");
    if tool_logs.is_empty() {
        prompt.push_str("(none yet)\n");
    } else {
        for (i, entry) in tool_logs.iter().enumerate() {
            prompt.push_str(&render_log_entry(i, entry));
        }
    }
    prompt.push_str("\nDecide the single next action.\n\n");
    prompt.push_str(JSON_ONLY_REMINDER);
    prompt
}

/// 规划调用的用户消息
pub fn build_plan_prompt(user_request: &str) -> String {
    format!(
        "Here is the current user request to handle (taking the previous dialogue into account, if any):\n{user_request}\n\n{JSON_ONLY_REMINDER}"
    )
}

/// 纠正调用的用户消息：原始请求 + 整个计划的逐步结果轨迹 + 失败摘要
pub fn build_correction_prompt(
    original_request: &str,
    plan: &[ConceptualPlanStep],
    error_summary: &str,
) -> String {
    let mut prompt = String::new();
    prompt.push_str("--- Failed plan context ---\n");
    prompt.push_str(&format!("The original user request was: {original_request}\n\n"));
    prompt.push_str("The plan was executed with these per-step outcomes:\n");
    prompt.push_str(&render_plan_outcomes(plan));
    prompt.push_str(&format!(
        "\nExecution halted because of this failure: {error_summary}\n"
    ));
    prompt.push_str("--- Correction request ---\n");
    prompt.push_str(
        "Analyse the failure and the context, then produce a BRAND-NEW plan that either fixes the error or works around it, and still pursues the user's original goal if possible. \
If the error cannot be fixed or the original goal is no longer reachable, explain why in \"thought\" and return \"plan\": []. \
The new plan must use the same JSON schema as before (steps with status \"pending\", reason_for_status null, tool_logs [] and final_result null).\n\n",
    );
    prompt.push_str(JSON_ONLY_REMINDER);
    prompt
}

/// 总结调用的用户消息：请求 + 全部步骤结果，要求把最终答案放进 thought、plan 留空
pub fn build_summary_prompt(original_request: &str, plan: &[ConceptualPlanStep]) -> String {
    let mut prompt = String::new();
    prompt.push_str(&format!("The original user request was: {original_request}\n\n"));
    prompt.push_str("All goals of the plan have been executed, with these results:\n");
    prompt.push_str(&render_plan_outcomes(plan));
    prompt.push_str(
        "\nPlease analyse the results and formulate a complete, clear answer to the original request, using the data obtained. \
If some step recorded errors along the way, mention what happened. \
Put the answer in \"thought\" and return \"plan\": [].\n\n",
    );
    prompt.push_str(JSON_ONLY_REMINDER);
    prompt
}

/// 已终结步骤的只读结果摘要，供后续目标的决策参考（仅信息性，无显式数据依赖机制）
pub fn render_prior_steps(steps: &[ConceptualPlanStep]) -> Option<String> {
    let terminal: Vec<&ConceptualPlanStep> = steps.iter().filter(|s| s.is_terminal()).collect();
    if terminal.is_empty() {
        return None;
    }
    let mut out = String::new();
    for step in terminal {
        let status = serde_json::to_string(&step.status).unwrap_or_default();
        out.push_str(&format!("- goal: {} -> {}", step.goal, status.trim_matches('"')));
        if let Some(result) = &step.final_result {
            out.push_str(&format!(" | result: {}", preview(result)));
        }
        if let Some(reason) = &step.reason_for_status {
            out.push_str(&format!(" | reason: {}", reason));
        }
        out.push('\n');
    }
    Some(out)
}

/// 逐步骤结果轨迹（含每次工具调用），用于纠正与总结
pub fn render_plan_outcomes(plan: &[ConceptualPlanStep]) -> String {
    let mut out = String::new();
    for (i, step) in plan.iter().enumerate() {
        let status = serde_json::to_string(&step.status).unwrap_or_default();
        out.push_str(&format!(
            "Step {} [{}]: {} (status: {}",
            i + 1,
            step.step_id,
            step.goal,
            status.trim_matches('"')
        ));
        if let Some(reason) = &step.reason_for_status {
            out.push_str(&format!(", reason: {}", reason));
        }
        out.push_str(")\n");
        for (j, entry) in step.tool_logs.iter().enumerate() {
            out.push_str(&render_log_entry(j, entry));
        }
        if let Some(result) = &step.final_result {
            out.push_str(&format!("  final result: {}\n", preview(result)));
        }
    }
    out
}

fn render_log_entry(index: usize, entry: &ToolCallLogEntry) -> String {
    let args = preview(&entry.args);
    match (&entry.outcome_data, &entry.outcome_error) {
        (_, Some(err)) => format!(
            "  {}. {}({}) -> ERROR: {}\n",
            index + 1,
            entry.tool_name,
            args,
            err
        ),
        (Some(data), None) => format!(
            "  {}. {}({}) -> {}\n",
            index + 1,
            entry.tool_name,
            args,
            preview(data)
        ),
        (None, None) => format!(
            "  {}. {}({}) -> ok (no data)\n",
            index + 1,
            entry.tool_name,
            args
        ),
    }
}

fn preview(value: &Value) -> String {
    let s = value.to_string();
    if s.chars().count() > OUTCOME_PREVIEW_CHARS {
        let cut: String = s.chars().take(OUTCOME_PREVIEW_CHARS).collect();
        format!("{}...", cut)
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::types::StepStatus;

    #[test]
    fn decision_prompt_includes_logs_and_prior_summary() {
        let logs = vec![ToolCallLogEntry::failure(
            "read_file",
            serde_json::json!({"filepath": "x.txt"}),
            "File not found",
        )];
        let prompt = build_decision_prompt("read the notes", &logs, Some("- goal: earlier -> achieved"));
        assert!(prompt.contains("read the notes"));
        assert!(prompt.contains("ERROR: File not found"));
        assert!(prompt.contains("earlier goals"));
        assert!(prompt.ends_with(JSON_ONLY_REMINDER));
    }

    #[test]
    fn prior_steps_summary_skips_unfinished_steps() {
        let mut achieved = ConceptualPlanStep::new("s1", "done goal");
        achieved.mark_achieved(None, serde_json::json!(["a.txt"]));
        let pending = ConceptualPlanStep::new("s2", "not started");
        let summary = render_prior_steps(&[achieved, pending]).unwrap();
        assert!(summary.contains("done goal"));
        assert!(!summary.contains("not started"));
    }

    #[test]
    fn prior_steps_summary_is_none_when_nothing_terminal() {
        let pending = ConceptualPlanStep::new("s1", "g");
        assert!(render_prior_steps(&[pending]).is_none());
    }

    #[test]
    fn plan_outcomes_render_status_and_errors() {
        let mut step = ConceptualPlanStep::new("s1", "list docs");
        step.tool_logs.push(ToolCallLogEntry::failure(
            "list_directory_contents",
            serde_json::json!({"path": "docs"}),
            "List failed",
        ));
        step.mark(StepStatus::FailedNeedsCorrection, "action budget exhausted");
        let rendered = render_plan_outcomes(&[step]);
        assert!(rendered.contains("failed_needs_correction"));
        assert!(rendered.contains("List failed"));
        assert!(rendered.contains("action budget exhausted"));
    }
}
