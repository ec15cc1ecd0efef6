//! LLM 响应的 JSON 提取与 schema 校验
//!
//! LLM 是不可信的尽力而为生产者：即使要求只输出 JSON，也可能夹带寒暄。
//! 提取策略是取首个 '{' 到末个 '}' 之间的子串解析；校验策略是严格拒绝而非默默修补，
//! 任何不符合 schema 的响应都携带原始文本返回 MalformedPlanResponse 供诊断。

use std::collections::HashSet;

use serde_json::Value;

use crate::core::AgentError;
use crate::plan::types::{ConceptualPlanStep, StepStatus};

/// thought 缺失时的占位文本
const MISSING_THOUGHT: &str = "(no thought provided)";

fn malformed(detail: impl Into<String>, raw: &str) -> AgentError {
    AgentError::MalformedPlanResponse {
        detail: detail.into(),
        raw: raw.to_string(),
    }
}

/// 取首个 '{' 到末个 '}' 之间的子串；找不到成对括号即判错，绝不返回空计划
pub fn extract_json(raw: &str) -> Result<&str, AgentError> {
    let first = raw.find('{');
    let last = raw.rfind('}');
    match (first, last) {
        (Some(f), Some(l)) if l > f => Ok(&raw[f..=l]),
        _ => Err(malformed("no JSON object delimiters found in response", raw)),
    }
}

/// 计划 JSON 中每个步骤必须携带的字段（不多不少）
const REQUIRED_STEP_FIELDS: [&str; 6] = [
    "step_id",
    "goal",
    "status",
    "reason_for_status",
    "tool_logs",
    "final_result",
];

/// 校验单个步骤对象的初始值约束：status 必须为 pending、
/// reason_for_status 与 final_result 必须为 null、tool_logs 必须为空列表
fn validate_step(obj: &Value, raw: &str) -> Result<ConceptualPlanStep, AgentError> {
    let map = obj
        .as_object()
        .ok_or_else(|| malformed("plan element is not an object", raw))?;

    for field in REQUIRED_STEP_FIELDS {
        if !map.contains_key(field) {
            return Err(malformed(format!("plan step missing field '{}'", field), raw));
        }
    }
    for key in map.keys() {
        if !REQUIRED_STEP_FIELDS.contains(&key.as_str()) {
            return Err(malformed(format!("plan step has unexpected field '{}'", key), raw));
        }
    }

    let step_id = map
        .get("step_id")
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| malformed("plan step 'step_id' must be a non-empty string", raw))?;
    let goal = map
        .get("goal")
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| malformed("plan step 'goal' must be a non-empty string", raw))?;

    match map.get("status").and_then(|v| v.as_str()) {
        Some("pending") => {}
        other => {
            return Err(malformed(
                format!("plan step 'status' must be \"pending\", got {:?}", other),
                raw,
            ))
        }
    }
    if !map.get("reason_for_status").is_some_and(Value::is_null) {
        return Err(malformed("plan step 'reason_for_status' must be null", raw));
    }
    if !map.get("final_result").is_some_and(Value::is_null) {
        return Err(malformed("plan step 'final_result' must be null", raw));
    }
    match map.get("tool_logs").and_then(|v| v.as_array()) {
        Some(logs) if logs.is_empty() => {}
        _ => return Err(malformed("plan step 'tool_logs' must be an empty list", raw)),
    }

    Ok(ConceptualPlanStep::new(step_id, goal))
}

/// 解析计划响应：返回 (thought, steps)。
/// thought 缺失时回落占位符；plan 必须存在且为列表；步骤校验失败或 step_id 重复均判错。
pub fn parse_plan_response(raw: &str) -> Result<(String, Vec<ConceptualPlanStep>), AgentError> {
    let json_str = extract_json(raw)?;
    let parsed: Value = serde_json::from_str(json_str)
        .map_err(|e| malformed(format!("JSON parse error: {}", e), raw))?;

    let thought = parsed
        .get("thought")
        .and_then(|v| v.as_str())
        .unwrap_or(MISSING_THOUGHT)
        .to_string();

    let plan = parsed
        .get("plan")
        .ok_or_else(|| malformed("response object has no 'plan' field", raw))?;
    let plan = plan
        .as_array()
        .ok_or_else(|| malformed("'plan' is not a list", raw))?;

    let mut steps = Vec::with_capacity(plan.len());
    let mut seen_ids = HashSet::new();
    for element in plan {
        let step = validate_step(element, raw)?;
        if !seen_ids.insert(step.step_id.clone()) {
            return Err(malformed(format!("duplicate step_id '{}'", step.step_id), raw));
        }
        steps.push(step);
    }

    Ok((thought, steps))
}

/// 目标执行循环中 LLM 的单步决策
#[derive(Clone, Debug, PartialEq)]
pub enum Decision {
    /// 下一个工具调用
    ToolCall {
        thought: String,
        tool_name: String,
        args: Value,
    },
    /// 目标状态声明（achieved / unachievable / 反馈类状态）
    GoalStatus {
        thought: String,
        status: StepStatus,
        reason: Option<String>,
        message_to_user: Option<String>,
    },
}

fn parse_goal_status(s: &str) -> Option<StepStatus> {
    // 决策只允许声明终态中的可声明子集；pending / in_progress / failed_* 不接受
    match s {
        "achieved" => Some(StepStatus::Achieved),
        "unachievable" => Some(StepStatus::Unachievable),
        "clarification_needed" => Some(StepStatus::ClarificationNeeded),
        "manual_intervention_requested" => Some(StepStatus::ManualInterventionRequested),
        "code_generation_requested" => Some(StepStatus::CodeGenerationRequested),
        "unsupported_action_identified" => Some(StepStatus::UnsupportedActionIdentified),
        _ => None,
    }
}

/// 解析决策响应：必须恰好包含 next_tool_call 与 goal_status 之一
pub fn parse_decision_response(raw: &str) -> Result<Decision, AgentError> {
    let json_str = extract_json(raw)?;
    let parsed: Value = serde_json::from_str(json_str)
        .map_err(|e| malformed(format!("JSON parse error: {}", e), raw))?;

    let thought = parsed
        .get("thought")
        .and_then(|v| v.as_str())
        .unwrap_or(MISSING_THOUGHT)
        .to_string();

    let tool_call = parsed.get("next_tool_call");
    let goal_status = parsed.get("goal_status");

    match (tool_call, goal_status) {
        (Some(call), None) => {
            let obj = call
                .as_object()
                .ok_or_else(|| malformed("'next_tool_call' is not an object", raw))?;
            let tool_name = obj
                .get("tool_name")
                .and_then(|v| v.as_str())
                .filter(|s| !s.trim().is_empty())
                .ok_or_else(|| malformed("'next_tool_call.tool_name' must be a non-empty string", raw))?;
            let args = obj
                .get("args")
                .cloned()
                .ok_or_else(|| malformed("'next_tool_call.args' is missing", raw))?;
            if !args.is_object() {
                return Err(malformed("'next_tool_call.args' must be an object", raw));
            }
            Ok(Decision::ToolCall {
                thought,
                tool_name: tool_name.to_string(),
                args,
            })
        }
        (None, Some(status)) => {
            let status_str = status
                .as_str()
                .ok_or_else(|| malformed("'goal_status' is not a string", raw))?;
            let status = parse_goal_status(status_str)
                .ok_or_else(|| malformed(format!("unknown goal_status '{}'", status_str), raw))?;
            let reason = parsed
                .get("reason")
                .and_then(|v| v.as_str())
                .map(String::from);
            let message_to_user = parsed
                .get("message_to_user")
                .and_then(|v| v.as_str())
                .map(String::from);
            Ok(Decision::GoalStatus {
                thought,
                status,
                reason,
                message_to_user,
            })
        }
        (Some(_), Some(_)) => Err(malformed(
            "decision contains both 'next_tool_call' and 'goal_status'",
            raw,
        )),
        (None, None) => Err(malformed(
            "decision contains neither 'next_tool_call' nor 'goal_status'",
            raw,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step_json(id: &str) -> Value {
        serde_json::json!({
            "step_id": id,
            "goal": "list directory contents of 'docs'",
            "status": "pending",
            "reason_for_status": null,
            "tool_logs": [],
            "final_result": null,
        })
    }

    #[test]
    fn extraction_tolerates_surrounding_commentary() {
        let raw = "Sure! {\"thought\":\"x\",\"plan\":[]} Thanks.";
        let (thought, steps) = parse_plan_response(raw).unwrap();
        assert_eq!(thought, "x");
        assert!(steps.is_empty());
    }

    #[test]
    fn missing_braces_is_malformed_not_empty_plan() {
        let err = parse_plan_response("I could not produce a plan.").unwrap_err();
        match err {
            AgentError::MalformedPlanResponse { raw, .. } => {
                assert!(raw.contains("could not produce"));
            }
            other => panic!("expected MalformedPlanResponse, got {:?}", other),
        }
    }

    #[test]
    fn missing_thought_falls_back_to_placeholder() {
        let raw = serde_json::json!({"plan": []}).to_string();
        let (thought, _) = parse_plan_response(&raw).unwrap();
        assert_eq!(thought, MISSING_THOUGHT);
    }

    #[test]
    fn non_list_plan_is_rejected() {
        let raw = serde_json::json!({"thought": "t", "plan": "do stuff"}).to_string();
        assert!(parse_plan_response(&raw).is_err());
    }

    #[test]
    fn missing_plan_field_is_rejected() {
        let raw = serde_json::json!({"thought": "t"}).to_string();
        assert!(parse_plan_response(&raw).is_err());
    }

    #[test]
    fn step_missing_tool_logs_is_rejected_not_defaulted() {
        let mut step = step_json("s1");
        step.as_object_mut().unwrap().remove("tool_logs");
        let raw = serde_json::json!({"thought": "t", "plan": [step]}).to_string();
        let err = parse_plan_response(&raw).unwrap_err();
        assert!(err.to_string().contains("tool_logs"));
    }

    #[test]
    fn step_with_non_pending_status_is_rejected() {
        let mut step = step_json("s1");
        step["status"] = serde_json::json!("achieved");
        let raw = serde_json::json!({"thought": "t", "plan": [step]}).to_string();
        assert!(parse_plan_response(&raw).is_err());
    }

    #[test]
    fn step_with_extra_field_is_rejected() {
        let mut step = step_json("s1");
        step["surprise"] = serde_json::json!(true);
        let raw = serde_json::json!({"thought": "t", "plan": [step]}).to_string();
        assert!(parse_plan_response(&raw).is_err());
    }

    #[test]
    fn duplicate_step_ids_are_rejected() {
        let raw =
            serde_json::json!({"thought": "t", "plan": [step_json("s1"), step_json("s1")]}).to_string();
        let err = parse_plan_response(&raw).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn valid_plan_yields_pending_steps() {
        let raw =
            serde_json::json!({"thought": "t", "plan": [step_json("s1"), step_json("s2")]}).to_string();
        let (_, steps) = parse_plan_response(&raw).unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].step_id, "s1");
        assert_eq!(steps[0].status, StepStatus::Pending);
    }

    #[test]
    fn decision_tool_call_parses() {
        let raw = serde_json::json!({
            "thought": "listing first",
            "next_tool_call": {"tool_name": "list_directory_contents", "args": {"path": "docs"}},
        })
        .to_string();
        match parse_decision_response(&raw).unwrap() {
            Decision::ToolCall { tool_name, args, .. } => {
                assert_eq!(tool_name, "list_directory_contents");
                assert_eq!(args["path"], "docs");
            }
            other => panic!("expected ToolCall, got {:?}", other),
        }
    }

    #[test]
    fn decision_goal_status_parses_with_reason() {
        let raw = serde_json::json!({
            "thought": "done",
            "goal_status": "achieved",
            "reason": "listing returned",
        })
        .to_string();
        match parse_decision_response(&raw).unwrap() {
            Decision::GoalStatus { status, reason, .. } => {
                assert_eq!(status, StepStatus::Achieved);
                assert_eq!(reason.as_deref(), Some("listing returned"));
            }
            other => panic!("expected GoalStatus, got {:?}", other),
        }
    }

    #[test]
    fn decision_feedback_status_carries_message() {
        let raw = serde_json::json!({
            "thought": "need input",
            "goal_status": "clarification_needed",
            "reason": "ambiguous target",
            "message_to_user": "Which directory did you mean?",
        })
        .to_string();
        match parse_decision_response(&raw).unwrap() {
            Decision::GoalStatus {
                status,
                message_to_user,
                ..
            } => {
                assert_eq!(status, StepStatus::ClarificationNeeded);
                assert_eq!(message_to_user.as_deref(), Some("Which directory did you mean?"));
            }
            other => panic!("expected GoalStatus, got {:?}", other),
        }
    }

    #[test]
    fn decision_with_neither_field_is_malformed() {
        let raw = serde_json::json!({"thought": "hmm"}).to_string();
        assert!(parse_decision_response(&raw).is_err());
    }

    #[test]
    fn decision_with_both_fields_is_malformed() {
        let raw = serde_json::json!({
            "thought": "confused",
            "next_tool_call": {"tool_name": "echo", "args": {}},
            "goal_status": "achieved",
        })
        .to_string();
        assert!(parse_decision_response(&raw).is_err());
    }

    #[test]
    fn decision_with_internal_status_is_rejected() {
        let raw = serde_json::json!({"thought": "t", "goal_status": "in_progress"}).to_string();
        assert!(parse_decision_response(&raw).is_err());
    }
}
