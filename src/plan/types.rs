//! 概念计划数据模型
//!
//! ConceptualPlanStep 是计划中的一个目标级步骤，可能经多次工具调用才能达成；
//! ToolCallLogEntry 记录单次工具调用，创建后不可变，outcome_data 与 outcome_error 不会同时有值。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 步骤状态机：pending → in_progress → 终态
///
/// 终态内步骤在当前计划实例中不再变化；只有纠正器整体替换计划
/// 才会出现追求相似目标的新步骤（新身份）。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Achieved,
    Unachievable,
    /// 工具失败 / 动作预算耗尽 / 决策格式错误，等待整计划纠正
    FailedNeedsCorrection,
    /// 纠正预算耗尽后的明确终结，不再纠正
    FailedTerminal,
    ClarificationNeeded,
    ManualInterventionRequested,
    CodeGenerationRequested,
    UnsupportedActionIdentified,
}

impl StepStatus {
    /// 是否终态（计划 resolved 的判定基础）
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StepStatus::Pending | StepStatus::InProgress)
    }

    /// 是否向用户反馈类状态（澄清 / 人工介入 / 代码生成 / 不支持的操作）：
    /// 中止计划但不消耗纠正预算，直接把 feedback_message 交给用户
    pub fn is_feedback(&self) -> bool {
        matches!(
            self,
            StepStatus::ClarificationNeeded
                | StepStatus::ManualInterventionRequested
                | StepStatus::CodeGenerationRequested
                | StepStatus::UnsupportedActionIdentified
        )
    }

    /// 是否触发整计划纠正的失败态
    pub fn needs_correction(&self) -> bool {
        matches!(
            self,
            StepStatus::Unachievable | StepStatus::FailedNeedsCorrection
        )
    }
}

/// 单次工具调用的不可变记录
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolCallLogEntry {
    pub tool_name: String,
    pub args: Value,
    pub outcome_data: Option<Value>,
    pub outcome_error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ToolCallLogEntry {
    pub fn success(tool_name: impl Into<String>, args: Value, data: Value) -> Self {
        Self {
            tool_name: tool_name.into(),
            args,
            outcome_data: Some(data),
            outcome_error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn failure(tool_name: impl Into<String>, args: Value, error: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            args,
            outcome_data: None,
            outcome_error: Some(error.into()),
            timestamp: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome_error.is_none()
    }
}

/// 计划中的一个概念目标步骤
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConceptualPlanStep {
    /// 不透明唯一标识，创建时分配，此后不变
    pub step_id: String,
    /// 目标的自然语言描述；生成后不变（纠正只会整体替换步骤）
    pub goal: String,
    pub status: StepStatus,
    pub reason_for_status: Option<String>,
    /// 仅在 in_progress 期间追加
    pub tool_logs: Vec<ToolCallLogEntry>,
    /// 仅在 achieved 时非空
    pub final_result: Option<Value>,
    /// 反馈类状态要转达用户的内容
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback_message: Option<String>,
}

impl ConceptualPlanStep {
    pub fn new(step_id: impl Into<String>, goal: impl Into<String>) -> Self {
        Self {
            step_id: step_id.into(),
            goal: goal.into(),
            status: StepStatus::Pending,
            reason_for_status: None,
            tool_logs: Vec::new(),
            final_result: None,
            feedback_message: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// 转入非 achieved 状态并记录原因
    pub fn mark(&mut self, status: StepStatus, reason: impl Into<String>) {
        debug_assert!(!matches!(status, StepStatus::Achieved));
        self.status = status;
        self.reason_for_status = Some(reason.into());
    }

    /// 转入 achieved：唯一允许设置 final_result 的路径
    pub fn mark_achieved(&mut self, reason: Option<String>, final_result: Value) {
        self.status = StepStatus::Achieved;
        self.reason_for_status = reason;
        self.final_result = Some(final_result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_step_starts_pending_with_empty_logs() {
        let step = ConceptualPlanStep::new("s1", "list the docs directory");
        assert_eq!(step.status, StepStatus::Pending);
        assert!(step.reason_for_status.is_none());
        assert!(step.tool_logs.is_empty());
        assert!(step.final_result.is_none());
    }

    #[test]
    fn final_result_only_via_achieved() {
        let mut step = ConceptualPlanStep::new("s1", "g");
        step.mark(StepStatus::FailedNeedsCorrection, "tool kept failing");
        assert!(step.final_result.is_none());
        step.mark_achieved(None, serde_json::json!(["a.txt"]));
        assert_eq!(step.status, StepStatus::Achieved);
        assert_eq!(step.final_result, Some(serde_json::json!(["a.txt"])));
    }

    #[test]
    fn status_classification() {
        assert!(!StepStatus::Pending.is_terminal());
        assert!(!StepStatus::InProgress.is_terminal());
        assert!(StepStatus::Achieved.is_terminal());
        assert!(StepStatus::FailedTerminal.is_terminal());
        assert!(StepStatus::ClarificationNeeded.is_feedback());
        assert!(!StepStatus::ClarificationNeeded.needs_correction());
        assert!(StepStatus::Unachievable.needs_correction());
        assert!(StepStatus::FailedNeedsCorrection.needs_correction());
        assert!(!StepStatus::FailedTerminal.needs_correction());
    }

    #[test]
    fn log_entry_outcome_is_exclusive() {
        let ok = ToolCallLogEntry::success("echo", serde_json::json!({}), serde_json::json!("hi"));
        assert!(ok.is_success());
        assert!(ok.outcome_error.is_none());
        let bad = ToolCallLogEntry::failure("echo", serde_json::json!({}), "boom");
        assert!(!bad.is_success());
        assert!(bad.outcome_data.is_none());
    }

    #[test]
    fn statuses_serialize_snake_case() {
        let s = serde_json::to_string(&StepStatus::FailedNeedsCorrection).unwrap();
        assert_eq!(s, "\"failed_needs_correction\"");
        let back: StepStatus = serde_json::from_str("\"manual_intervention_requested\"").unwrap();
        assert_eq!(back, StepStatus::ManualInterventionRequested);
    }
}
