//! 会话循环集成测试：用脚本化 Mock LLM 驱动完整一轮

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use scout::agent::{process_message, AgentComponents};
use scout::llm::MockLlmClient;
use scout::plan::SessionContext;
use scout::tools::{EchoTool, ListDirTool, ToolExecutor, ToolRegistry};

fn step_json(id: &str, goal: &str) -> serde_json::Value {
    serde_json::json!({
        "step_id": id,
        "goal": goal,
        "status": "pending",
        "reason_for_status": null,
        "tool_logs": [],
        "final_result": null,
    })
}

fn plan_response(thought: &str, steps: Vec<serde_json::Value>) -> String {
    serde_json::json!({"thought": thought, "plan": steps}).to_string()
}

fn tool_call(tool: &str, args: serde_json::Value) -> String {
    serde_json::json!({
        "thought": "next action",
        "next_tool_call": {"tool_name": tool, "args": args},
    })
    .to_string()
}

fn components_with(
    mock: Arc<MockLlmClient>,
    registry: ToolRegistry,
    max_corrections: usize,
) -> AgentComponents {
    AgentComponents::new(mock, ToolExecutor::new(registry, 5), max_corrections)
}

#[tokio::test]
async fn greeting_is_answered_directly_without_execution() {
    let mock = Arc::new(MockLlmClient::scripted([plan_response(
        "Hello! How can I help?",
        vec![],
    )]));
    let mut registry = ToolRegistry::new();
    registry.register(EchoTool);
    let components = components_with(mock.clone(), registry, 1);
    let mut ctx = SessionContext::new(10);

    let answer = process_message(&components, &mut ctx, "Hello", CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(answer, "Hello! How can I help?");
    // 交换已写入历史，且没有任何执行器脚本被消费
    assert_eq!(ctx.conversation.len(), 2);
    assert_eq!(ctx.conversation.messages()[1].content, "Hello! How can I help?");
    assert_eq!(mock.remaining(), 0);
}

#[tokio::test]
async fn listing_goal_resolves_in_one_call_and_empty_listing_is_achieved() {
    let temp = tempfile::tempdir().unwrap();
    std::fs::create_dir(temp.path().join("docs")).unwrap();

    let mock = Arc::new(MockLlmClient::scripted([
        plan_response(
            "one listing goal",
            vec![step_json("s1", "list directory contents of 'docs'")],
        ),
        tool_call("list_directory_contents", serde_json::json!({"path": "docs"})),
        serde_json::json!({
            "thought": "empty listing observed",
            "goal_status": "achieved",
            "reason": "directory has no entries",
        })
        .to_string(),
        plan_response("目录 docs 当前没有任何条目。", vec![]),
    ]));

    let mut registry = ToolRegistry::new();
    registry.register(ListDirTool::new(temp.path()));
    let components = components_with(mock.clone(), registry, 1);
    let mut ctx = SessionContext::new(10);

    let answer = process_message(
        &components,
        &mut ctx,
        "what is inside docs?",
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(answer, "目录 docs 当前没有任何条目。");
    assert_eq!(mock.remaining(), 0);
    assert_eq!(ctx.corrections_used(), 0);
}

#[tokio::test]
async fn budget_exhaustion_triggers_exactly_one_correction_then_gives_up() {
    // 两份计划各 1 个目标；每个目标 5 次工具调用耗尽动作预算，纠正预算为 1
    let mut script = vec![plan_response(
        "first attempt",
        vec![step_json("s1", "keep echoing")],
    )];
    for _ in 0..5 {
        script.push(tool_call("echo", serde_json::json!({"text": "spin"})));
    }
    script.push(plan_response(
        "corrected attempt",
        vec![step_json("c1", "echo differently")],
    ));
    for _ in 0..5 {
        script.push(tool_call("echo", serde_json::json!({"text": "spin again"})));
    }

    let mock = Arc::new(MockLlmClient::scripted(script));
    let mut registry = ToolRegistry::new();
    registry.register(EchoTool);
    let components = components_with(mock.clone(), registry, 1);
    let mut ctx = SessionContext::new(10);

    let answer = process_message(
        &components,
        &mut ctx,
        "spin forever",
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert!(answer.contains("纠正预算已用尽"));
    assert_eq!(ctx.corrections_used(), 1);
    assert_eq!(mock.remaining(), 0);
    // 放弃后的回答依然写入历史，等待下一个独立请求
    assert_eq!(ctx.conversation.len(), 2);
}

#[tokio::test]
async fn corrector_giving_up_surfaces_its_explanation() {
    let mut script = vec![plan_response(
        "try once",
        vec![step_json("s1", "read the missing file")],
    )];
    script.push(
        serde_json::json!({
            "thought": "cannot proceed",
            "goal_status": "unachievable",
            "reason": "file does not exist and cannot be created here",
        })
        .to_string(),
    );
    script.push(plan_response(
        "The requested file is gone for good; nothing more can be done.",
        vec![],
    ));

    let mock = Arc::new(MockLlmClient::scripted(script));
    let mut registry = ToolRegistry::new();
    registry.register(EchoTool);
    let components = components_with(mock.clone(), registry, 2);
    let mut ctx = SessionContext::new(10);

    let answer = process_message(
        &components,
        &mut ctx,
        "read gone.txt",
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(
        answer,
        "The requested file is gone for good; nothing more can be done."
    );
    assert_eq!(ctx.corrections_used(), 1);
    assert_eq!(mock.remaining(), 0);
}

#[tokio::test]
async fn malformed_plan_is_surfaced_with_raw_text() {
    let mock = Arc::new(MockLlmClient::scripted([
        "I refuse to answer in JSON today.".to_string(),
    ]));
    let mut registry = ToolRegistry::new();
    registry.register(EchoTool);
    let components = components_with(mock, registry, 1);
    let mut ctx = SessionContext::new(10);

    let answer = process_message(
        &components,
        &mut ctx,
        "do something",
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert!(answer.contains("计划解析失败"));
    assert!(answer.contains("I refuse to answer in JSON today."));
}

#[tokio::test]
async fn feedback_status_reaches_the_user_without_consuming_corrections() {
    let script = vec![
        plan_response("one goal", vec![step_json("s1", "delete the production database")]),
        serde_json::json!({
            "thought": "not my call",
            "goal_status": "manual_intervention_requested",
            "reason": "destructive operation",
            "message_to_user": "请人工确认后再执行该破坏性操作。",
        })
        .to_string(),
    ];
    let mock = Arc::new(MockLlmClient::scripted(script));
    let mut registry = ToolRegistry::new();
    registry.register(EchoTool);
    let components = components_with(mock.clone(), registry, 1);
    let mut ctx = SessionContext::new(10);

    let answer = process_message(&components, &mut ctx, "drop the db", CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(answer, "请人工确认后再执行该破坏性操作。");
    assert_eq!(ctx.corrections_used(), 0);
    assert_eq!(mock.remaining(), 0);
}
