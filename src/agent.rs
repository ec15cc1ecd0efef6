//! 无界面 Agent 运行时
//!
//! create_agent_components 按配置装配 LLM（带限流重试）、沙箱工具箱、生成器与纠正器；
//! process_message 对单条用户输入跑一轮会话循环并返回最终回答。CLI 与测试共用这条路径。

use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::core::AgentError;
use crate::llm::{
    create_deepseek_client, LlmClient, MockLlmClient, OpenAiClient, RetryConfig, RetryingLlmClient,
};
use crate::plan::{run_turn, PlanCorrector, PlanGenerator, SessionContext};
use crate::tools::{
    CreateDirTool, EchoTool, ListDirTool, ReadFileTool, TerminalTool, ToolExecutor, ToolRegistry,
    WriteFileTool,
};

/// 预构建的 Agent 组件：生成器、纠正器、工具执行器与共享 LLM，可跨多轮复用
pub struct AgentComponents {
    pub generator: PlanGenerator,
    pub corrector: PlanCorrector,
    pub executor: ToolExecutor,
    pub llm: Arc<dyn LlmClient>,
    /// 每轮用户请求允许的整计划重新生成次数
    pub max_correction_attempts: usize,
}

impl AgentComponents {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        executor: ToolExecutor,
        max_correction_attempts: usize,
    ) -> Self {
        Self {
            generator: PlanGenerator::new(llm.clone()),
            corrector: PlanCorrector::new(llm.clone()),
            executor,
            llm,
            max_correction_attempts,
        }
    }
}

/// 根据配置与环境变量选择 LLM 后端（DeepSeek / OpenAI 兼容 / Mock），并包上限流重试
fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    let use_deepseek = std::env::var("DEEPSEEK_API_KEY").is_ok()
        || (provider == "deepseek" && std::env::var("OPENAI_API_KEY").is_ok());
    let use_openai = std::env::var("OPENAI_API_KEY").is_ok() && provider != "deepseek";

    let inner: Arc<dyn LlmClient> = if use_deepseek {
        let model = cfg
            .llm
            .deepseek
            .model
            .clone()
            .unwrap_or_else(|| cfg.llm.model.clone());
        tracing::info!("Using DeepSeek LLM ({})", model);
        Arc::new(create_deepseek_client(Some(&model)))
    } else if use_openai {
        let model = cfg
            .llm
            .openai
            .model
            .clone()
            .unwrap_or_else(|| "gpt-4o-mini".to_string());
        let base = cfg.llm.base_url.as_deref();
        tracing::info!("Using OpenAI LLM ({})", model);
        Arc::new(OpenAiClient::new(
            base,
            &model,
            std::env::var("OPENAI_API_KEY").ok().as_deref(),
        ))
    } else {
        tracing::warn!("No API key set or provider unknown, using Mock LLM");
        Arc::new(MockLlmClient::new())
    };

    Arc::new(RetryingLlmClient::with_config(
        inner,
        RetryConfig {
            max_retries: cfg.llm.retry.max_retries,
            initial_delay_ms: cfg.llm.retry.initial_delay_ms,
        },
    ))
}

/// 创建 Agent 组件：LLM、工具（读写文件 / 建目录 / 列目录 / 终端命令 / echo）、预算
pub fn create_agent_components(cfg: &AppConfig, workspace: &Path) -> AgentComponents {
    let llm = create_llm_from_config(cfg);

    let mut tools = ToolRegistry::new();
    tools.register(ReadFileTool::new(workspace));
    tools.register(ListDirTool::new(workspace));
    tools.register(WriteFileTool::new(workspace));
    tools.register(CreateDirTool::new(workspace));
    tools.register(TerminalTool::new(
        workspace,
        cfg.tools.shell.allowed_commands.clone(),
        cfg.tools.tool_timeout_secs,
    ));
    tools.register(EchoTool);

    AgentComponents::new(
        llm,
        ToolExecutor::new(tools, cfg.tools.tool_timeout_secs),
        cfg.planner.max_correction_attempts,
    )
}

/// 处理单条用户消息：跑一轮会话循环，返回最终回答文本
pub async fn process_message(
    components: &AgentComponents,
    ctx: &mut SessionContext,
    user_input: &str,
    cancel: CancellationToken,
) -> Result<String, AgentError> {
    run_turn(components, ctx, user_input, cancel).await
}
