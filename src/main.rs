//! Scout - Rust 自主任务智能体
//!
//! 入口：初始化日志、加载配置、装配组件，并运行命令行会话循环。
//! 一行输入对应一轮处理；`exit` / `quit` 退出；空行忽略；Ctrl-C 取消在途轮次。

use std::io::Write;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use scout::agent::{create_agent_components, process_message};
use scout::config::{load_config, AppConfig};
use scout::core::AgentError;
use scout::plan::SessionContext;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 日志：默认 info，可通过 RUST_LOG 覆盖
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .with(fmt::layer())
        .init();

    let cfg = load_config(None).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });

    // 工作目录：配置 > 当前目录下的 workspace
    let workspace = cfg
        .app
        .workspace_root
        .clone()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_default().join("workspace"));
    std::fs::create_dir_all(&workspace)
        .with_context(|| format!("Failed to create workspace at {}", workspace.display()))?;
    let workspace = workspace.canonicalize().unwrap_or(workspace);

    let components = create_agent_components(&cfg, &workspace);
    let mut ctx = SessionContext::new(cfg.app.max_context_turns);

    println!(
        "Scout 已启动（工作区：{}）。输入请求，exit / quit 退出。",
        workspace.display()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush().ok();

        let Some(line) = lines.next_line().await.context("Failed to read stdin")? else {
            break; // EOF
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
            println!("再见。");
            break;
        }

        let cancel = CancellationToken::new();
        tokio::select! {
            result = process_message(&components, &mut ctx, input, cancel.clone()) => {
                match result {
                    Ok(answer) => println!("{}", answer),
                    Err(AgentError::Cancelled) => println!("(已取消)"),
                    Err(e) => println!("处理失败：{}", e),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                cancel.cancel();
                println!("\n(已取消当前请求)");
            }
        }
    }

    Ok(())
}
