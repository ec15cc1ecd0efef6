//! Scout - Rust 自主任务智能体
//!
//! 将自由文本请求分解为概念目标计划，逐目标咨询 LLM 决定下一步工具调用，
//! 失败时在预算内整体重新规划。模块划分：
//! - **agent**: 组件装配与单轮消息处理（无界面运行时）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）、限流重试
//! - **memory**: 短期记忆（有界对话历史）
//! - **plan**: 概念计划数据模型、生成器、目标执行器、纠正器与会话主循环
//! - **tools**: 沙箱工具箱（读写文件、建目录、列目录、终端命令）与执行器

pub mod agent;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod plan;
pub mod tools;
