//! 写入类工具：write_to_file 与 create_directory
//!
//! 与读侧共用 SafeFs 的路径校验；write_to_file 自动补建父目录，
//! create_directory 对已存在路径报错，由 LLM 在下一轮决策中消化。

use std::path::Path;

use async_trait::async_trait;
use serde_json::Value;

use crate::tools::filesystem::SafeFs;
use crate::tools::Tool;

const MAX_CONTENT_BYTES: usize = 10 * 1024 * 1024;

/// write_to_file 工具：写入或创建文件
pub struct WriteFileTool {
    fs: SafeFs,
}

impl WriteFileTool {
    pub fn new(root_dir: impl AsRef<Path>) -> Self {
        Self {
            fs: SafeFs::new(root_dir),
        }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_to_file"
    }

    fn description(&self) -> &str {
        "Write or overwrite a file inside the workspace, creating parent directories as needed. Args: {\"filepath\": \"path relative to workspace\", \"content\": \"file contents\"}"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "filepath": {"type": "string", "description": "File path relative to the workspace root"},
                "content": {"type": "string", "description": "Contents to write"}
            },
            "required": ["filepath", "content"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let filepath = args
            .get("filepath")
            .and_then(|v| v.as_str())
            .ok_or("Missing required parameter: filepath")?;
        let content = args
            .get("content")
            .and_then(|v| v.as_str())
            .ok_or("Missing required parameter: content")?;

        if content.len() > MAX_CONTENT_BYTES {
            return Err(format!(
                "Content too large: {} bytes (max: {})",
                content.len(),
                MAX_CONTENT_BYTES
            ));
        }

        tracing::info!(path = %filepath, bytes = content.len(), "write_to_file tool execute");
        self.fs
            .write_file(filepath, content)
            .map_err(|e| e.to_string())?;
        Ok(Value::String(format!(
            "Wrote {} bytes to '{}'",
            content.len(),
            filepath
        )))
    }
}

/// create_directory 工具：创建目录（含中间层级）
pub struct CreateDirTool {
    fs: SafeFs,
}

impl CreateDirTool {
    pub fn new(root_dir: impl AsRef<Path>) -> Self {
        Self {
            fs: SafeFs::new(root_dir),
        }
    }
}

#[async_trait]
impl Tool for CreateDirTool {
    fn name(&self) -> &str {
        "create_directory"
    }

    fn description(&self) -> &str {
        "Create a new directory (with intermediate levels) inside the workspace. Fails if the path already exists. Args: {\"path\": \"directory path relative to workspace\"}"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Directory path relative to the workspace root"}
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let path = args
            .get("path")
            .and_then(|v| v.as_str())
            .ok_or("Missing required parameter: path")?;
        if path.trim().is_empty() {
            return Err("Directory path must not be empty".to_string());
        }
        tracing::info!(path = %path, "create_directory tool execute");
        self.fs.create_dir(path).map_err(|e| e.to_string())?;
        Ok(Value::String(format!("Created directory '{}'", path)))
    }
}
