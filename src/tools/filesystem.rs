//! 沙箱文件系统工具
//!
//! SafeFs 绑定工作区根目录，所有相对路径经词法归一化校验必须落在根下（禁止绝对路径与 ../ 逃逸）；
//! ReadFileTool / ListDirTool 基于 SafeFs 提供 read_file / list_directory_contents 能力。
//! 写路径允许指向尚不存在的文件，因此归一化不依赖 canonicalize。

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;

use crate::core::AgentError;
use crate::tools::Tool;

/// 沙箱文件系统：绑定根目录，resolve 校验路径在根下，防止路径逃逸
#[derive(Debug, Clone)]
pub struct SafeFs {
    root_dir: PathBuf,
}

impl SafeFs {
    pub fn new(root_dir: impl AsRef<Path>) -> Self {
        let root = root_dir.as_ref().to_path_buf();
        let root_dir = root.canonicalize().unwrap_or(root);
        Self { root_dir }
    }

    pub fn root(&self) -> &Path {
        &self.root_dir
    }

    /// 词法归一化并拼到根目录下；目标无需已存在（供写入使用）
    pub fn resolve(&self, path: &str) -> Result<PathBuf, AgentError> {
        let raw = Path::new(path.trim());
        if raw.is_absolute() {
            return Err(AgentError::PathEscape(path.to_string()));
        }
        let mut normalized = PathBuf::new();
        for component in raw.components() {
            match component {
                Component::Normal(part) => normalized.push(part),
                Component::CurDir => {}
                // ..、前缀或根组件都视为逃逸尝试
                _ => return Err(AgentError::PathEscape(path.to_string())),
            }
        }
        Ok(self.root_dir.join(normalized))
    }

    pub fn read_file(&self, path: &str) -> Result<String, AgentError> {
        let resolved = self.resolve(path)?;
        std::fs::read_to_string(&resolved)
            .map_err(|e| AgentError::ToolExecutionFailed(format!("Read failed for '{}': {}", path, e)))
    }

    /// 写入/覆盖文件，父目录不存在时自动创建
    pub fn write_file(&self, path: &str, content: &str) -> Result<(), AgentError> {
        let resolved = self.resolve(path)?;
        if let Some(parent) = resolved.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AgentError::ToolExecutionFailed(format!("Create parent dir failed: {}", e))
            })?;
        }
        std::fs::write(&resolved, content)
            .map_err(|e| AgentError::ToolExecutionFailed(format!("Write failed for '{}': {}", path, e)))
    }

    /// 创建目录（含中间层级）；已存在视为错误，由 LLM 决定如何继续
    pub fn create_dir(&self, path: &str) -> Result<(), AgentError> {
        let resolved = self.resolve(path)?;
        if resolved.exists() {
            return Err(AgentError::ToolExecutionFailed(format!(
                "Path already exists: '{}'",
                path
            )));
        }
        std::fs::create_dir_all(&resolved)
            .map_err(|e| AgentError::ToolExecutionFailed(format!("Create dir failed for '{}': {}", path, e)))
    }

    /// 列出目录项（目录带 / 后缀，隐藏文件跳过，排序保证稳定输出）
    pub fn list_dir(&self, path: &str) -> Result<Vec<String>, AgentError> {
        let base = if path.is_empty() || path == "." {
            self.root_dir.clone()
        } else {
            self.resolve(path)?
        };
        let mut entries = Vec::new();
        for e in std::fs::read_dir(&base)
            .map_err(|e| AgentError::ToolExecutionFailed(format!("List failed for '{}': {}", path, e)))?
        {
            let e = e.map_err(|e| AgentError::ToolExecutionFailed(e.to_string()))?;
            let name = e.file_name().to_string_lossy().to_string();
            if !name.starts_with('.') {
                let ty = if e.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                    "/"
                } else {
                    ""
                };
                entries.push(format!("{}{}", name, ty));
            }
        }
        entries.sort();
        Ok(entries)
    }
}

/// read_file 工具：读取文件内容
pub struct ReadFileTool {
    fs: SafeFs,
}

impl ReadFileTool {
    pub fn new(root_dir: impl AsRef<Path>) -> Self {
        Self {
            fs: SafeFs::new(root_dir),
        }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a file inside the workspace. Args: {\"filepath\": \"path relative to workspace\"}"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "filepath": {"type": "string", "description": "File path relative to the workspace root"}
            },
            "required": ["filepath"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let path = args.get("filepath").and_then(|v| v.as_str()).unwrap_or("");
        if path.is_empty() {
            return Err("Missing required parameter: filepath".to_string());
        }
        tracing::info!(path = %path, "read_file tool execute");
        self.fs
            .read_file(path)
            .map(Value::String)
            .map_err(|e| e.to_string())
    }
}

/// list_directory_contents 工具：列出目录
pub struct ListDirTool {
    fs: SafeFs,
}

impl ListDirTool {
    pub fn new(root_dir: impl AsRef<Path>) -> Self {
        Self {
            fs: SafeFs::new(root_dir),
        }
    }
}

#[async_trait]
impl Tool for ListDirTool {
    fn name(&self) -> &str {
        "list_directory_contents"
    }

    fn description(&self) -> &str {
        "List files and directories at a path inside the workspace. An empty list means the directory has no entries. Args: {\"path\": \"directory path, default '.'\"}"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Directory path relative to the workspace root, default '.'"}
            },
            "required": []
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let path = args.get("path").and_then(|v| v.as_str()).unwrap_or(".");
        tracing::info!(path = %path, "list_directory_contents tool execute");
        let entries = self.fs.list_dir(path).map_err(|e| e.to_string())?;
        Ok(Value::Array(entries.into_iter().map(Value::String).collect()))
    }
}
