use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::{fs, io::AsyncWriteExt};

use crate::error::{AgnoError, Result};
use crate::tool::{Tool, ToolRegistry};

/// File access tools rooted at `base_dir`: `read_file`, `save_file` and `list_files`.
pub fn file_toolkit(base_dir: impl Into<PathBuf>) -> ToolRegistry {
    let base_dir = base_dir.into();
    let mut registry = ToolRegistry::new();
    registry.register(ReadFileTool {
        base_dir: base_dir.clone(),
    });
    registry.register(SaveFileTool {
        base_dir: base_dir.clone(),
    });
    registry.register(ListFilesTool { base_dir });
    registry
}

/// Joins a model-supplied relative path onto `base_dir`, refusing anything that escapes it.
fn resolve(base_dir: &Path, tool: &str, relative: &str) -> Result<PathBuf> {
    let candidate = Path::new(relative);
    let escapes = candidate.components().any(|component| {
        matches!(
            component,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    });
    if escapes || relative.trim().is_empty() {
        return Err(AgnoError::Protocol(format!(
            "`{relative}` is not a path inside the {tool} base directory"
        )));
    }
    Ok(base_dir.join(candidate))
}

fn invocation_error(name: &str, err: std::io::Error) -> AgnoError {
    AgnoError::ToolInvocation {
        name: name.into(),
        source: Box::new(err),
    }
}

struct ReadFileTool {
    base_dir: PathBuf,
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a UTF-8 file. Expects {\"file_name\": string}."
    }

    fn parameters(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {"file_name": {"type": "string"}},
            "required": ["file_name"]
        }))
    }

    async fn call(&self, input: Value) -> Result<Value> {
        let file_name = input
            .get("file_name")
            .and_then(Value::as_str)
            .ok_or_else(|| AgnoError::Protocol("missing `file_name` for read_file".into()))?;
        let path = resolve(&self.base_dir, self.name(), file_name)?;

        tracing::debug!(path = %path.display(), "reading file");
        let contents = fs::read_to_string(&path)
            .await
            .map_err(|err| invocation_error(self.name(), err))?;

        Ok(json!({ "file_name": file_name, "contents": contents }))
    }
}

struct SaveFileTool {
    base_dir: PathBuf,
}

#[async_trait]
impl Tool for SaveFileTool {
    fn name(&self) -> &str {
        "save_file"
    }

    fn description(&self) -> &str {
        "Write contents to a UTF-8 file. Expects {\"file_name\": string, \"contents\": string, \"overwrite\": bool}."
    }

    fn parameters(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "file_name": {"type": "string"},
                "contents": {"type": "string"},
                "overwrite": {"type": "boolean", "default": true}
            },
            "required": ["file_name", "contents"]
        }))
    }

    async fn call(&self, input: Value) -> Result<Value> {
        let file_name = input
            .get("file_name")
            .and_then(Value::as_str)
            .ok_or_else(|| AgnoError::Protocol("missing `file_name` for save_file".into()))?;
        let contents = input
            .get("contents")
            .and_then(Value::as_str)
            .ok_or_else(|| AgnoError::Protocol("missing `contents` for save_file".into()))?;
        let overwrite = input
            .get("overwrite")
            .and_then(Value::as_bool)
            .unwrap_or(true);
        let path = resolve(&self.base_dir, self.name(), file_name)?;

        if !overwrite && fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(json!({ "file_name": file_name, "skipped": "file already exists" }));
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|err| invocation_error(self.name(), err))?;
        }

        tracing::debug!(path = %path.display(), bytes = contents.len(), "saving file");
        let mut file = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .await
            .map_err(|err| invocation_error(self.name(), err))?;

        file.write_all(contents.as_bytes())
            .await
            .map_err(|err| invocation_error(self.name(), err))?;

        Ok(json!({ "file_name": file_name, "bytes_written": contents.len() }))
    }
}

struct ListFilesTool {
    base_dir: PathBuf,
}

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        "list_files"
    }

    fn description(&self) -> &str {
        "List the files in the base directory."
    }

    async fn call(&self, _input: Value) -> Result<Value> {
        let mut entries = fs::read_dir(&self.base_dir)
            .await
            .map_err(|err| invocation_error(self.name(), err))?;
        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|err| invocation_error(self.name(), err))?
        {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(json!({ "files": names }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn saves_then_reads_and_lists() {
        let dir = tempfile::tempdir().unwrap();
        let tools = file_toolkit(dir.path());

        tools
            .call(
                "save_file",
                json!({"file_name": "notes.txt", "contents": "hello"}),
            )
            .await
            .unwrap();
        let read = tools
            .call("read_file", json!({"file_name": "notes.txt"}))
            .await
            .unwrap();
        assert_eq!(read["contents"], "hello");

        let listed = tools.call("list_files", json!({})).await.unwrap();
        assert_eq!(listed["files"], json!(["notes.txt"]));
    }

    #[tokio::test]
    async fn keeps_existing_file_without_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "original").unwrap();
        let tools = file_toolkit(dir.path());

        let out = tools
            .call(
                "save_file",
                json!({"file_name": "a.txt", "contents": "new", "overwrite": false}),
            )
            .await
            .unwrap();
        assert!(out.get("skipped").is_some());
        assert_eq!(
            std::fs::read_to_string(dir.path().join("a.txt")).unwrap(),
            "original"
        );
    }

    #[tokio::test]
    async fn rejects_paths_outside_base_dir() {
        let dir = tempfile::tempdir().unwrap();
        let tools = file_toolkit(dir.path());
        let err = tools
            .call("read_file", json!({"file_name": "../secret"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("read_file"));
    }
}
