//! Filesystem executor (§4.4 "file").

use std::path::{Path, PathBuf};
use std::time::Instant;

use async_trait::async_trait;
use wireflow_types::{Node, NodeOutcome, Value, ValueMap};

use crate::executor::NodeExecutor;
use crate::placeholder;
use crate::runtime::RuntimeConfig;

/// Normalize a client-specified path into the safe root: anything escaping
/// the root (absolute paths, `..` segments) is rewritten to just its
/// basename under the root (§4.4).
fn safe_path(root: &Path, requested: &str) -> PathBuf {
    let basename = Path::new(requested)
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("unnamed"));
    let candidate = root.join(&basename);
    if candidate.starts_with(root) {
        candidate
    } else {
        root.join("unnamed")
    }
}

pub struct FileExecutor;

#[async_trait]
impl NodeExecutor for FileExecutor {
    fn node_type(&self) -> &str {
        "file"
    }

    async fn execute(&self, node: &Node, input: &Value, config: &RuntimeConfig) -> NodeOutcome {
        let started = Instant::now();
        if let Err(e) = config.ensure_roots() {
            return NodeOutcome::error(
                format!("failed to prepare file sandbox: {e}"),
                started.elapsed().as_secs_f64(),
            );
        }

        let empty = ValueMap::new();
        let input_map = input.as_map().unwrap_or(&empty);

        let operation = node
            .get_config("operation")
            .and_then(Value::as_str)
            .unwrap_or("read");
        let Some(requested_path) = node.get_config("path").and_then(Value::as_str) else {
            return NodeOutcome::error("file node requires a path", started.elapsed().as_secs_f64());
        };
        let path = safe_path(&config.files_root, requested_path);
        let encoding = node.get_config("encoding").and_then(Value::as_str).unwrap_or("utf-8");

        let result = match operation {
            "read" => match tokio::fs::read(&path).await {
                Ok(bytes) => {
                    let content = if encoding.eq_ignore_ascii_case("base64") {
                        Value::String(base64::Engine::encode(
                            &base64::engine::general_purpose::STANDARD,
                            &bytes,
                        ))
                    } else {
                        Value::String(String::from_utf8_lossy(&bytes).to_string())
                    };
                    let mut out = ValueMap::new();
                    out.insert("content".to_string(), content);
                    out.insert("path".to_string(), Value::String(path.display().to_string()));
                    Ok(Value::Object(out))
                }
                Err(e) => Err(format!("file not found or unreadable: {e}")),
            },
            "write" | "append" => {
                let raw_content = node
                    .get_config("content")
                    .cloned()
                    .map(|v| placeholder::substitute(&v, input_map))
                    .and_then(|v| v.as_str().map(str::to_string))
                    .unwrap_or_default();
                let write_result = if operation == "append" {
                    use tokio::io::AsyncWriteExt;
                    match tokio::fs::OpenOptions::new().create(true).append(true).open(&path).await {
                        Ok(mut f) => f.write_all(raw_content.as_bytes()).await.map_err(|e| e.to_string()),
                        Err(e) => Err(e.to_string()),
                    }
                } else {
                    tokio::fs::write(&path, raw_content.as_bytes()).await.map_err(|e| e.to_string())
                };
                match write_result {
                    Ok(()) => {
                        let mut out = ValueMap::new();
                        out.insert("path".to_string(), Value::String(path.display().to_string()));
                        out.insert("bytes_written".to_string(), Value::Integer(raw_content.len() as i64));
                        Ok(Value::Object(out))
                    }
                    Err(e) => Err(format!("write failed: {e}")),
                }
            }
            "delete" => match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    let mut out = ValueMap::new();
                    out.insert("path".to_string(), Value::String(path.display().to_string()));
                    out.insert("deleted".to_string(), Value::Bool(true));
                    Ok(Value::Object(out))
                }
                Err(e) => Err(format!("delete failed: {e}")),
            },
            "list" => match tokio::fs::read_dir(&config.files_root).await {
                Ok(mut entries) => {
                    let mut names = Vec::new();
                    loop {
                        match entries.next_entry().await {
                            Ok(Some(entry)) => {
                                names.push(Value::String(entry.file_name().to_string_lossy().to_string()))
                            }
                            Ok(None) => break,
                            Err(e) => return outcome_error(format!("list failed: {e}"), started),
                        }
                    }
                    let mut out = ValueMap::new();
                    out.insert("files".to_string(), Value::Array(names));
                    Ok(Value::Object(out))
                }
                Err(e) => Err(format!("list failed: {e}")),
            },
            other => Err(format!("unknown file operation: {other}")),
        };

        match result {
            Ok(output) => NodeOutcome::success(output, started.elapsed().as_secs_f64()),
            Err(message) => NodeOutcome::error(message, started.elapsed().as_secs_f64()),
        }
    }
}

fn outcome_error(message: String, started: Instant) -> NodeOutcome {
    NodeOutcome::error(message, started.elapsed().as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_path_strips_escaping_components() {
        let root = Path::new("/tmp/workflow_files");
        assert_eq!(safe_path(root, "../../etc/passwd"), root.join("passwd"));
        assert_eq!(safe_path(root, "/etc/shadow"), root.join("shadow"));
        assert_eq!(safe_path(root, "notes.txt"), root.join("notes.txt"));
    }
}
