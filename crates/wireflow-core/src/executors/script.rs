//! Inline-script executors (§4.4 "python / typescript").
//!
//! Per the design note on sandboxed user code (§9): each invocation spawns a
//! short-lived subprocess with no inherited environment beyond a minimal
//! allow-list, wall-clock bounded. The user's source is written to a
//! throwaway file under the system temp directory (not piped over stdin,
//! which the interpreter itself would consume while reading the script);
//! the workflow's input JSON is sent over the child's stdin instead. The
//! child's own stdout is reserved for one final JSON envelope; anything the
//! user's `run` prints is captured separately inside that envelope.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use wireflow_types::{Node, NodeOutcome, Value};

use crate::error::EngineError;
use crate::executor::NodeExecutor;
use crate::runtime::RuntimeConfig;

#[derive(Debug, Deserialize)]
struct ScriptEnvelope {
    ok: bool,
    #[serde(default)]
    result: serde_json::Value,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    stdout: String,
    #[serde(default)]
    stderr: String,
}

async fn run_subprocess(
    program: &str,
    args: &[&str],
    source: String,
    extension: &str,
    input: &Value,
    timeout: Duration,
) -> Result<ScriptEnvelope, EngineError> {
    let file_name = format!("wireflow-node-{}.{extension}", rand::random::<u64>());
    let path = std::env::temp_dir().join(file_name);
    tokio::fs::write(&path, source.as_bytes())
        .await
        .map_err(|e| EngineError::ExternalIo(format!("failed writing script source: {e}")))?;

    let run = async {
        let mut child = Command::new(program)
            .args(args)
            .arg(&path)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .env_clear()
            .spawn()
            .map_err(|e| EngineError::Policy(format!("failed to spawn {program}: {e}")))?;

        let mut stdin = child.stdin.take().expect("stdin piped");
        let payload = serde_json::to_string(&input.to_json())
            .map_err(|e| EngineError::Structural(format!("failed to encode input: {e}")))?;
        stdin
            .write_all(payload.as_bytes())
            .await
            .map_err(|e| EngineError::ExternalIo(format!("failed writing script stdin: {e}")))?;
        drop(stdin);

        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| EngineError::UserCode(format!("script execution exceeded {timeout:?}")))?
            .map_err(|e| EngineError::ExternalIo(format!("script process failed: {e}")))?;

        if output.stdout.is_empty() {
            return Err(EngineError::UserCode(format!(
                "script process exited with {} and produced no output: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        serde_json::from_slice(&output.stdout).map_err(|e| {
            EngineError::UserCode(format!(
                "script produced no valid result envelope: {e} (stderr: {})",
                String::from_utf8_lossy(&output.stderr)
            ))
        })
    }
    .await;

    let _ = tokio::fs::remove_file(&path).await;
    run
}

fn envelope_to_outcome(envelope: ScriptEnvelope, elapsed: f64) -> NodeOutcome {
    if envelope.ok {
        NodeOutcome::success(Value::from_json(envelope.result), elapsed).with_stdout(envelope.stdout)
    } else {
        let mut outcome = NodeOutcome::error(
            envelope.error.unwrap_or_else(|| "script raised an error".to_string()),
            elapsed,
        );
        outcome.stdout = envelope.stdout;
        outcome.stderr = envelope.stderr;
        outcome
    }
}

/// Reads the workflow input as JSON from stdin, calls the user's
/// `run(input)`, and writes one JSON envelope to the real stdout. `run`'s
/// own `print` output is captured into the envelope instead of leaking onto
/// the protocol channel.
fn python_wrapper(user_code: &str) -> String {
    let mut src = String::new();
    src.push_str("import sys, json, io, traceback\n\n");
    src.push_str(user_code);
    src.push_str("\n\n");
    src.push_str(
        r#"
def __wireflow_main():
    raw = sys.stdin.read()
    input_value = json.loads(raw) if raw.strip() else None
    out_buf, err_buf = io.StringIO(), io.StringIO()
    try:
        run_fn = globals().get("run")
        if run_fn is None:
            raise RuntimeError("code does not define run(input)")
        old_out, old_err = sys.stdout, sys.stderr
        sys.stdout, sys.stderr = out_buf, err_buf
        try:
            result = run_fn(input_value)
        finally:
            sys.stdout, sys.stderr = old_out, old_err
        payload = {"ok": True, "result": result, "stdout": out_buf.getvalue(), "stderr": err_buf.getvalue()}
    except Exception as exc:
        payload = {
            "ok": False,
            "error": str(exc),
            "stdout": out_buf.getvalue(),
            "stderr": err_buf.getvalue() + traceback.format_exc(),
        }
    sys.__stdout__.write(json.dumps(payload))

__wireflow_main()
"#,
    );
    src
}

/// Deno entry point; `run`'s own `console.log` output is captured into the
/// envelope the same way the python wrapper captures `print`. Runs with
/// `--no-check` (type errors surface as ordinary runtime exceptions, which
/// keeps the node's error reporting uniform across both script types).
fn typescript_wrapper(user_code: &str) -> String {
    let mut src = String::new();
    src.push_str(user_code);
    src.push_str("\n\n");
    src.push_str(
        r#"
async function __wireflowMain() {
    const raw = await new Response(Deno.stdin.readable).text();
    const inputValue = raw.trim().length ? JSON.parse(raw) : null;
    let out = "";
    let err = "";
    const log = (...args) => { out += args.map(String).join(" ") + "\n"; };
    const errlog = (...args) => { err += args.map(String).join(" ") + "\n"; };
    const realConsole = console;
    // @ts-ignore
    console = { log, error: errlog, warn: errlog };
    let payload;
    try {
        // @ts-ignore run is defined by the node's own source, spliced above
        const result = await run(inputValue);
        payload = { ok: true, result: result === undefined ? null : result, stdout: out, stderr: err };
    } catch (e) {
        payload = { ok: false, error: String(e && e.message ? e.message : e), stdout: out, stderr: err };
    } finally {
        // @ts-ignore
        console = realConsole;
    }
    await Deno.stdout.write(new TextEncoder().encode(JSON.stringify(payload)));
}

await __wireflowMain();
"#,
    );
    src
}

pub struct PythonExecutor;

#[async_trait]
impl NodeExecutor for PythonExecutor {
    fn node_type(&self) -> &str {
        "python"
    }

    async fn execute(&self, node: &Node, input: &Value, config: &RuntimeConfig) -> NodeOutcome {
        let started = Instant::now();
        let code = node.code.clone().unwrap_or_default();
        let wrapper = python_wrapper(&code);
        // No hard wall-clock ceiling of its own (§4.4); bounded only by the
        // interpreter's compile step plus the user's logic, so the HTTP
        // timeout is reused as a generous backstop against a hung child.
        match run_subprocess("python3", &[], wrapper, "py", input, config.http_timeout).await {
            Ok(envelope) => envelope_to_outcome(envelope, started.elapsed().as_secs_f64()),
            Err(e) => NodeOutcome::error(e.message(), started.elapsed().as_secs_f64()),
        }
    }
}

pub struct TypescriptExecutor;

#[async_trait]
impl NodeExecutor for TypescriptExecutor {
    fn node_type(&self) -> &str {
        "typescript"
    }

    async fn execute(&self, node: &Node, input: &Value, config: &RuntimeConfig) -> NodeOutcome {
        let started = Instant::now();
        let code = node.code.clone().unwrap_or_default();
        let wrapper = typescript_wrapper(&code);
        match run_subprocess(
            "deno",
            &["run", "--no-check"],
            wrapper,
            "ts",
            input,
            config.typescript_timeout,
        )
        .await
        {
            Ok(envelope) => envelope_to_outcome(envelope, started.elapsed().as_secs_f64()),
            Err(e) => NodeOutcome::error(e.message(), started.elapsed().as_secs_f64()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn python_wrapper_embeds_user_code_verbatim() {
        let wrapper = python_wrapper("def run(x):\n    return x");
        assert!(wrapper.contains("def run(x):"));
        assert!(wrapper.contains("__wireflow_main()"));
    }

    #[test]
    fn envelope_to_outcome_maps_failure_to_error_status() {
        let envelope = ScriptEnvelope {
            ok: false,
            result: serde_json::Value::Null,
            error: Some("boom".to_string()),
            stdout: String::new(),
            stderr: "trace".to_string(),
        };
        let outcome = envelope_to_outcome(envelope, 0.1);
        assert!(outcome.is_error());
        assert_eq!(outcome.error.as_deref(), Some("boom"));
    }
}
