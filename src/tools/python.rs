//! Python code executor tool
//!
//! Runs a snippet with `python3 -c` in its own process group so that a
//! timeout or cancellation can kill the whole tree. No TTY, no stdin, and
//! nothing persists between calls.

use super::{QueryInput, Tool, ToolContext, ToolOutput};
use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

#[cfg(unix)]
use nix::sys::signal::{killpg, Signal};
#[cfg(unix)]
use nix::unistd::Pid;

const MAX_OUTPUT_LENGTH: usize = 128 * 1024; // 128KB
const SNIP_SIZE: usize = 4 * 1024; // 4KB each end
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Executes Python source and returns combined stdout/stderr
pub struct PythonTool {
    python_bin: PathBuf,
    timeout: Duration,
}

impl PythonTool {
    pub fn new(python_bin: PathBuf) -> Self {
        Self {
            python_bin,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    #[cfg(test)]
    fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn execute(&self, code: &str, ctx: &ToolContext) -> ToolOutput {
        let mut cmd = Command::new(&self.python_bin);
        cmd.args(["-c", code])
            .env("PYTHONUNBUFFERED", "1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        cmd.process_group(0);

        let child = match cmd.spawn() {
            Ok(c) => c,
            Err(e) => {
                return ToolOutput::error(format!(
                    "Failed to start {}: {e}",
                    self.python_bin.display()
                ))
            }
        };

        let pid = child.id();
        tracing::debug!(thread_id = %ctx.thread_id, ?pid, "Python snippet started");

        tokio::select! {
            biased;

            () = ctx.cancel.cancelled() => {
                kill_process_group(pid);
                ToolOutput::error("[execution cancelled]")
            }

            () = tokio::time::sleep(self.timeout) => {
                kill_process_group(pid);
                ToolOutput::error(format!("[execution timed out after {:?}]", self.timeout))
            }

            result = child.wait_with_output() => {
                match result {
                    Ok(output) => {
                        let stdout = String::from_utf8_lossy(&output.stdout);
                        let stderr = String::from_utf8_lossy(&output.stderr);
                        let formatted = truncate_output(&format!("{stdout}{stderr}"));

                        if output.status.success() {
                            ToolOutput::success(formatted)
                        } else {
                            let exit_code = output.status.code().unwrap_or(-1);
                            ToolOutput::error(format!(
                                "[python failed: exit code {exit_code}]\n{formatted}"
                            ))
                        }
                    }
                    Err(e) => ToolOutput::error(format!("Python execution failed: {e}")),
                }
            }
        }
    }
}

/// Kill a process group immediately with SIGKILL.
#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    let Some(pid) = pid.and_then(|p| i32::try_from(p).ok()) else {
        return;
    };
    tracing::debug!(pgid = pid, "Sending SIGKILL to process group");
    let _ = killpg(Pid::from_raw(pid), Signal::SIGKILL);
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}

/// Keep the head and tail of oversized output
fn truncate_output(output: &str) -> String {
    if output.len() <= MAX_OUTPUT_LENGTH {
        return output.to_string();
    }

    let mut head_end = SNIP_SIZE;
    while !output.is_char_boundary(head_end) {
        head_end -= 1;
    }
    let mut tail_start = output.len() - SNIP_SIZE;
    while !output.is_char_boundary(tail_start) {
        tail_start += 1;
    }

    format!(
        "[output truncated in middle: got {} bytes, max is {} bytes]\n{}\n\n[snip]\n\n{}",
        output.len(),
        MAX_OUTPUT_LENGTH,
        output.get(..head_end).unwrap_or_default(),
        output.get(tail_start..).unwrap_or_default()
    )
}

#[async_trait]
impl Tool for PythonTool {
    fn name(&self) -> &'static str {
        "python_code_executor_tool"
    }

    fn description(&self) -> String {
        "Executes the provided Python code and returns its printed output. \
Useful for calculations, data transformations, or checking logic while reasoning. \
Each call starts a fresh interpreter: print() anything you want to see. \
Errors are returned with the traceback."
            .to_string()
    }

    fn input_schema(&self) -> Value {
        super::query_schema("Python source code to execute")
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> ToolOutput {
        match QueryInput::parse(input) {
            Ok(code) => self.execute(&code, &ctx).await,
            Err(out) => out,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    fn context(cancel: CancellationToken) -> ToolContext {
        ToolContext::new(cancel, "test-thread", reqwest::Client::new())
    }

    fn python_available() -> bool {
        std::process::Command::new("python3")
            .arg("--version")
            .output()
            .is_ok_and(|o| o.status.success())
    }

    #[test]
    fn test_output_truncation() {
        let long_output = "x".repeat(200_000);
        let truncated = truncate_output(&long_output);
        assert!(truncated.len() < 20_000);
        assert!(truncated.contains("[snip]"));
        assert_eq!(truncate_output("short"), "short");
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let long_output = "é".repeat(100_000);
        let truncated = truncate_output(&long_output);
        assert!(truncated.contains("[snip]"));
        assert!(truncated.ends_with("éé"));
        assert!(truncated.contains("]\néé"));
    }

    #[tokio::test]
    async fn test_missing_interpreter_is_tool_error() {
        let tool = PythonTool::new(PathBuf::from("/nonexistent/python"));
        let out = tool
            .run(json!({"query": "print(1)"}), context(CancellationToken::new()))
            .await;
        assert!(!out.success);
        assert!(out.output.contains("Failed to start"));
    }

    #[tokio::test]
    async fn test_empty_code_rejected() {
        let tool = PythonTool::new(PathBuf::from("python3"));
        let out = tool
            .run(json!({"query": "   "}), context(CancellationToken::new()))
            .await;
        assert!(!out.success);
    }

    #[tokio::test]
    async fn test_prints_output() {
        if !python_available() {
            return;
        }
        let tool = PythonTool::new(PathBuf::from("python3"));
        let out = tool
            .run(json!({"query": "print(37593 * 67)"}), context(CancellationToken::new()))
            .await;
        assert!(out.success, "{}", out.output);
        assert_eq!(out.output.trim(), "2518731");
    }

    #[tokio::test]
    async fn test_exception_is_error_with_traceback() {
        if !python_available() {
            return;
        }
        let tool = PythonTool::new(PathBuf::from("python3"));
        let out = tool
            .run(json!({"query": "1/0"}), context(CancellationToken::new()))
            .await;
        assert!(!out.success);
        assert!(out.output.contains("exit code 1"));
        assert!(out.output.contains("ZeroDivisionError"));
    }

    #[tokio::test]
    async fn test_timeout() {
        if !python_available() {
            return;
        }
        let tool =
            PythonTool::new(PathBuf::from("python3")).with_timeout(Duration::from_millis(200));
        let out = tool
            .run(
                json!({"query": "import time; time.sleep(30)"}),
                context(CancellationToken::new()),
            )
            .await;
        assert!(!out.success);
        assert!(out.output.contains("timed out"));
    }

    #[tokio::test]
    async fn test_cancellation_kills_process() {
        if !python_available() {
            return;
        }
        let tool = PythonTool::new(PathBuf::from("python3"));
        let cancel = CancellationToken::new();

        let run = tool.run(
            json!({"query": "import time; time.sleep(1000)"}),
            context(cancel.clone()),
        );
        let cancel_task = async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            cancel.cancel();
        };

        let (out, ()) = tokio::join!(run, cancel_task);
        assert!(!out.success);
        assert!(
            out.output.contains("cancelled"),
            "Expected 'cancelled' in output, got: {}",
            out.output
        );
    }
}
