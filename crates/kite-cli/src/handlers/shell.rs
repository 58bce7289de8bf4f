//! Shell command execution

use async_trait::async_trait;
use kite_agent::HandlerError;
use kite_agent::handlers::{HandlerResult, Shell};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};

/// Maximum output size in bytes before truncation
const MAX_OUTPUT_SIZE: usize = 100_000;
/// Maximum number of lines before truncation
const MAX_OUTPUT_LINES: usize = 1000;
/// Used when neither the action nor the handler sets a timeout
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

struct Background {
    command: String,
    child: Child,
}

/// Runs commands through `sh -c` in the working directory. A command
/// ending in a single `&` is started in the background and tracked for
/// `ps` and `kill`.
pub struct LocalShell {
    cwd: PathBuf,
    default_timeout: Duration,
    background: Mutex<BTreeMap<u32, Background>>,
}

impl LocalShell {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: cwd.into(),
            default_timeout: DEFAULT_TIMEOUT,
            background: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    fn command(&self, command: &str) -> Command {
        let (shell, shell_arg) = if cfg!(target_os = "windows") {
            ("cmd", "/C")
        } else {
            ("sh", "-c")
        };
        let mut cmd = Command::new(shell);
        cmd.arg(shell_arg).arg(command).current_dir(&self.cwd);
        cmd
    }

    fn spawn_background(&self, command: &str) -> HandlerResult<String> {
        let child = self
            .command(command)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| HandlerError::failed(format!("Failed to spawn command: {}", e)))?;
        let pid = child
            .id()
            .ok_or_else(|| HandlerError::failed("Process exited before it could be tracked"))?;
        tracing::info!("Started background process {}: {}", pid, command);
        self.background.lock().insert(
            pid,
            Background {
                command: command.to_string(),
                child,
            },
        );
        Ok(format!("Started background process {}: {}", pid, command))
    }

    async fn run(&self, command: &str, timeout: Duration) -> HandlerResult<String> {
        let mut child = self
            .command(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| HandlerError::failed(format!("Failed to spawn command: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| HandlerError::failed("stdout not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| HandlerError::failed("stderr not captured"))?;
        // Split on raw bytes so output that is not UTF-8 never stalls a pipe
        let mut stdout_reader = BufReader::new(stdout).split(b'\n');
        let mut stderr_reader = BufReader::new(stderr).split(b'\n');

        let mut output = Capture::default();
        let mut error_output = Capture::default();
        let mut stdout_done = false;
        let mut stderr_done = false;
        let deadline = tokio::time::Instant::now() + timeout;

        let status = loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {
                    let _ = child.kill().await;
                    return Err(HandlerError::failed(format!(
                        "{}\n\nCommand timed out after {} seconds",
                        output.finish("stdout", error_output.finish("stderr", String::new())),
                        timeout.as_secs()
                    )));
                }
                line = stdout_reader.next_segment(), if !stdout_done => match line {
                    Ok(Some(l)) => output.push(&decode_line(&l)),
                    Ok(None) => stdout_done = true,
                    Err(e) => {
                        error_output.push(&format!("Stdout read error: {}", e));
                        stdout_done = true;
                    }
                },
                line = stderr_reader.next_segment(), if !stderr_done => match line {
                    Ok(Some(l)) => error_output.push(&decode_line(&l)),
                    Ok(None) => stderr_done = true,
                    Err(e) => {
                        error_output.push(&format!("Stderr read error: {}", e));
                        stderr_done = true;
                    }
                },
                status = child.wait(), if stdout_done && stderr_done => {
                    break status.map_err(|e| {
                        HandlerError::failed(format!("Failed to wait for command: {}", e))
                    })?;
                }
            }
        };

        let mut result = output.finish("stdout", error_output.finish("stderr", String::new()));
        if result.is_empty() {
            result = "(no output)".to_string();
        }

        if status.success() {
            Ok(result)
        } else {
            let code = status.code().unwrap_or(-1);
            Err(HandlerError::failed(format!(
                "{}\n\nCommand exited with code {}",
                result, code
            )))
        }
    }
}

/// One output line without its `\r`, invalid UTF-8 replaced
fn decode_line(line: &[u8]) -> String {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(line).into_owned()
}

/// Line collector with size and line caps
#[derive(Default)]
struct Capture {
    text: String,
    lines: usize,
    truncated: bool,
}

impl Capture {
    fn push(&mut self, line: &str) {
        if self.truncated {
            return;
        }
        if self.lines >= MAX_OUTPUT_LINES || self.text.len() + line.len() > MAX_OUTPUT_SIZE {
            self.truncated = true;
            return;
        }
        if !self.text.is_empty() {
            self.text.push('\n');
        }
        self.text.push_str(line);
        self.lines += 1;
    }

    /// Collected text with a truncation notice, followed by `tail`
    fn finish(self, stream: &str, tail: String) -> String {
        let mut text = self.text;
        if self.truncated {
            text.push_str(&format!(
                "\n\n... ({} truncated at {} lines / {}KB)",
                stream,
                self.lines,
                MAX_OUTPUT_SIZE / 1024
            ));
        }
        if !tail.is_empty() {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(&tail);
        }
        text
    }
}

/// `cmd &` but not `a && b`
fn background_command(command: &str) -> Option<&str> {
    let trimmed = command.trim_end();
    let body = trimmed.strip_suffix('&')?;
    if body.ends_with('&') {
        return None;
    }
    Some(body.trim_end())
}

#[async_trait]
impl Shell for LocalShell {
    async fn exec(&self, command: &str, timeout: Option<Duration>) -> HandlerResult<String> {
        if command.trim().is_empty() {
            return Err(HandlerError::failed("Empty command"));
        }
        if let Some(body) = background_command(command) {
            return self.spawn_background(body);
        }
        tracing::debug!("Running: {}", command);
        self.run(command, timeout.unwrap_or(self.default_timeout)).await
    }

    fn supports_processes(&self) -> bool {
        true
    }

    async fn ps(&self) -> HandlerResult<String> {
        let mut background = self.background.lock();
        if background.is_empty() {
            return Ok("No background processes".to_string());
        }

        let mut lines = vec!["PID\tSTATUS\tCOMMAND".to_string()];
        let mut exited = Vec::new();
        for (pid, process) in background.iter_mut() {
            let status = match process.child.try_wait() {
                Ok(None) => "running".to_string(),
                Ok(Some(status)) => {
                    exited.push(*pid);
                    format!("exited ({})", status.code().unwrap_or(-1))
                }
                Err(e) => format!("unknown ({})", e),
            };
            lines.push(format!("{}\t{}\t{}", pid, status, process.command));
        }
        // Reported once, then forgotten
        for pid in exited {
            background.remove(&pid);
        }
        Ok(lines.join("\n"))
    }

    async fn kill(&self, pid: u32) -> HandlerResult<String> {
        let process = self.background.lock().remove(&pid);
        let Some(mut process) = process else {
            return Err(HandlerError::failed(format!(
                "No background process with pid {}",
                pid
            )));
        };
        process
            .child
            .kill()
            .await
            .map_err(|e| HandlerError::failed(format!("Failed to kill {}: {}", pid, e)))?;
        tracing::info!("Killed background process {}", pid);
        Ok(format!("Killed process {} ({})", pid, process.command))
    }
}
