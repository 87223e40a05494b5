//! Local CLI transport: prompt on stdin, reply on stdout

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::transport::{LlmTransport, TransportError};

pub struct CliTransport {
    provider: String,
    program: String,
    args: Vec<String>,
    model_flag: Option<&'static str>,
    timeout: Duration,
}

impl CliTransport {
    pub fn new(
        provider: impl Into<String>,
        program: impl Into<String>,
        args: Vec<String>,
        model_flag: Option<&'static str>,
        timeout: Duration,
    ) -> Self {
        Self {
            provider: provider.into(),
            program: program.into(),
            args,
            model_flag,
            timeout,
        }
    }

    /// Known CLIs: `claude -p` and `codex exec -`
    pub fn for_provider(provider: &str, timeout: Duration) -> Option<Self> {
        let (args, model_flag): (&[&str], _) = match provider {
            "claude" => (&["-p", "--output-format", "text"], "--model"),
            "codex" => (&["exec", "-"], "-m"),
            _ => return None,
        };
        Some(Self::new(
            provider,
            provider,
            args.iter().map(|a| a.to_string()).collect(),
            Some(model_flag),
            timeout,
        ))
    }

    fn command_args(&self, model: &str) -> Vec<String> {
        let mut args = self.args.clone();
        if let Some(flag) = self.model_flag.filter(|_| !model.is_empty()) {
            args.push(flag.to_string());
            args.push(model.to_string());
        }
        args
    }
}

#[async_trait]
impl LlmTransport for CliTransport {
    fn provider(&self) -> &str {
        &self.provider
    }

    async fn send(&self, prompt: &str, model: &str) -> Result<String, TransportError> {
        let mut child = Command::new(&self.program)
            .args(self.command_args(model))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    TransportError::fatal(format!("CLI command '{}' not found", self.program))
                }
                _ => TransportError::fatal(format!("Failed to start '{}': {}", self.program, e)),
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            // A CLI that exits without reading stdin surfaces through its exit status
            if let Err(e) = stdin.write_all(prompt.as_bytes()).await {
                tracing::debug!("Failed to write prompt to '{}': {}", self.program, e);
            }
        }

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| {
                TransportError::transient(format!("Failed to wait for '{}': {}", self.program, e))
            })?,
            Err(_) => {
                return Err(TransportError::transient(format!(
                    "CLI '{}' timed out after {}s",
                    self.program,
                    self.timeout.as_secs()
                )))
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TransportError::transient(format!(
                "CLI '{}' exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        tracing::debug!("CLI response: {}", stdout);
        Ok(stdout)
    }
}
