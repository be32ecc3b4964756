//! Decision service backed by a local subprocess.
//!
//! The prompt is written to the child's stdin and its stdout is parsed as a
//! decision. Any model runner that reads a prompt and prints JSON works.

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::decision::{parse_decision_text, DecisionRequest, DecisionService, RawDecision};
use crate::prompts::build_decision_prompt;

#[derive(Debug, Clone)]
pub struct CommandDecisionService {
    program: String,
    args: Vec<String>,
}

impl CommandDecisionService {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Split a command line on whitespace. No shell quoting is interpreted.
    pub fn from_command_line(command_line: &str) -> Option<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self::new(program, parts.collect()))
    }

    async fn run(&self, prompt: &str) -> Result<String> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            // the scheduler's timeout drops this future; the child goes with it
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn decision command '{}'", self.program))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(prompt.as_bytes())
                .await
                .context("Failed to write prompt to decision command")?;
        }

        let output = child
            .wait_with_output()
            .await
            .context("Failed to wait for decision command")?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            anyhow::bail!(
                "Decision command failed with status {}:\nStderr: {}",
                output.status,
                stderr
            );
        } else if !stderr.is_empty() {
            tracing::debug!("Decision command stderr (success): {}", stderr);
        }
        Ok(stdout.to_string())
    }
}

#[async_trait]
impl DecisionService for CommandDecisionService {
    async fn decide(&self, request: &DecisionRequest) -> Result<RawDecision> {
        let prompt = build_decision_prompt(request);
        let stdout = self.run(&prompt).await?;
        parse_decision_text(&stdout)
    }

    fn name(&self) -> &str {
        &self.program
    }
}
