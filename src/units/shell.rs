// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 tierflow contributors

//! Shell unit
//!
//! Runs an external command for a stage. Bound parameters are exported as
//! `TIERFLOW_<NAME>` environment variables; a script may self-report its
//! outcome by printing a JSON object as its last line of output.

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::process::Command;

use super::{kinds, normalize_report, StageError, StageOutcome, StageParams, StageUnit};

/// Parameter holding the command line
pub const COMMAND_PARAM: &str = "command";
/// Parameter overriding the shell
pub const SHELL_PARAM: &str = "shell";

/// Shell unit
pub struct ShellUnit {
    default_shell: String,
}

impl ShellUnit {
    /// Create a shell unit using `sh`
    pub fn new() -> Self {
        Self {
            default_shell: "sh".to_string(),
        }
    }

    /// Create a shell unit using another default shell
    pub fn with_shell(shell: impl Into<String>) -> Self {
        Self {
            default_shell: shell.into(),
        }
    }
}

impl Default for ShellUnit {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StageUnit for ShellUnit {
    async fn run(&self, params: &StageParams) -> StageOutcome {
        let command = params.require_str(COMMAND_PARAM)?;
        let shell = params.str(SHELL_PARAM).unwrap_or(&self.default_shell);

        let mut cmd = Command::new(shell);
        cmd.arg("-c").arg(command);
        // Timeouts and cancellation drop this future; the child goes with it
        cmd.kill_on_drop(true);

        if let Some(dir) = params.output_dir() {
            cmd.current_dir(dir);
        }

        for (name, value) in params.iter() {
            if name == COMMAND_PARAM || name == SHELL_PARAM {
                continue;
            }
            cmd.env(env_name(name), env_value(value));
        }

        tracing::debug!(shell, command, "spawning shell unit");

        let output = cmd.output().await.map_err(|e| {
            StageError::raised(kinds::SPAWN, format!("failed to start '{}': {}", shell, e))
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            let exit_code = output.status.code().unwrap_or(-1);
            let message = last_line(&stderr)
                .map(str::to_string)
                .unwrap_or_else(|| format!("command exited with status {}", exit_code));

            let mut trace = vec![format!("$ {}", command)];
            trace.extend(stderr.lines().map(str::to_string));
            trace.push(format!("exit status: {}", exit_code));

            return Err(StageError::raised(kinds::EXIT_STATUS, message).with_trace(trace));
        }

        // A trailing JSON object is the script's own report
        if let Some(line) = last_line(&stdout) {
            if let Ok(report @ Value::Object(_)) = serde_json::from_str::<Value>(line) {
                return normalize_report(report);
            }
        }

        Ok(json!({
            "exit_code": 0,
            "stdout": stdout.trim_end(),
        }))
    }

    fn describe(&self) -> &str {
        "Run a shell command (params: command, shell)"
    }

    async fn check_available(&self) -> bool {
        which::which(&self.default_shell).is_ok()
    }
}

fn last_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).rfind(|line| !line.is_empty())
}

fn env_name(param: &str) -> String {
    let upper: String = param
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("TIERFLOW_{}", upper)
}

fn env_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(env_value)
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
