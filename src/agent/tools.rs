use chrono::{DateTime, SecondsFormat, Utc};
use std::error::Error;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

use crate::model::ToolDefinition;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolExecutionError {
    message: String,
}

impl ToolExecutionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for ToolExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Error for ToolExecutionError {}

pub type ToolExecutionResult = std::result::Result<String, ToolExecutionError>;
type ToolFn = Box<dyn Fn() -> ToolExecutionResult + Send + Sync>;

pub struct Tool {
    definition: ToolDefinition,
    callable: ToolFn,
}

impl Tool {
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn definition(&self) -> &ToolDefinition {
        &self.definition
    }
}

impl fmt::Debug for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.definition.name)
            .finish_non_exhaustive()
    }
}

/// Local functions the remote model may call, in registration order.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: Vec<Tool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the clock and system inspection tools.
    pub fn with_builtins() -> Result<Self, ToolExecutionError> {
        let mut registry = Self::new();
        registry.register(
            ToolDefinition::new(
                "get_current_datetime_utc",
                "Returns the current date and time in UTC (RFC 3339) and as unix seconds.",
            ),
            current_datetime_utc,
        )?;
        registry.register(
            ToolDefinition::new(
                "get_system_uname",
                "Returns the output of `uname -a` on the user's machine.",
            ),
            || run_command("uname", &["-a"]),
        )?;
        registry.register(
            ToolDefinition::new(
                "get_system_uptime",
                "Returns the output of `uptime` on the user's machine.",
            ),
            || run_command("uptime", &[]),
        )?;
        Ok(registry)
    }

    pub fn register<F>(
        &mut self,
        definition: ToolDefinition,
        callable: F,
    ) -> Result<(), ToolExecutionError>
    where
        F: Fn() -> ToolExecutionResult + Send + Sync + 'static,
    {
        if self.lookup(&definition.name).is_some() {
            return Err(ToolExecutionError::new(format!(
                "tool '{}' is already registered",
                definition.name
            )));
        }
        self.tools.push(Tool {
            definition,
            callable: Box::new(callable),
        });
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<&Tool> {
        self.tools.iter().find(|tool| tool.name() == name)
    }

    pub fn definitions(&self) -> impl Iterator<Item = &ToolDefinition> {
        self.tools.iter().map(Tool::definition)
    }

    /// Runs the tool and always returns text. Errors and panics come back as
    /// `ERROR: ...` so the model can see what went wrong.
    pub fn invoke(&self, tool: &Tool) -> String {
        debug!(tool_name = %tool.name(), "running tool");
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| (tool.callable)()));
        match outcome {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => {
                warn!(tool_name = %tool.name(), error = %err, "tool failed");
                format!("ERROR: {err}")
            }
            Err(payload) => {
                let reason = payload
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                warn!(tool_name = %tool.name(), reason = %reason, "tool panicked");
                format!("ERROR: tool '{}' panicked: {reason}", tool.name())
            }
        }
    }
}

fn current_datetime_utc() -> ToolExecutionResult {
    let now = SystemTime::now();
    let secs = now
        .duration_since(UNIX_EPOCH)
        .map_err(|err| ToolExecutionError::new(format!("system clock before unix epoch: {err}")))?
        .as_secs();
    let timestamp = DateTime::<Utc>::from(now).to_rfc3339_opts(SecondsFormat::Secs, true);
    Ok(format!("{timestamp} (unix: {secs})"))
}

fn run_command(program: &str, args: &[&str]) -> ToolExecutionResult {
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|err| ToolExecutionError::new(format!("failed to run '{program}': {err}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ToolExecutionError::new(format!(
            "'{program}' exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
