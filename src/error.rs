//! Error taxonomy for agent runs.
//!
//! Bridge-level failures are classified here and caught at the run boundary;
//! the scheduler only ever sees a `RunOutcome`.

use std::fmt::{Display, Formatter};
use std::path::PathBuf;

/// Errors that can occur while launching or driving the agent process.
#[derive(Debug)]
pub enum RunError {
    /// The agent executable could not be located anywhere.
    ExecutableNotFound { name: String, searched: Vec<PathBuf> },
    /// The process could not be spawned.
    ProcessStartFailed { source: std::io::Error },
    /// The process exited with a non-zero status.
    ProcessFailed { code: Option<i32>, stderr: String },
    /// A write was attempted after the input stream was closed.
    StdinClosed,
    /// The tool-permission callback did not answer within its timeout.
    ToolPermissionTimeout { tool_name: String },
    /// A tool call was denied with the interrupt flag set.
    ToolDenied { tool_name: String, message: String },
    /// The run's cancellation signal fired.
    Cancelled,
    /// An I/O error while reading or writing the process streams.
    Io(std::io::Error),
}

impl Display for RunError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExecutableNotFound { name, searched } => {
                write!(f, "agent executable '{}' not found; searched: ", name)?;
                for (i, path) in searched.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", path.display())?;
                }
                Ok(())
            }
            Self::ProcessStartFailed { source } => {
                write!(f, "failed to start agent process: {}", source)
            }
            Self::ProcessFailed { code, stderr } => {
                let code = code.map_or_else(|| "signal".to_string(), |c| c.to_string());
                if stderr.is_empty() {
                    write!(f, "agent process exited with status {}", code)
                } else {
                    write!(f, "agent process exited with status {}: {}", code, stderr)
                }
            }
            Self::StdinClosed => write!(f, "agent stdin is closed"),
            Self::ToolPermissionTimeout { tool_name } => {
                write!(f, "tool permission decision for '{}' timed out", tool_name)
            }
            Self::ToolDenied { tool_name, message } => {
                write!(f, "tool '{}' denied: {}", tool_name, message)
            }
            Self::Cancelled => write!(f, "run cancelled"),
            Self::Io(e) => write!(f, "process i/o error: {}", e),
        }
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ProcessStartFailed { source } => Some(source),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for RunError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}
