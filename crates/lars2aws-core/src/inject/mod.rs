//! Remote injection: copy landed artifacts onto a host through a
//! remote-execution service and observe the result.
//!
//! [`RemoteInjector::dispatch`] returns as soon as the command is accepted.
//! Completion is observed with [`RemoteInjector::poll`], either directly or
//! through the [`watch`] loop.

pub mod script;
pub mod ssm;
pub mod watch;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Serialize, Serializer};
use tracing::{debug, info};

use crate::config::InjectConfig;
use crate::error::RemoteError;

pub use script::{InjectScript, launcher};
pub use ssm::SsmRemoteExec;
pub use watch::{PollOutcome, PollPolicy, watch};

/// Remote-execution document that runs shell commands.
pub const RUN_SHELL_DOCUMENT: &str = "AWS-RunShellScript";

/// Service limit on command comments.
pub const MAX_COMMENT_LEN: usize = 100;

/// One command dispatched to one instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendCommand {
    pub instance: String,
    pub document: &'static str,
    pub commands: Vec<String>,
    pub comment: String,
}

#[async_trait]
pub trait RemoteExec: Send + Sync {
    /// Submit `command`, returning the service's command id.
    async fn send_command(&self, command: SendCommand) -> Result<String, RemoteError>;

    /// Read the current state of one invocation.
    ///
    /// An invocation the service does not know yet is
    /// [`RemoteError::InvocationNotFound`].
    async fn get_invocation(
        &self,
        command_id: &str,
        instance: &str,
    ) -> Result<RemoteCommand, RemoteError>;
}

/// Invocation status as reported by the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandStatus {
    Pending,
    InProgress,
    Delayed,
    Cancelling,
    Success,
    Failed,
    Cancelled,
    TimedOut,
    Other(String),
}

impl CommandStatus {
    pub fn from_service(value: &str) -> Self {
        match value {
            "Pending" => Self::Pending,
            "InProgress" => Self::InProgress,
            "Delayed" => Self::Delayed,
            "Cancelling" => Self::Cancelling,
            "Success" => Self::Success,
            "Failed" => Self::Failed,
            "Cancelled" => Self::Cancelled,
            "TimedOut" => Self::TimedOut,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "Pending",
            Self::InProgress => "InProgress",
            Self::Delayed => "Delayed",
            Self::Cancelling => "Cancelling",
            Self::Success => "Success",
            Self::Failed => "Failed",
            Self::Cancelled => "Cancelled",
            Self::TimedOut => "TimedOut",
            Self::Other(other) => other,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Success | Self::Failed | Self::Cancelled | Self::TimedOut
        )
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for CommandStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Observed state of a dispatched command on one instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteCommand {
    pub command_id: String,
    pub target_instance: String,
    pub status: CommandStatus,
    pub status_details: Option<String>,
    /// Only meaningful once the status is terminal.
    pub stdout: String,
    pub stderr: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdout_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr_url: Option<String>,
}

impl RemoteCommand {
    pub fn pending(command_id: &str, instance: &str) -> Self {
        Self {
            command_id: command_id.to_string(),
            target_instance: instance.to_string(),
            status: CommandStatus::Pending,
            status_details: None,
            stdout: String::new(),
            stderr: String::new(),
            stdout_url: None,
            stderr_url: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// A file selection to copy onto one instance.
///
/// `preclear` and `dest_dir` fall back to the injector's configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InjectRequest {
    pub instance: String,
    pub bucket: String,
    pub root: String,
    pub key_prefix: String,
    pub files: Vec<String>,
    pub preclear: Option<Vec<String>>,
    pub dest_dir: Option<String>,
}

pub struct RemoteInjector {
    exec: Arc<dyn RemoteExec>,
    config: InjectConfig,
}

impl RemoteInjector {
    pub fn new(exec: Arc<dyn RemoteExec>, config: InjectConfig) -> Self {
        Self { exec, config }
    }

    pub fn config(&self) -> &InjectConfig {
        &self.config
    }

    /// Build the command for `request` without sending it.
    pub fn prepare(&self, request: &InjectRequest) -> Result<SendCommand, RemoteError> {
        let instance = request.instance.trim();
        if instance.is_empty() {
            return Err(RemoteError::InvalidRequest("instance id is empty".to_string()));
        }
        if let Some(user) = self.config.run_as_user.as_deref() {
            if !script::is_valid_user(user) {
                return Err(RemoteError::InvalidRequest(format!(
                    "run-as user '{}' is not a plain user name",
                    user
                )));
            }
        }

        let script = InjectScript {
            dest_dir: request.dest_dir.as_deref().unwrap_or(&self.config.dest_dir),
            bucket: &request.bucket,
            root: &request.root,
            key_prefix: &request.key_prefix,
            files: &request.files,
            preclear: request.preclear.as_deref().unwrap_or(&self.config.preclear),
            listing_filter: self.config.listing_filter.as_deref(),
        };
        let body = script.render()?;
        let comment = truncate_comment(&format!(
            "Inject builds to {} from {}",
            instance,
            script.source_prefix()
        ));

        Ok(SendCommand {
            instance: instance.to_string(),
            document: RUN_SHELL_DOCUMENT,
            commands: vec![launcher(
                &body,
                self.config.run_as_user.as_deref(),
                self.config.login_shell,
            )],
            comment,
        })
    }

    /// Validate, render and submit. Returns the command id without waiting.
    pub async fn dispatch(&self, request: &InjectRequest) -> Result<String, RemoteError> {
        let command = self.prepare(request)?;
        let instance = command.instance.clone();
        let files = request.files.len();
        let command_id = self.exec.send_command(command).await?;
        info!(command_id = %command_id, instance = %instance, files, "inject command dispatched");
        Ok(command_id)
    }

    /// One status read. A not-yet-registered invocation reads as `Pending`.
    pub async fn poll(&self, command_id: &str, instance: &str) -> Result<RemoteCommand, RemoteError> {
        match self.exec.get_invocation(command_id, instance).await {
            Ok(command) => {
                debug!(command_id, instance, status = %command.status, "invocation polled");
                Ok(command)
            }
            Err(RemoteError::InvocationNotFound { .. }) => {
                debug!(command_id, instance, "invocation not registered yet");
                Ok(RemoteCommand::pending(command_id, instance))
            }
            Err(e) => Err(e),
        }
    }
}

fn truncate_comment(comment: &str) -> String {
    comment.chars().take(MAX_COMMENT_LEN).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        for status in ["Success", "Failed", "Cancelled", "TimedOut"] {
            assert!(CommandStatus::from_service(status).is_terminal());
        }
        for status in ["Pending", "InProgress", "Delayed", "Cancelling", "Weird"] {
            assert!(!CommandStatus::from_service(status).is_terminal());
        }
        assert_eq!(CommandStatus::from_service("Weird").as_str(), "Weird");
    }

    #[test]
    fn comment_is_capped() {
        let long = "x".repeat(250);
        assert_eq!(truncate_comment(&long).len(), MAX_COMMENT_LEN);
        assert_eq!(truncate_comment("short"), "short");
    }
}
