//! Caller-owned polling loop over [`RemoteInjector::poll`].

use std::time::Duration;

use tracing::debug;

use super::{RemoteCommand, RemoteInjector};
use crate::config::InjectConfig;
use crate::error::RemoteError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl PollPolicy {
    pub fn from_config(config: &InjectConfig) -> Self {
        Self {
            interval: Duration::from_secs(config.poll_interval_secs),
            max_attempts: config.poll_max_attempts,
        }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::from_config(&InjectConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Finished(RemoteCommand),
    /// Attempts ran out before a terminal status; carries the last read.
    StillRunning(RemoteCommand),
}

impl PollOutcome {
    pub fn command(&self) -> &RemoteCommand {
        match self {
            Self::Finished(command) | Self::StillRunning(command) => command,
        }
    }
}

/// Poll until the invocation is terminal or `policy` is exhausted.
///
/// At least one poll is made. Dropping the future stops polling; the remote
/// command itself keeps running.
pub async fn watch(
    injector: &RemoteInjector,
    command_id: &str,
    instance: &str,
    policy: PollPolicy,
) -> Result<PollOutcome, RemoteError> {
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        let command = injector.poll(command_id, instance).await?;
        if command.is_terminal() {
            return Ok(PollOutcome::Finished(command));
        }
        if attempt >= attempts {
            debug!(command_id, instance, attempts, "poll attempts exhausted");
            return Ok(PollOutcome::StillRunning(command));
        }
        attempt += 1;
        tokio::time::sleep(policy.interval).await;
    }
}
