//! SSM Run Command implementation of [`RemoteExec`].

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_ssm as ssm;
use aws_sdk_ssm::error::DisplayErrorContext;

use super::{CommandStatus, RemoteCommand, RemoteExec, SendCommand};
use crate::error::RemoteError;

#[derive(Debug, Clone)]
pub struct SsmRemoteExec {
    client: ssm::Client,
}

impl SsmRemoteExec {
    pub fn new(client: ssm::Client) -> Self {
        Self { client }
    }

    pub async fn from_region(region: &str) -> Self {
        let conf = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;
        Self::new(ssm::Client::new(&conf))
    }
}

#[async_trait]
impl RemoteExec for SsmRemoteExec {
    async fn send_command(&self, command: SendCommand) -> Result<String, RemoteError> {
        let out = self
            .client
            .send_command()
            .document_name(command.document)
            .instance_ids(&command.instance)
            .comment(&command.comment)
            .parameters("commands", command.commands)
            .send()
            .await
            .map_err(|e| RemoteError::Send {
                instance: command.instance.clone(),
                message: DisplayErrorContext(&e).to_string(),
            })?;

        out.command()
            .and_then(|c| c.command_id())
            .map(str::to_string)
            .ok_or_else(|| RemoteError::Send {
                instance: command.instance,
                message: "response carried no command id".to_string(),
            })
    }

    async fn get_invocation(
        &self,
        command_id: &str,
        instance: &str,
    ) -> Result<RemoteCommand, RemoteError> {
        let out = self
            .client
            .get_command_invocation()
            .command_id(command_id)
            .instance_id(instance)
            .send()
            .await
            .map_err(|e| {
                let missing = e
                    .as_service_error()
                    .map(|se| se.is_invocation_does_not_exist())
                    .unwrap_or(false);
                if missing {
                    RemoteError::InvocationNotFound {
                        command_id: command_id.to_string(),
                        instance: instance.to_string(),
                    }
                } else {
                    RemoteError::Poll {
                        command_id: command_id.to_string(),
                        instance: instance.to_string(),
                        message: DisplayErrorContext(&e).to_string(),
                    }
                }
            })?;

        Ok(RemoteCommand {
            command_id: command_id.to_string(),
            target_instance: instance.to_string(),
            status: out
                .status()
                .map(|s| CommandStatus::from_service(s.as_str()))
                .unwrap_or(CommandStatus::Pending),
            status_details: out.status_details().map(str::to_string),
            stdout: out.standard_output_content().unwrap_or_default().to_string(),
            stderr: out.standard_error_content().unwrap_or_default().to_string(),
            stdout_url: out.standard_output_url().map(str::to_string),
            stderr_url: out.standard_error_url().map(str::to_string),
        })
    }
}
