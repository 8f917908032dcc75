use serde::{Deserialize, Serialize};
use std::time::Duration;
use stor_port::{
    transport_api::TransportError,
    types::v0::{
        store::host::Host,
        transport::{Answer, Command},
    },
};

/// Sends a batch of commands to the agent of a host.
/// Agent unavailability and timeouts must be reported as such, as they are retried on the
/// next host by the dispatcher.
#[async_trait::async_trait]
pub(crate) trait HostTransport: Send + Sync {
    /// Send the commands and return one answer per command.
    async fn send(&self, host: &Host, commands: &[Command]) -> Result<Vec<Answer>, TransportError>;
}

/// Body of a command batch request.
#[derive(Serialize, Debug)]
struct CommandBatch<'a> {
    commands: &'a [Command],
}

/// Reply to a command batch request.
#[derive(Deserialize, Debug)]
struct AnswerBatch {
    answers: Vec<Answer>,
}

/// Talks to the host agents over http, posting the batch as json to `{endpoint}/v0/commands`.
#[derive(Debug, Clone)]
pub(crate) struct HttpTransport {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpTransport {
    /// Create a new `Self` where every request times out after `timeout`.
    pub(crate) fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::ClientBuilder::new()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(|error| TransportError::Failed {
                host: String::new(),
                operation: "build_client".to_string(),
                reason: error.to_string(),
            })?;
        Ok(Self { client, timeout })
    }

    fn map_error(&self, host: &Host, operation: &str, error: reqwest::Error) -> TransportError {
        if error.is_timeout() {
            TransportError::OperationTimedOut {
                host: host.id.to_string(),
                operation: operation.to_string(),
                timeout: self.timeout,
            }
        } else if error.is_connect() {
            TransportError::AgentUnavailable {
                host: host.id.to_string(),
                reason: error.to_string(),
            }
        } else {
            TransportError::Failed {
                host: host.id.to_string(),
                operation: operation.to_string(),
                reason: error.to_string(),
            }
        }
    }
}

#[async_trait::async_trait]
impl HostTransport for HttpTransport {
    async fn send(&self, host: &Host, commands: &[Command]) -> Result<Vec<Answer>, TransportError> {
        let operation = commands
            .iter()
            .map(Command::name)
            .collect::<Vec<_>>()
            .join(",");
        let url = format!("{}/v0/commands", host.endpoint.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .json(&CommandBatch { commands })
            .send()
            .await
            .map_err(|error| self.map_error(host, &operation, error))?;

        let status = response.status();
        if status == reqwest::StatusCode::SERVICE_UNAVAILABLE {
            return Err(TransportError::AgentUnavailable {
                host: host.id.to_string(),
                reason: status.to_string(),
            });
        }
        if !status.is_success() {
            return Err(TransportError::Failed {
                host: host.id.to_string(),
                operation,
                reason: status.to_string(),
            });
        }

        let batch = response
            .json::<AnswerBatch>()
            .await
            .map_err(|error| self.map_error(host, &operation, error))?;
        Ok(batch.answers)
    }
}
