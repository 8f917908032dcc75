//! Dispatch of command batches to the hosts attached to a pool.
//!
//! The candidate hosts are the Up hosts attached to the pool, shuffled to spread the load, with
//! the preferred hosts moved to the front in the order given and the avoided hosts removed.
//! Each candidate is tried at most once: a host fault (agent unavailable or timed out) moves on
//! to the next candidate while any other failure is returned straight away.
use crate::controller::registry::Registry;
use agents::errors::SvcError;
use rand::seq::SliceRandom;
use stor_port::{
    transport_api::ErrorChain,
    types::v0::{
        store::host::Host,
        transport::{Answer, Command, HostId, PoolId},
    },
};

/// The answers to a command batch and the host which produced them.
#[derive(Debug, Clone)]
pub(crate) struct Dispatched {
    pub(crate) host: HostId,
    pub(crate) answers: Vec<Answer>,
}
impl Dispatched {
    /// The answer to the first command of the batch.
    pub(crate) fn answer(&self) -> Option<&Answer> {
        self.answers.first()
    }
}

/// Sends command batches to hosts.
pub(crate) struct CommandDispatcher<'a> {
    registry: &'a Registry,
}

impl<'a> CommandDispatcher<'a> {
    /// Create a new `Self` on top of the registry.
    pub(crate) fn new(registry: &'a Registry) -> Self {
        Self { registry }
    }

    /// The hosts to try, in order, for a command batch targeting the pool.
    pub(crate) fn candidates(
        &self,
        pool: &PoolId,
        preferred: &[HostId],
        avoid: &[HostId],
    ) -> Vec<Host> {
        let mut hosts = self
            .registry
            .specs()
            .pool_hosts(pool)
            .into_iter()
            .filter(Host::is_up)
            .collect::<Vec<_>>();
        hosts.shuffle(&mut rand::thread_rng());

        let mut ordered = Vec::with_capacity(hosts.len());
        for preferred in preferred {
            if let Some(index) = hosts.iter().position(|host| &host.id == preferred) {
                ordered.push(hosts.remove(index));
            }
        }
        ordered.extend(hosts);
        ordered.retain(|host| !avoid.contains(&host.id));
        ordered
    }

    /// Send the commands to a host attached to the pool, failing over to the next candidate
    /// on host faults.
    #[tracing::instrument(level = "debug", skip(self, commands), err)]
    pub(crate) async fn send(
        &self,
        pool: &PoolId,
        commands: Vec<Command>,
        preferred: &[HostId],
        avoid: &[HostId],
    ) -> Result<Dispatched, SvcError> {
        for host in self.candidates(pool, preferred, avoid) {
            match self.send_host(&host, &commands).await {
                Ok(dispatched) => return Ok(dispatched),
                Err(SvcError::Transport { source }) if source.is_host_fault() => {
                    tracing::warn!(
                        host.id = %host.id,
                        pool.id = %pool,
                        error = source.full_string(),
                        "Host unavailable, trying the next host"
                    );
                }
                Err(error) => return Err(error),
            }
        }
        Err(SvcError::StorageUnavailable {
            pool_id: pool.clone(),
        })
    }

    /// Send the commands to the given host, without failover.
    #[tracing::instrument(level = "debug", skip(self, commands), err)]
    pub(crate) async fn send_to_host(
        &self,
        host: &HostId,
        commands: Vec<Command>,
    ) -> Result<Dispatched, SvcError> {
        let host = self.registry.specs().host(host)?;
        self.send_host(&host, &commands).await
    }

    async fn send_host(&self, host: &Host, commands: &[Command]) -> Result<Dispatched, SvcError> {
        tracing::trace!(host.id = %host.id, ?commands, "Sending commands");
        let answers = self.registry.transport().send(host, commands).await?;
        if answers.len() != commands.len() {
            return Err(SvcError::HostCommand {
                host: host.id.to_string(),
                command: commands
                    .get(answers.len())
                    .map_or("", |command| command.name())
                    .to_string(),
                details: format!(
                    "expected {} answers, received {}",
                    commands.len(),
                    answers.len()
                ),
            });
        }
        for (command, answer) in commands.iter().zip(&answers) {
            if let Some(details) = answer.failure() {
                return Err(SvcError::HostCommand {
                    host: host.id.to_string(),
                    command: command.name().to_string(),
                    details: details.to_string(),
                });
            }
        }
        Ok(Dispatched {
            host: host.id.clone(),
            answers,
        })
    }
}
