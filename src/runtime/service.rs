//! Worker service wiring
//!
//! Builds the coordination client, leader election and partitioner for one
//! worker process from [`Config`] and runs their lifecycle in order.

use std::sync::Arc;
use tracing::{info, warn};

use super::shutdown::ShutdownSignal;
use crate::config::Config;
use crate::coordination::{CoordinationClient, LeaderElection, MemberId, Partitioner};
use crate::error::Result;
use crate::locking::ZoneLock;

/// One worker's coordination stack
pub struct Service {
    config: Config,
    client: Arc<CoordinationClient>,
    election: Arc<LeaderElection>,
    partitioner: Arc<Partitioner>,
}

impl Service {
    /// Validate `config` and build the stack under a fresh member id
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let client = CoordinationClient::new(config.coordination.clone(), MemberId::generate())?;
        Self::with_client(config, Arc::new(client))
    }

    /// Build the stack over an existing client
    pub fn with_client(config: Config, client: Arc<CoordinationClient>) -> Result<Self> {
        config.validate()?;
        let group = config.coordination.group_id.clone();
        let coordination = (!client.is_standalone()).then(|| client.clone());

        let election = LeaderElection::new(coordination.clone(), group.clone());
        let partitioner = Partitioner::new(
            coordination,
            group,
            client.member_id().to_string(),
            config.partitioning.partitions(),
        );

        Ok(Self {
            config,
            client,
            election,
            partitioner,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn member_id(&self) -> &MemberId {
        self.client.member_id()
    }

    pub fn client(&self) -> &Arc<CoordinationClient> {
        &self.client
    }

    pub fn election(&self) -> &Arc<LeaderElection> {
        &self.election
    }

    pub fn partitioner(&self) -> &Arc<Partitioner> {
        &self.partitioner
    }

    /// Zone lock over this worker's coordination client
    pub fn zone_lock(&self) -> ZoneLock {
        ZoneLock::new(self.client.clone())
    }

    /// Signal that interrupts startup and stops background work
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.client.shutdown_signal()
    }

    /// Start client, election and partitioner, in that order.
    ///
    /// Blocks until the backend accepts the connection. Anything already
    /// started is stopped again if a later step fails.
    pub async fn start(&self) -> Result<()> {
        info!(member = %self.member_id(), group = %self.config.coordination.group_id, "starting worker service");
        self.client.start().await?;

        let started = async {
            self.election.start().await?;
            self.partitioner.start().await
        }
        .await;
        if let Err(e) = started {
            self.stop().await;
            return Err(e);
        }

        info!(
            member = %self.member_id(),
            leader = self.election.is_leader(),
            partitions = self.partitioner.my_partitions().len(),
            "worker service started"
        );
        Ok(())
    }

    /// Stop in reverse start order
    pub async fn stop(&self) {
        self.partitioner.stop().await;
        if let Err(e) = self.election.stop().await {
            warn!(error = %e, "failed to leave leader election cleanly");
        }
        self.client.stop().await;
        info!(member = %self.member_id(), "worker service stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_standalone_service() {
        let service = Service::new(Config::default()).unwrap();
        service.start().await.unwrap();

        assert!(service.election().is_leader());
        assert_eq!(
            service.partitioner().my_partitions().len(),
            crate::DEFAULT_PARTITION_COUNT as usize
        );

        service.stop().await;
        assert!(!service.election().is_leader());
        assert!(service.partitioner().my_partitions().is_empty());
    }

    #[test]
    fn test_rejects_invalid_config() {
        let mut config = Config::default();
        config.scheduler.filters.clear();
        assert!(Service::new(config).is_err());
    }
}
