use crate::gateway::{self, Gateway};
use crate::pipeline::BidPipeline;
use crate::reaper::ExpiryReaper;
use anyhow::{Context, Result};
use futures::future::join_all;
use gavel_rs::config::{Config, OP_DEADLINE};
use gavel_rs::{coordinator, LockService, RoomRegistry, Store};
use std::sync::Arc;

pub struct Service {
    config: Config,
}

impl Service {
    pub fn from(config: Config) -> Self {
        Self { config }
    }

    /// Construct the component graph and run until a task exits. Clients are
    /// handed to each component as capabilities; nothing reaches for globals.
    pub async fn run(&self) -> Result<()> {
        let config = &self.config;

        let store = Store::connect(&config.store_url, OP_DEADLINE)
            .await
            .context("could not connect to store")?;
        store.migrate().await.context("could not prepare store schema")?;

        let coordinator = coordinator::from_url(&config.coordinator_url)
            .context("could not construct coordinator")?;

        let rooms = Arc::new(RoomRegistry::new());
        let locks = Arc::new(LockService::new(coordinator.clone(), config.lock_ttl()));
        let pipeline = BidPipeline::new(
            store.clone(),
            coordinator.clone(),
            locks,
            rooms.clone(),
        );
        let reaper = ExpiryReaper::new(store.clone(), rooms.clone(), config.expiry_tick());
        let gateway = Gateway::new(
            pipeline,
            rooms,
            store,
            coordinator,
            config.credential_secret.clone(),
            config.allowed_origin.clone(),
        );
        let api_server = gateway::Server::new(config.host, config.listen_port, gateway);

        let mut tasks = vec![];
        tasks.push(tokio::spawn(async move {
            reaper.run().await;
        }));
        tasks.push(tokio::spawn(async move {
            if let Err(err) = api_server.serve().await {
                tracing::error!(%err, "gateway server exited");
            }
        }));
        join_all(tasks).await;
        Ok(())
    }
}
