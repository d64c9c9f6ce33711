use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use crate::{
    config::{Config, StoreKind},
    dataset::DatasetWriter,
    store::{MemoryStore, MongoStore, Store},
};

pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn Store>,
    pub datasets: DatasetWriter,
    pub http: reqwest::Client,
}

impl AppState {
    /// Connects the configured store; a dead database is a boot failure, not
    /// a per-request one.
    pub async fn new(config: Config) -> anyhow::Result<Arc<Self>> {
        let store: Arc<dyn Store> = match config.store {
            StoreKind::Memory => {
                info!("Using in-memory store");
                Arc::new(MemoryStore::new())
            }
            StoreKind::Mongo => {
                info!("Connecting to MongoDB at {}", config.mongo_url);
                Arc::new(
                    MongoStore::connect(&config.mongo_url, &config.mongo_db)
                        .await
                        .context("MongoDB connection failed")?,
                )
            }
        };

        Ok(Self::with_store(config, store))
    }

    pub fn with_store(config: Config, store: Arc<dyn Store>) -> Arc<Self> {
        let datasets = DatasetWriter::new(config.data_dir.clone());
        Arc::new(Self {
            config,
            store,
            datasets,
            http: reqwest::Client::new(),
        })
    }
}
