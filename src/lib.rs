pub mod config;
pub mod controllers;
pub mod database;
pub mod error;
pub mod models;
pub mod services;

use std::sync::Arc;

use services::gateway::{GatewayClient, SignatureVerifier};
use services::notify::Notifier;

// Shared state for the whole application
#[derive(Clone)]
pub struct AppState {
    pub db: database::Database,
    pub config: config::Config,
    pub gateway: GatewayClient,
    pub verifier: SignatureVerifier,
    pub notifier: Notifier,
}

impl AppState {
    pub async fn new(config: config::Config) -> anyhow::Result<Arc<Self>> {
        let db = database::Database::new(&config.database).await?;

        db.run_migrations().await?;

        let gateway = GatewayClient::from_config(&config.payment, &config.circuit_breaker);
        let verifier = gateway.verifier();
        let notifier = Notifier::from_config(&config.notify);

        Ok(Arc::new(Self {
            db,
            config,
            gateway,
            verifier,
            notifier,
        }))
    }
}
