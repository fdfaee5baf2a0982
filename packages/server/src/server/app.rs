//! Wiring: one shared transport, the notifier, and the owned sync components.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::Config;
use crate::domains::auth::TokenManager;
use crate::domains::leads::SinkGateway;
use crate::domains::notify::{Notifier, TelegramNotifier};
use crate::domains::source::SourceGateway;
use crate::domains::sync::SyncOrchestrator;
use crate::kernel::http::{HttpClient, ReqwestClient};
use crate::kernel::ledger::DedupLedger;
use crate::kernel::token_store::TokenStore;
use crate::kernel::transport::ThrottledTransport;

/// Long-lived components shared by the process.
pub struct AppDeps {
    pub transport: Arc<ThrottledTransport>,
    pub notifier: Arc<dyn Notifier>,
}

impl AppDeps {
    /// Production dependencies over a real HTTP client.
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = ReqwestClient::new().context("Failed to build HTTP client")?;
        Ok(Self::with_client(config, Arc::new(client)))
    }

    pub fn with_client(config: &Config, client: Arc<dyn HttpClient>) -> Self {
        let transport = Arc::new(ThrottledTransport::new(client, config.transport_config()));
        let notifier: Arc<dyn Notifier> = Arc::new(TelegramNotifier::new(
            transport.clone(),
            config.telegram_options(),
        ));
        Self {
            transport,
            notifier,
        }
    }

    /// Token manager over the persisted credentials.
    pub fn token_manager(&self, config: &Config) -> Result<TokenManager> {
        let store = TokenStore::new(&config.token_file);
        let credentials = store
            .load()
            .with_context(|| format!("Failed to load tokens from {}", config.token_file.display()))?;

        Ok(TokenManager::new(
            self.transport.clone(),
            store,
            credentials,
            config.oauth_settings(),
            config.token_policy(),
            self.notifier.clone(),
        ))
    }

    /// Open the ledger and assemble the orchestrator.
    pub fn orchestrator(&self, config: &Config) -> Result<SyncOrchestrator> {
        let tokens = self.token_manager(config)?;
        let ledger = DedupLedger::open(&config.ledger_file).with_context(|| {
            format!("Failed to open ledger at {}", config.ledger_file.display())
        })?;

        let source = SourceGateway::new(self.transport.clone(), tokens, config.hh_api_base.clone());
        let sink = SinkGateway::new(
            self.transport.clone(),
            config.bitrix_webhook_url.expose().to_string(),
        );

        Ok(SyncOrchestrator::new(
            source,
            sink,
            ledger,
            self.notifier.clone(),
            config.sync_config(),
        ))
    }
}
