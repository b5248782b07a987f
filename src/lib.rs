#![forbid(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::todo)]
#![warn(clippy::panic)]
#![warn(clippy::dbg_macro)]
#![warn(clippy::print_stdout)]
#![warn(clippy::print_stderr)]
#![warn(clippy::clone_on_ref_ptr)]
#![warn(unreachable_pub)]
#![warn(missing_debug_implementations)]
#![warn(unused_qualifications)]
#![deny(unused_must_use)]

pub mod adapters;
pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod services;
pub mod telemetry;

use crate::adapters::store::{DynamoMessageRepository, InMemoryMessageRepository, MessageRepository};
use crate::config::{Config, StoreBackend, StoreConfig};
use crate::services::message_service::MessageService;
use aws_config::{BehaviorVersion, Region};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Everything the HTTP layer needs, wired from configuration.
#[derive(Debug)]
pub struct App {
    pub message_service: MessageService,
}

#[derive(Debug)]
pub struct AppBuilder {
    config: Config,
    dynamodb: Option<aws_sdk_dynamodb::Client>,
    repository: Option<Arc<dyn MessageRepository>>,
}

impl AppBuilder {
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config, dynamodb: None, repository: None }
    }

    #[must_use]
    pub fn with_dynamodb(mut self, client: aws_sdk_dynamodb::Client) -> Self {
        self.dynamodb = Some(client);
        self
    }

    /// Uses `repository` as-is, bypassing the configured backend.
    #[must_use]
    pub fn with_repository(mut self, repository: Arc<dyn MessageRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    /// Builds the application services.
    ///
    /// # Errors
    /// Returns an error if the DynamoDB backend is selected without a client, or if
    /// table creation was requested and fails.
    pub async fn build(self) -> anyhow::Result<App> {
        let repository = match self.repository {
            Some(repository) => repository,
            None => build_repository(&self.config.store, self.dynamodb).await?,
        };

        let call_timeout = Duration::from_millis(self.config.store.call_timeout_ms);
        let message_service = MessageService::new(repository, &self.config.messaging, call_timeout);

        Ok(App { message_service })
    }
}

async fn build_repository(
    config: &StoreConfig,
    client: Option<aws_sdk_dynamodb::Client>,
) -> anyhow::Result<Arc<dyn MessageRepository>> {
    match config.backend {
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory store; messages will not survive a restart");
            Ok(Arc::new(InMemoryMessageRepository::new(config.page_size.map(usize::from))))
        }
        StoreBackend::Dynamodb => {
            let client = client.ok_or_else(|| anyhow::anyhow!("DynamoDB client is required"))?;
            let repo = DynamoMessageRepository::new(
                client,
                config.table.clone(),
                config.index.clone(),
                config.page_size.map(i32::from),
            );
            if config.create_table {
                repo.ensure_table().await?;
            }
            Ok(Arc::new(repo))
        }
    }
}

pub async fn initialize_dynamodb_client(config: &StoreConfig) -> aws_sdk_dynamodb::Client {
    let region_provider = Region::new(config.region.clone());
    let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(region_provider);

    if let Some(ref endpoint) = config.endpoint {
        loader = loader.endpoint_url(endpoint);
    }

    if let (Some(ak), Some(sk)) = (&config.access_key, &config.secret_key) {
        let creds = aws_credential_types::Credentials::new(ak.clone(), sk.clone(), None, None, "static");
        loader = loader.credentials_provider(creds);
    }

    let sdk_config = loader.load().await;
    aws_sdk_dynamodb::Client::new(&sdk_config)
}

/// Flips `shutdown_tx` to `true` on SIGTERM or Ctrl-C.
pub fn spawn_signal_handler(shutdown_tx: watch::Sender<bool>) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = sigterm.recv() => tracing::info!("SIGTERM received, shutting down"),
                        _ = tokio::signal::ctrl_c() => tracing::info!("SIGINT received, shutting down"),
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to register SIGTERM handler");
                    let _ = tokio::signal::ctrl_c().await;
                    tracing::info!("SIGINT received, shutting down");
                }
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Ctrl-C received, shutting down");
        }
        let _ = shutdown_tx.send(true);
    });
}

/// Routes panics through tracing so they reach the configured log output.
pub fn setup_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let location = info.location().map(|l| format!("{}:{}", l.file(), l.line())).unwrap_or_default();
        let payload = info
            .payload()
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_default();
        tracing::error!(panic.location = %location, panic.payload = %payload, "Thread panicked");
    }));
}
