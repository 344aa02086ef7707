//! Cairn Gateway - S3-compatible HTTP front end
//!
//! Wires the metadata backend, data gateway and authenticator behind the
//! dispatcher and serves them with axum.

pub mod chunked;
pub mod handlers;
pub mod server;
pub mod xml;

pub use handlers::GatewayHandlers;
pub use server::{AppState, HEALTHCHECK_PATH, LoggingInterim, build_router};

use anyhow::{Context, Result};
use cairn_auth::{
    AllowAllEvaluator, Authenticator, BuiltinAuthenticator, ContextEvaluator, CredentialStore,
    DenyAllEvaluator, VaultAuthenticator, VaultConfig,
};
use cairn_common::Config;
use cairn_common::config::{AuthConfig, AuthMode, DefaultDecision};
use cairn_meta_store::{BootstrapRole, KvEngine, MemoryEngine, MetadataBackend, RedbEngine};
use cairn_placement::{DataGateway, LocationResolver};
use cairn_s3::Dispatcher;
use std::sync::Arc;
use tracing::info;

/// Build the authenticator selected by `auth.mode`
pub fn build_authenticator(config: &AuthConfig) -> Result<Arc<dyn Authenticator>> {
    match config.mode {
        AuthMode::Builtin => {
            let store = Arc::new(CredentialStore::from_accounts(&config.accounts));
            let evaluator: Arc<dyn ContextEvaluator> = match config.default_decision {
                DefaultDecision::Allow => Arc::new(AllowAllEvaluator),
                DefaultDecision::Deny => Arc::new(DenyAllEvaluator),
            };
            info!(
                accounts = config.accounts.len(),
                region = %config.region,
                "Using builtin authenticator"
            );
            Ok(Arc::new(BuiltinAuthenticator::new(
                store,
                config.region.clone(),
                evaluator,
            )))
        }
        AuthMode::Vault => {
            let endpoint = config
                .vault_endpoint
                .clone()
                .context("auth.vault_endpoint is required in vault mode")?;
            info!(endpoint = %endpoint, "Using remote authenticator");
            let vault = VaultAuthenticator::new(VaultConfig::new(endpoint))
                .map_err(|e| anyhow::anyhow!("Failed to build vault client: {e}"))?;
            Ok(Arc::new(vault))
        }
    }
}

/// Open the metadata engine and backend described by `config.metadata`
pub async fn open_metadata(config: &Config) -> Result<Arc<MetadataBackend>> {
    let engine: Arc<dyn KvEngine> = if config.metadata.is_in_memory() {
        Arc::new(MemoryEngine::new())
    } else {
        if let Some(parent) = config.metadata.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        Arc::new(RedbEngine::open(&config.metadata.path).map_err(|e| {
            anyhow::anyhow!(
                "Failed to open metadata at {}: {e}",
                config.metadata.path.display()
            )
        })?)
    };
    let role = if config.metadata.owner {
        BootstrapRole::Owner
    } else {
        BootstrapRole::Member
    };
    let backend = MetadataBackend::open(engine, role, config.metadata.splitter.clone())
        .await
        .map_err(|e| anyhow::anyhow!("Failed to open metadata backend: {e}"))?;
    Ok(Arc::new(backend))
}

/// Assemble the full application state from configuration
pub async fn build_app_state(
    config: &Config,
    authenticator: Arc<dyn Authenticator>,
) -> Result<Arc<AppState>> {
    let meta = open_metadata(config).await?;
    let data = Arc::new(
        DataGateway::from_config(&config.data)
            .map_err(|e| anyhow::anyhow!("Failed to configure data backends: {e}"))?,
    );
    let resolver = Arc::new(LocationResolver::from_config(&config.data));
    info!(
        locations = ?data.locations().collect::<Vec<_>>(),
        legacy = resolver.is_legacy(),
        "Data backends ready"
    );

    let handlers = Arc::new(GatewayHandlers::new(meta, Arc::clone(&data), resolver));
    let dispatcher = Dispatcher::new(authenticator, handlers, Arc::new(LoggingInterim));
    Ok(Arc::new(AppState {
        dispatcher,
        data,
        website_endpoints: config.server.website_endpoints.clone(),
    }))
}
