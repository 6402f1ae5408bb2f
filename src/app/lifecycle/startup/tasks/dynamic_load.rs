use crate::app::lifecycle::context::StartupContext;
use crate::core::adapters::dynamic::DynamicRegistry;
use crate::core::pipeline::AsyncTask;
use anyhow::{Error, anyhow, bail};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Loads the dynamic bidder file and starts its refresh loop.
///
/// A missing or broken file at startup is not fatal, the exchange
/// runs with an empty dynamic snapshot until a refresh succeeds
pub struct DynamicBiddersLoadTask;

#[async_trait]
impl AsyncTask<StartupContext, Error> for DynamicBiddersLoadTask {
    #[instrument(skip_all, name = "dynamic_bidders_load_task")]
    async fn run(&self, context: &StartupContext) -> Result<(), Error> {
        let config = match context.config.get() {
            Some(config) => config,
            None => bail!("Config missing during dynamic bidder load"),
        };

        if !config.dynamic_bidders.enabled {
            return Ok(());
        }

        let registry = Arc::new(DynamicRegistry::new(config.dynamic_bidders.path.clone()));

        match registry.reload() {
            Ok(count) => info!("Loaded {} dynamic bidders", count),
            Err(e) => warn!("Initial dynamic bidder load failed, starting empty: {}", e),
        }

        registry
            .clone()
            .start_refresh(config.dynamic_bidders.refresh_period);

        context
            .dynamic_registry
            .set(registry)
            .map_err(|_| anyhow!("Dynamic registry already assigned"))
    }
}
