use crate::app::lifecycle::context::StartupContext;
use crate::core::adapters::BidderRegistry;
use crate::core::pipeline::BlockingTask;
use anyhow::{Error, anyhow, bail};
use std::sync::Arc;
use tracing::instrument;

/// Builds the static bidder registry from config. Registration
/// happens once here, the registry is read-only afterwards
pub struct AdaptersLoadTask;

impl BlockingTask<StartupContext, Error> for AdaptersLoadTask {
    #[instrument(skip_all, name = "adapters_load_task")]
    fn run(&self, context: &StartupContext) -> Result<(), Error> {
        let config = match context.config.get() {
            Some(config) => config,
            None => bail!("Config missing during adapter registry load"),
        };

        let registry = BidderRegistry::new(&config.bidders)?;

        context
            .registry
            .set(Arc::new(registry))
            .map_err(|_| anyhow!("Bidder registry already assigned"))
    }
}
