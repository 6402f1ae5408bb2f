use crate::app::lifecycle::context::StartupContext;
use crate::core::observability::provider;
use crate::core::pipeline::BlockingTask;
use anyhow::{Error, bail};

/// Wires the tracing subscriber from config. Runs in the
/// bootloader phase before any span is created, logs emitted
/// earlier would be dropped
pub struct ConfigureObservabilityTask;

impl BlockingTask<StartupContext, Error> for ConfigureObservabilityTask {
    fn run(&self, context: &StartupContext) -> Result<(), Error> {
        let config = match context.config.get() {
            Some(config) => config,
            None => bail!("Config missing while configuring observability"),
        };

        provider::init(&config.logging)
    }
}
