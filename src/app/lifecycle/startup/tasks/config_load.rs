use crate::app::config::NexusConfig;
use crate::app::lifecycle::context::StartupContext;
use crate::core::pipeline::BlockingTask;
use anyhow::{Context, Error, anyhow};
use std::path::PathBuf;

/// Parses and validates the local config file straight onto the
/// startup context. Config is loaded exactly once, every later
/// task reads the snapshot from the context
pub struct ConfigLoadTask {
    path: PathBuf,
}

impl ConfigLoadTask {
    pub fn new(path: PathBuf) -> Self {
        ConfigLoadTask { path }
    }
}

impl BlockingTask<StartupContext, Error> for ConfigLoadTask {
    fn run(&self, context: &StartupContext) -> Result<(), Error> {
        let config = NexusConfig::load(&self.path)
            .with_context(|| format!("loading config from {:?}", self.path))?;

        context
            .config
            .set(config)
            .map_err(|_| anyhow!("Config already assigned on startup context"))
    }
}
