use crate::app::lifecycle::context::StartupContext;
use crate::core::pipeline::AsyncTask;
use anyhow::Error;
use async_trait::async_trait;
use tracing::{info, instrument};

/// Stops accepting connections and drains in-flight requests
pub struct StopServerTask;

#[async_trait]
impl AsyncTask<StartupContext, Error> for StopServerTask {
    #[instrument(skip_all, name = "stop_server_task")]
    async fn run(&self, context: &StartupContext) -> Result<(), Error> {
        if let Some(server) = context.server.get() {
            server.stop(true).await;
            info!("Http server stopped");
        }

        Ok(())
    }
}
