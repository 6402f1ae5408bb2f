use crate::app::lifecycle::context::StartupContext;
use crate::core::pipeline::AsyncTask;
use anyhow::Error;
use async_trait::async_trait;
use tracing::{info, instrument};

/// Flushes outstanding outcome events within the configured grace
/// period. Dropped events are gone, the drop counter said so
pub struct FlushRecorderTask;

#[async_trait]
impl AsyncTask<StartupContext, Error> for FlushRecorderTask {
    #[instrument(skip_all, name = "flush_recorder_task")]
    async fn run(&self, context: &StartupContext) -> Result<(), Error> {
        let Some(recorder) = context.event_recorder.get() else {
            return Ok(());
        };

        let grace = context
            .config
            .get()
            .map(|config| config.events.shutdown_grace)
            .unwrap_or_default();

        recorder.shutdown(grace).await;

        if recorder.dropped() > 0 {
            info!("Recorder dropped {} events over its lifetime", recorder.dropped());
        }

        Ok(())
    }
}
