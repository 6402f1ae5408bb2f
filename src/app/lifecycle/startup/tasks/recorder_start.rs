use crate::app::lifecycle::context::StartupContext;
use crate::core::events::EventRecorder;
use crate::core::idr::{BreakerConfig, IdrClient};
use crate::core::pipeline::AsyncTask;
use anyhow::{Error, anyhow, bail};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, instrument};

/// Starts the outcome event recorder and its drain task.
///
/// Event recording works even with selection disabled, the drain
/// just needs somewhere to ship batches. Reuses the selector
/// client when present, otherwise builds one against the
/// configured service url
pub struct EventRecorderStartTask;

#[async_trait]
impl AsyncTask<StartupContext, Error> for EventRecorderStartTask {
    #[instrument(skip_all, name = "event_recorder_start_task")]
    async fn run(&self, context: &StartupContext) -> Result<(), Error> {
        let config = match context.config.get() {
            Some(config) => config,
            None => bail!("Config missing during event recorder start"),
        };

        if !config.events.enabled {
            return Ok(());
        }

        if config.idr.service_url.is_empty() {
            info!("Event recording enabled but no IDR service url, skipping");
            return Ok(());
        }

        let client = match context.idr_client.get() {
            Some(client) => client.clone(),
            None => Arc::new(IdrClient::new(
                &config.idr.service_url,
                config.idr.per_call_timeout,
                BreakerConfig::default(),
            )?),
        };

        let recorder = EventRecorder::start(
            client,
            config.events.buffer_size,
            config.events.flush_interval,
        );

        info!(
            "Event recorder started, buffer {} flush {:?}",
            config.events.buffer_size, config.events.flush_interval
        );

        context
            .event_recorder
            .set(recorder)
            .map_err(|_| anyhow!("Event recorder already assigned"))
    }
}
