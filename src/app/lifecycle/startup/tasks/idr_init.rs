use crate::app::config::FpdConfig;
use crate::app::lifecycle::context::StartupContext;
use crate::core::idr::{BreakerConfig, IdrClient};
use crate::core::pipeline::AsyncTask;
use anyhow::{Error, anyhow, bail};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Builds the selector client and probes the remote service.
///
/// Everything remote here is best effort: an unreachable selector
/// at startup only logs, the breaker and fail-open semantics cover
/// it at auction time. A FPD section in the remote config document
/// is parsed and stashed for the pipeline build
pub struct IdrInitTask;

#[async_trait]
impl AsyncTask<StartupContext, Error> for IdrInitTask {
    #[instrument(skip_all, name = "idr_init_task")]
    async fn run(&self, context: &StartupContext) -> Result<(), Error> {
        let config = match context.config.get() {
            Some(config) => config,
            None => bail!("Config missing during IDR init"),
        };

        if !config.idr.enabled {
            return Ok(());
        }

        let breaker_cfg = BreakerConfig {
            failure_threshold: config.idr.failure_threshold,
            success_threshold: config.idr.success_threshold,
            reset_timeout: config.idr.reset_timeout,
        };

        let client = Arc::new(IdrClient::new(
            &config.idr.service_url,
            config.idr.per_call_timeout,
            breaker_cfg,
        )?);

        match client.health().await {
            Ok(_) => info!("IDR service reachable at {}", config.idr.service_url),
            Err(e) => warn!("IDR service not reachable at startup: {}", e),
        }

        match client.fetch_config().await {
            Ok(remote) => {
                if let Some(fpd_section) = remote.get("fpd") {
                    match serde_json::from_value::<FpdConfig>(fpd_section.clone()) {
                        Ok(fpd) => {
                            info!("Applying FPD config from IDR service");

                            context
                                .remote_fpd
                                .set(fpd)
                                .map_err(|_| anyhow!("Remote FPD already assigned"))?;
                        }
                        Err(e) => warn!("Ignoring unparseable remote FPD section: {}", e),
                    }
                }
            }
            Err(e) => debug!("No remote config fetched: {}", e),
        }

        context
            .idr_client
            .set(client)
            .map_err(|_| anyhow!("IDR client already assigned"))
    }
}
