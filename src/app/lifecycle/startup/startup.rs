use crate::app::lifecycle::context::StartupContext;
use crate::app::lifecycle::startup::tasks::adapters_load::AdaptersLoadTask;
use crate::app::lifecycle::startup::tasks::auction_pipeline::BuildAuctionPipelineTask;
use crate::app::lifecycle::startup::tasks::config_load::ConfigLoadTask;
use crate::app::lifecycle::startup::tasks::dynamic_load::DynamicBiddersLoadTask;
use crate::app::lifecycle::startup::tasks::idr_init::IdrInitTask;
use crate::app::lifecycle::startup::tasks::observability::ConfigureObservabilityTask;
use crate::app::lifecycle::startup::tasks::recorder_start::EventRecorderStartTask;
use crate::app::lifecycle::startup::tasks::start_server::StartServerTask;
use crate::app::span::WrappedPipelineTask;
use crate::core::pipeline::{Pipeline, PipelineBuilder};
use std::path::PathBuf;
use tracing::{Span, info_span};

/// Builds the graceful ordering of startup tasks required for a
/// successful boot. Configures logging, loads the registries,
/// builds the auction pipeline, all that good stuff
pub fn build_start_pipeline(cfg_path: PathBuf) -> Pipeline<StartupContext, anyhow::Error> {
    // config and logging first, nothing else can log before this
    let boot_loader = PipelineBuilder::new()
        .with_blocking(Box::new(ConfigLoadTask::new(cfg_path)))
        .with_blocking(Box::new(ConfigureObservabilityTask))
        .build()
        .expect("Bootloader should have tasks!");

    // now logging is configured we can span the rest. Tasks here
    // can use the #[instrument] attribute without concern since we
    // want startup/shutdown logged and dont need to filter those
    let start_pipeline = PipelineBuilder::new()
        .with_blocking(Box::new(AdaptersLoadTask))
        .with_async(Box::new(DynamicBiddersLoadTask))
        .with_async(Box::new(IdrInitTask))
        .with_async(Box::new(EventRecorderStartTask))
        .with_blocking(Box::new(BuildAuctionPipelineTask))
        .with_async(Box::new(StartServerTask))
        .build()
        .expect("Startup pipeline should have tasks!");

    let nop_bootloader_pipeline = WrappedPipelineTask::new(boot_loader, || Span::none());

    let observed_startup_pipeline =
        WrappedPipelineTask::new(start_pipeline, || info_span!("start_pipeline"));

    PipelineBuilder::new()
        .with_async(Box::new(nop_bootloader_pipeline))
        .with_async(Box::new(observed_startup_pipeline))
        .build()
        .expect("Pipeline should have tasks!")
}
