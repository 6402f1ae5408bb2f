use crate::app::lifecycle::context::StartupContext;
use crate::app::pipeline::auction::build_auction_pipeline;
use crate::core::pipeline::BlockingTask;
use anyhow::Error;
use std::sync::Arc;
use tracing::instrument;

pub struct BuildAuctionPipelineTask;

impl BlockingTask<StartupContext, Error> for BuildAuctionPipelineTask {
    #[instrument(skip_all, name = "build_auction_pipeline_task")]
    fn run(&self, context: &StartupContext) -> Result<(), Error> {
        let pipeline = build_auction_pipeline(context)?;

        context
            .auction_pipeline
            .set(Arc::new(pipeline))
            .map_err(|_| anyhow::anyhow!("auction_pipeline already assigned!"))
    }
}
