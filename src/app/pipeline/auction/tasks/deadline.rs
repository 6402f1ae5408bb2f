use crate::app::pipeline::auction::AuctionContext;
use crate::core::pipeline::BlockingTask;
use anyhow::anyhow;
use std::time::Duration;
use tracing::debug;

/// Pins the absolute auction deadline on the context.
///
/// The effective budget is min(tmax, default_timeout), falling
/// back to the configured default when the request carries no
/// tmax. Everything downstream derives its remaining time from
/// this single instant
pub struct DeadlineTask {
    default_timeout: Duration,
}

impl DeadlineTask {
    pub fn new(default_timeout: Duration) -> Self {
        DeadlineTask { default_timeout }
    }

    fn budget(&self, tmax_ms: u64) -> Duration {
        if tmax_ms == 0 {
            return self.default_timeout;
        }

        Duration::from_millis(tmax_ms).min(self.default_timeout)
    }
}

impl BlockingTask<AuctionContext, anyhow::Error> for DeadlineTask {
    fn run(&self, context: &AuctionContext) -> Result<(), anyhow::Error> {
        let tmax_ms = context.req.read().tmax;
        let budget = self.budget(tmax_ms);

        context
            .deadline
            .set(context.received_at + budget)
            .map_err(|_| anyhow!("Deadline already assigned on context"))?;

        debug!("Auction budget {}ms (tmax {}ms)", budget.as_millis(), tmax_ms);

        Ok(())
    }
}
