use crate::app::pipeline::auction::AuctionContext;
use crate::app::pipeline::auction::context::{BidderResult, ChosenBidder};
use crate::child_span_info;
use crate::core::adapters::adapter::{BidderError, ExtraInfo};
use crate::core::demand::BidderClient;
use crate::core::fpd::ResolvedFpd;
use crate::core::fpd::processor;
use crate::core::ortb::BidRequest;
use crate::core::ortb::sanitize::clone_for_bidder;
use crate::core::pipeline::AsyncTask;
use anyhow::{Error, anyhow};
use async_trait::async_trait;
use futures_util::future::join_all;
use smallvec::SmallVec;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug};

/// Parallel bidder fan-out under the shared auction deadline.
///
/// # Behavior
/// One detached worker per chosen bidder. Each worker deep-clones
/// the request, applies the bidder's FPD, builds outbound calls
/// through the adapter and issues them sequentially, re-checking
/// the deadline before every call. Workers never block each other,
/// a crash or timeout in one bidder only costs that bidder's
/// result. Completed results land in the shared map under a short
/// lock
pub struct BidderCalloutsTask {
    client: Arc<BidderClient>,
    default_currency: String,
}

impl BidderCalloutsTask {
    pub fn new(client: BidderClient, default_currency: String) -> Self {
        BidderCalloutsTask {
            client: Arc::new(client),
            default_currency,
        }
    }

    async fn run0(&self, context: &AuctionContext) -> Result<(), Error> {
        let chosen: Vec<ChosenBidder> = context.chosen.lock().clone();

        if chosen.is_empty() {
            debug!("No bidders chosen, skipping fan-out");
            return Ok(());
        }

        let deadline = *context
            .deadline
            .get()
            .ok_or_else(|| anyhow!("Deadline not assigned before fan-out"))?;

        // one shared snapshot, workers clone from it without
        // touching the context lock again
        let base = Arc::new(context.req.read().clone());

        let mut handles: SmallVec<[(String, JoinHandle<()>); 8]> = SmallVec::new();

        for bidder in chosen {
            let fpd = context
                .fpd
                .get()
                .and_then(|fpd| fpd.get(&bidder.code))
                .filter(|fpd| !fpd.is_empty())
                .cloned();

            let code = bidder.code.clone();
            let client = self.client.clone();
            let base = base.clone();
            let currency = self.default_currency.clone();
            let results = context.results.clone();

            let handle = tokio::spawn(async move {
                let result = run_bidder(client, base, bidder, fpd, deadline, currency).await;
                results.lock().insert(result.bidder_code.clone(), result);
            });

            handles.push((code, handle));
        }

        let outcomes = join_all(
            handles
                .into_iter()
                .map(|(code, handle)| async move { (code, handle.await) }),
        )
        .await;

        for (code, outcome) in outcomes {
            if let Err(join_error) = outcome {
                // worker panicked, isolate the damage to this bidder
                let mut crashed = BidderResult {
                    bidder_code: code.clone(),
                    ..Default::default()
                };
                crashed.errors.push(BidderError::Adapter(format!(
                    "bidder worker crashed: {}",
                    join_error
                )));

                context.results.lock().insert(code, crashed);
            }
        }

        let results = context.results.lock();
        let mut debug_info = context.debug.lock();

        for (code, result) in results.iter() {
            debug_info
                .latencies_ms
                .insert(code.clone(), result.latency.as_millis() as u64);

            for error in &result.errors {
                debug_info
                    .errors
                    .entry(code.clone())
                    .or_default()
                    .push(error.to_string());
            }
        }

        Ok(())
    }
}

async fn run_bidder(
    client: Arc<BidderClient>,
    base: Arc<BidRequest>,
    bidder: ChosenBidder,
    fpd: Option<ResolvedFpd>,
    deadline: Instant,
    default_currency: String,
) -> BidderResult {
    let started = Instant::now();

    let mut result = BidderResult {
        bidder_code: bidder.code.clone(),
        ..Default::default()
    };

    let mut cloned = clone_for_bidder(&base, &default_currency);

    if let Some(fpd) = fpd.as_ref() {
        processor::apply(&mut cloned, fpd);
    }

    let info = ExtraInfo { default_currency };
    let (calls, build_errors) = bidder.adapter.make_requests(&cloned, &info);
    result.errors.extend(build_errors);

    for call in calls {
        let remaining = deadline.saturating_duration_since(Instant::now());

        if remaining.is_zero() {
            result.timed_out = true;
            result.errors.push(BidderError::TimedOut);
            break;
        }

        let budget = match call.timeout {
            Some(per_call) => remaining.min(per_call),
            None => remaining,
        };

        match client.execute(&bidder.code, &call, budget).await {
            Ok(response) => {
                let (parsed, errors) = bidder.adapter.make_bids(&cloned, &response);

                if parsed.currency.is_some() {
                    result.currency = parsed.currency;
                }

                result.bids.extend(parsed.bids);
                result.errors.extend(errors);
            }
            Err(BidderError::TimedOut) => {
                result.timed_out = true;
                result.errors.push(BidderError::TimedOut);
                break;
            }
            Err(e) => result.errors.push(e),
        }
    }

    result.latency = started.elapsed();
    result
}

#[async_trait]
impl AsyncTask<AuctionContext, Error> for BidderCalloutsTask {
    async fn run(&self, context: &AuctionContext) -> Result<(), Error> {
        let span = child_span_info!("bidder_callouts_task");

        self.run0(context).instrument(span).await
    }
}
