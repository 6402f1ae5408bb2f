use crate::app::pipeline::auction::AuctionContext;
use crate::child_span_info;
use crate::core::idr::{IdrClient, IdrDecision};
use crate::core::pipeline::AsyncTask;
use ahash::AHashSet;
use anyhow::{Error, anyhow};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{Instrument, debug};

/// Consults the Intelligent Demand Router to down-select the
/// bidder set, then applies the configured bidder cap.
///
/// # Behavior
/// Strictly advisory. A breaker short-circuit, transport failure,
/// parse failure or deadline overrun all fail open, the full
/// enumerated set stays in place and the auction proceeds. This
/// task can never fail the pipeline
pub struct IdrSelectTask {
    client: Option<Arc<IdrClient>>,
    max_bidders: usize,
}

impl IdrSelectTask {
    pub fn new(client: Option<Arc<IdrClient>>, max_bidders: usize) -> Self {
        IdrSelectTask {
            client,
            max_bidders,
        }
    }

    async fn consult(&self, context: &AuctionContext, decision: &mut IdrDecision) {
        let Some(client) = self.client.as_ref() else {
            return;
        };

        let available: Vec<String> = context
            .chosen
            .lock()
            .iter()
            .map(|chosen| chosen.code.clone())
            .collect();

        if available.is_empty() {
            return;
        }

        let remaining = context.remaining();
        if remaining.is_zero() {
            debug!("No budget left for IDR consult, failing open");
            return;
        }

        decision.consulted = true;

        // snapshot so the selector call holds no lock
        let req = context.req.read().clone();

        // the per-call budget lives inside the client, the outer
        // bound only protects the auction deadline itself
        let outcome = tokio::time::timeout(remaining, client.select(&req, &available)).await;

        match outcome {
            Ok(Ok(selection)) => {
                {
                    let keep: AHashSet<&str> = selection
                        .selected_bidders
                        .iter()
                        .map(|entry| entry.bidder_code.as_str())
                        .collect();

                    context
                        .chosen
                        .lock()
                        .retain(|chosen| keep.contains(chosen.code.as_str()));
                }

                decision.applied = true;
                decision.mode = Some(selection.mode.clone());

                {
                    let mut dbg = context.debug.lock();
                    dbg.excluded_bidders = selection
                        .excluded_bidders
                        .iter()
                        .map(|entry| entry.bidder_code.clone())
                        .collect();
                }

                decision.selected = selection.selected_bidders;
                decision.excluded = selection.excluded_bidders;
            }
            Ok(Err(e)) => {
                debug!("IDR select failed, failing open: {}", e);
            }
            Err(_) => {
                debug!("IDR select overran the auction deadline, failing open");
            }
        }
    }

    async fn run0(&self, context: &AuctionContext) -> Result<(), Error> {
        let mut decision = IdrDecision::default();

        self.consult(context, &mut decision).await;

        {
            let mut chosen = context.chosen.lock();

            if self.max_bidders > 0 && chosen.len() > self.max_bidders {
                chosen.truncate(self.max_bidders);
            }

            context.debug.lock().selected_bidders =
                chosen.iter().map(|c| c.code.clone()).collect();
        }

        context
            .idr
            .set(decision)
            .map_err(|_| anyhow!("IDR decision already assigned on context"))?;

        Ok(())
    }
}

#[async_trait]
impl AsyncTask<AuctionContext, Error> for IdrSelectTask {
    async fn run(&self, context: &AuctionContext) -> Result<(), Error> {
        let span = child_span_info!("idr_select_task");

        self.run0(context).instrument(span).await
    }
}
