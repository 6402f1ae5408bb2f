use crate::app::config::{FpdConfig, NexusConfig};
use crate::app::lifecycle::context::StartupContext;
use crate::app::pipeline::auction::AuctionContext;
use crate::app::pipeline::auction::tasks;
use crate::core::adapters::BidderRegistry;
use crate::core::adapters::dynamic::DynamicRegistry;
use crate::core::demand::BidderClient;
use crate::core::events::EventRecorder;
use crate::core::idr::IdrClient;
use crate::core::pipeline::{Pipeline, PipelineBuilder};
use anyhow::{Error, anyhow, bail};
use std::sync::Arc;

/// Assemble the ordered auction task chain from its parts.
///
/// Order matters: the deadline must exist before anything spends
/// time, selection must settle before FPD is resolved over the
/// chosen set, and settlement needs validated deduped results
pub fn assemble_pipeline(
    config: &NexusConfig,
    registry: Arc<BidderRegistry>,
    dynamic: Option<Arc<DynamicRegistry>>,
    idr_client: Option<Arc<IdrClient>>,
    recorder: Option<Arc<EventRecorder>>,
    fpd_override: Option<FpdConfig>,
) -> Result<Pipeline<AuctionContext, Error>, Error> {
    let bidder_client =
        BidderClient::new().or_else(|e| bail!("Auction pipeline client failed: {}", e))?;

    let fpd = fpd_override.unwrap_or_else(|| config.fpd.clone());
    let currency = config.auction.default_currency.clone();

    let pipeline = PipelineBuilder::new()
        .with_blocking(Box::new(tasks::ValidateRequestTask))
        .with_blocking(Box::new(tasks::DeadlineTask::new(
            config.auction.default_timeout,
        )))
        .with_blocking(Box::new(tasks::BidderSelectTask::new(registry, dynamic)))
        .with_async(Box::new(tasks::IdrSelectTask::new(
            idr_client,
            config.auction.max_bidders,
        )))
        .with_blocking(Box::new(tasks::EidFilterTask::new(fpd.clone())))
        .with_blocking(Box::new(tasks::FpdResolveTask::new(fpd)))
        .with_async(Box::new(tasks::BidderCalloutsTask::new(
            bidder_client,
            currency.clone(),
        )))
        .with_blocking(Box::new(tasks::BidValidationTask::new(
            config.auction.min_bid_price,
            currency.clone(),
        )))
        .with_blocking(Box::new(tasks::BidSettlementTask::new(
            config.auction.auction_type,
            config.auction.price_increment,
            currency,
        )))
        .with_blocking(Box::new(tasks::RecordEventsTask::new(recorder)))
        .build()
        .expect("Auction pipeline should have tasks");

    Ok(pipeline)
}

/// Builds the auction pipeline from everything startup prepared
pub fn build_auction_pipeline(
    context: &StartupContext,
) -> Result<Pipeline<AuctionContext, Error>, Error> {
    let config = context
        .config
        .get()
        .ok_or_else(|| anyhow!("Config not loaded when building auction pipeline"))?;

    let registry = match context.registry.get() {
        Some(registry) => registry.clone(),
        None => bail!("No bidder registry?! Cant build auction pipeline"),
    };

    let dynamic = if config.dynamic_bidders.enabled {
        context.dynamic_registry.get().cloned()
    } else {
        None
    };

    let idr_client = if config.idr.enabled {
        context.idr_client.get().cloned()
    } else {
        None
    };

    let recorder = if config.events.enabled {
        context.event_recorder.get().cloned()
    } else {
        None
    };

    // a FPD section fetched from the selector's config document
    // takes precedence over the local flags
    let fpd_override = context.remote_fpd.get().cloned();

    assemble_pipeline(config, registry, dynamic, idr_client, recorder, fpd_override)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::pipeline::auction::testutil::{StubBehavior, stub_bidder};
    use crate::core::adapters::spec::{AdapterSpec, AdapterSpecBuilder};
    use crate::core::auction::AuctionType;
    use crate::core::idr::BreakerConfig;
    use crate::core::ortb::nobidreason;
    use crate::core::ortb::request::{Banner, BidRequest, BidRequestBuilder, ImpBuilder};
    use std::time::{Duration, Instant};

    fn bidder_spec(code: &str, endpoint: &str) -> AdapterSpec {
        AdapterSpecBuilder::default()
            .code(code)
            .endpoint(endpoint)
            .gzip(false)
            .build()
            .unwrap()
    }

    fn banner_request(id: &str, floor: f64) -> BidRequest {
        BidRequestBuilder::default()
            .id(id)
            .imp(vec![
                ImpBuilder::default()
                    .id("i1")
                    .banner(Some(Banner {
                        w: Some(300),
                        h: Some(250),
                        ..Default::default()
                    }))
                    .bidfloor(floor)
                    .build()
                    .unwrap(),
            ])
            .build()
            .unwrap()
    }

    fn pipeline_for(
        config: &NexusConfig,
        specs: &[AdapterSpec],
        idr_client: Option<Arc<IdrClient>>,
    ) -> Pipeline<AuctionContext, Error> {
        let registry = Arc::new(BidderRegistry::new(specs).unwrap());

        assemble_pipeline(config, registry, None, idr_client, None, None).unwrap()
    }

    fn bid_stub(bid_id: &str, price: f64) -> StubBehavior {
        StubBehavior::Bid {
            bid_id: bid_id.to_string(),
            imp_id: "i1".to_string(),
            price,
        }
    }

    #[tokio::test]
    async fn test_no_bidders_configured_yields_empty_response() {
        let config = NexusConfig::default();
        let pipeline = pipeline_for(&config, &[], None);

        let context = AuctionContext::new(banner_request("a", 0.0));
        pipeline.run(&context).await.unwrap();

        let result = context.into_result();

        assert_eq!(result.response.id, "a");
        assert!(result.response.seatbid.is_empty());
        assert_eq!(result.response.cur.as_deref(), Some("USD"));
    }

    #[tokio::test]
    async fn test_two_bidders_first_price_highest_wins() {
        let url1 = stub_bidder(bid_stub("b1", 5.0)).await;
        let url2 = stub_bidder(bid_stub("b2", 3.0)).await;

        let config = NexusConfig::default();
        let pipeline = pipeline_for(
            &config,
            &[bidder_spec("bidder1", &url1), bidder_spec("bidder2", &url2)],
            None,
        );

        let context = AuctionContext::new(banner_request("a", 0.0));
        pipeline.run(&context).await.unwrap();

        let result = context.into_result();

        assert_eq!(result.response.seatbid.len(), 2);
        assert_eq!(result.debug.winners["i1"], "bidder1");

        let winner_seat = result
            .response
            .seatbid
            .iter()
            .find(|seat| seat.seat == "bidder1")
            .unwrap();
        assert_eq!(winner_seat.bid[0].price, 5.0);
    }

    #[tokio::test]
    async fn test_second_price_clearing_with_increment() {
        let url1 = stub_bidder(bid_stub("b1", 5.0)).await;
        let url2 = stub_bidder(bid_stub("b2", 3.0)).await;

        let mut config = NexusConfig::default();
        config.auction.auction_type = AuctionType::SecondPrice;
        config.auction.price_increment = 0.01;

        let pipeline = pipeline_for(
            &config,
            &[bidder_spec("bidder1", &url1), bidder_spec("bidder2", &url2)],
            None,
        );

        let context = AuctionContext::new(banner_request("a", 0.0));
        pipeline.run(&context).await.unwrap();

        let result = context.into_result();

        let winner_seat = result
            .response
            .seatbid
            .iter()
            .find(|seat| seat.seat == "bidder1")
            .unwrap();
        assert_eq!(winner_seat.bid[0].price, 3.01);
    }

    #[tokio::test]
    async fn test_duplicate_bid_ids_exactly_one_survives() {
        let url1 = stub_bidder(bid_stub("dup", 5.0)).await;
        let url2 = stub_bidder(bid_stub("dup", 3.0)).await;

        let config = NexusConfig::default();
        let pipeline = pipeline_for(
            &config,
            &[bidder_spec("bidder1", &url1), bidder_spec("bidder2", &url2)],
            None,
        );

        let context = AuctionContext::new(banner_request("a", 0.0));
        pipeline.run(&context).await.unwrap();

        let result = context.into_result();

        let survivors: usize = result
            .response
            .seatbid
            .iter()
            .map(|seat| seat.bid.len())
            .sum();
        assert_eq!(survivors, 1);

        let all_errors: Vec<&String> = result.debug.errors.values().flatten().collect();
        assert!(
            all_errors
                .iter()
                .any(|error| error.contains("duplicate bid id"))
        );
    }

    #[tokio::test]
    async fn test_below_floor_bid_dropped_with_reason() {
        let url = stub_bidder(bid_stub("b1", 0.75)).await;

        let config = NexusConfig::default();
        let pipeline = pipeline_for(&config, &[bidder_spec("cheap", &url)], None);

        let context = AuctionContext::new(banner_request("a", 1.0));
        pipeline.run(&context).await.unwrap();

        let result = context.into_result();

        assert!(result.response.seatbid.is_empty());
        assert_eq!(result.response.nbr, Some(nobidreason::NO_BIDS_RECEIVED));
        assert!(
            result.debug.errors["cheap"]
                .iter()
                .any(|error| error.contains("below floor"))
        );
    }

    #[tokio::test]
    async fn test_slow_idr_fails_open_and_trips_breaker_counter() {
        let idr_url = stub_bidder(StubBehavior::Sleep(Duration::from_millis(500))).await;
        let bidder_url = stub_bidder(bid_stub("b1", 2.0)).await;

        let idr_client = Arc::new(
            IdrClient::new(
                &idr_url,
                Duration::from_millis(50),
                BreakerConfig::default(),
            )
            .unwrap(),
        );

        let config = NexusConfig::default();
        let pipeline = pipeline_for(
            &config,
            &[bidder_spec("bidder1", &bidder_url)],
            Some(idr_client.clone()),
        );

        let context = AuctionContext::new(banner_request("a", 0.0));
        pipeline.run(&context).await.unwrap();

        let result = context.into_result();

        // full bidder set dispatched despite the selector being dark
        assert_eq!(result.response.seatbid.len(), 1);
        assert!(result.idr.consulted);
        assert!(!result.idr.applied);
        assert_eq!(idr_client.breaker().stats().total_failures, 1);
    }

    #[tokio::test]
    async fn test_tmax_respected_with_sleeping_bidder() {
        let slow = stub_bidder(StubBehavior::Sleep(Duration::from_millis(500))).await;

        let config = NexusConfig::default();
        let pipeline = pipeline_for(&config, &[bidder_spec("slow", &slow)], None);

        let mut req = banner_request("a", 0.0);
        req.tmax = 100;

        let context = AuctionContext::new(req);

        let started = Instant::now();
        pipeline.run(&context).await.unwrap();
        let elapsed = started.elapsed();

        assert!(elapsed < Duration::from_millis(250), "took {:?}", elapsed);

        let result = context.into_result();
        assert!(result.results["slow"].timed_out);
        assert!(result.response.seatbid.is_empty());
        assert_eq!(
            result.response.nbr,
            Some(nobidreason::AUCTION_DEADLINE_EXCEEDED)
        );
    }

    #[tokio::test]
    async fn test_eid_filtering_applies_before_fanout() {
        let url = stub_bidder(bid_stub("b1", 2.0)).await;

        let mut config = NexusConfig::default();
        config.fpd.eids_enabled = true;
        config.fpd.eid_sources = vec!["liveramp.com".to_string()];

        let pipeline = pipeline_for(&config, &[bidder_spec("bidder1", &url)], None);

        let req: BidRequest = serde_json::from_value(serde_json::json!({
            "id": "a",
            "imp": [{"id": "i1", "banner": {"w": 300, "h": 250}}],
            "user": {"eids": [
                {"source": "liveramp.com", "uids": [{"id": "x"}]},
                {"source": "blocked.com", "uids": [{"id": "y"}]}
            ]}
        }))
        .unwrap();

        let context = AuctionContext::new(req);
        pipeline.run(&context).await.unwrap();

        let req = context.req.read();
        let eids = &req.user.as_ref().unwrap().eids;

        assert_eq!(eids.len(), 1);
        assert_eq!(eids[0].source, "liveramp.com");
    }
}
