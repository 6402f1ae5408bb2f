use crate::app::pipeline::auction::AuctionContext;
use crate::child_span_info;
use crate::core::adapters::adapter::BidderError;
use crate::core::ortb::Bid;
use crate::core::pipeline::BlockingTask;
use ahash::{AHashMap, AHashSet};
use tracing::debug;

/// Validates and dedupes every collected bid before settlement.
///
/// Invalid bids are dropped and recorded as per-bidder errors,
/// never propagated. Deduplication is response-wide: the first
/// validated bid with a given id wins, walked in deterministic
/// bidder order so the survivor is stable across runs
pub struct BidValidationTask {
    min_bid_price: f64,
    default_currency: String,
}

impl BidValidationTask {
    pub fn new(min_bid_price: f64, default_currency: String) -> Self {
        BidValidationTask {
            min_bid_price,
            default_currency,
        }
    }
}

/// Why one bid was rejected, or Ok to keep it
pub fn validate_bid(
    bid: &Bid,
    floors: &AHashMap<String, f64>,
    min_bid_price: f64,
) -> Result<(), String> {
    if bid.id.is_empty() {
        return Err("missing bid id".to_string());
    }

    if bid.impid.is_empty() {
        return Err(format!("bid {} missing impid", bid.id));
    }

    let Some(floor) = floors.get(&bid.impid) else {
        return Err(format!("bid {} references unknown imp {}", bid.id, bid.impid));
    };

    if bid.price < 0.0 {
        return Err(format!("bid {} has negative price", bid.id));
    }

    if bid.price < min_bid_price {
        return Err(format!(
            "bid {} price {} below minimum {}",
            bid.id, bid.price, min_bid_price
        ));
    }

    if *floor > 0.0 && bid.price < *floor {
        return Err(format!(
            "bid {} price {} below floor {}",
            bid.id, bid.price, floor
        ));
    }

    if bid.adm.is_none() && bid.nurl.is_none() {
        return Err(format!("bid {} carries neither adm nor nurl", bid.id));
    }

    Ok(())
}

impl BlockingTask<AuctionContext, anyhow::Error> for BidValidationTask {
    fn run(&self, context: &AuctionContext) -> Result<(), anyhow::Error> {
        let span = child_span_info!(
            "bid_validation_task",
            dropped = tracing::field::Empty,
            kept = tracing::field::Empty
        )
        .entered();

        let floors: AHashMap<String, f64> = {
            let req = context.req.read();
            req.imp
                .iter()
                .map(|imp| (imp.id.clone(), imp.bidfloor))
                .collect()
        };

        let mut results = context.results.lock();

        let mut codes: Vec<String> = results.keys().cloned().collect();
        codes.sort();

        let mut seen_bid_ids: AHashSet<String> = AHashSet::new();
        let mut dropped = 0usize;
        let mut kept = 0usize;

        for code in &codes {
            let result = results.get_mut(code).expect("code taken from the map");

            let currency_rejection = result
                .currency
                .as_ref()
                .filter(|cur| *cur != &self.default_currency)
                .map(|cur| format!("response currency {} not supported", cur));

            let bids = std::mem::take(&mut result.bids);
            let mut rejections: Vec<String> = Vec::new();

            for typed in bids {
                if let Some(reason) = currency_rejection.as_ref() {
                    rejections.push(reason.clone());
                    continue;
                }

                if let Err(reason) = validate_bid(&typed.bid, &floors, self.min_bid_price) {
                    rejections.push(reason);
                    continue;
                }

                if !seen_bid_ids.insert(typed.bid.id.clone()) {
                    rejections.push(format!("duplicate bid id {}", typed.bid.id));
                    continue;
                }

                result.bids.push(typed);
            }

            kept += result.bids.len();
            dropped += rejections.len();

            for reason in rejections {
                result.errors.push(BidderError::Rejected(reason.clone()));

                context
                    .debug
                    .lock()
                    .errors
                    .entry(code.clone())
                    .or_default()
                    .push(format!("bid rejected: {}", reason));
            }
        }

        debug!("Bid validation kept {} dropped {}", kept, dropped);
        span.record("dropped", dropped);
        span.record("kept", kept);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::pipeline::auction::context::BidderResult;
    use crate::core::ortb::request::{Banner, BidRequestBuilder, ImpBuilder};
    use crate::core::ortb::response::{BidBuilder, BidType};
    use crate::core::ortb::TypedBid;

    fn floors() -> AHashMap<String, f64> {
        AHashMap::from_iter([("i1".to_string(), 1.0), ("free".to_string(), 0.0)])
    }

    fn bid(id: &str, impid: &str, price: f64) -> Bid {
        BidBuilder::default()
            .id(id)
            .impid(impid)
            .price(price)
            .adm(Some("<div/>".to_string()))
            .build()
            .unwrap()
    }

    #[test]
    fn test_validate_accepts_clean_bid() {
        assert!(validate_bid(&bid("b1", "i1", 2.0), &floors(), 0.0).is_ok());
    }

    #[test]
    fn test_validate_rejects_unknown_imp() {
        let err = validate_bid(&bid("b1", "nope", 2.0), &floors(), 0.0).unwrap_err();
        assert!(err.contains("unknown imp"));
    }

    #[test]
    fn test_validate_rejects_below_floor() {
        let err = validate_bid(&bid("b1", "i1", 0.75), &floors(), 0.0).unwrap_err();
        assert!(err.contains("below floor"));
    }

    #[test]
    fn test_validate_rejects_below_min_price() {
        let err = validate_bid(&bid("b1", "free", 0.05), &floors(), 0.10).unwrap_err();
        assert!(err.contains("below minimum"));
    }

    #[test]
    fn test_validate_rejects_creativeless_bid() {
        let naked = BidBuilder::default()
            .id("b1")
            .impid("free")
            .price(1.0)
            .build()
            .unwrap();

        let err = validate_bid(&naked, &floors(), 0.0).unwrap_err();
        assert!(err.contains("neither adm nor nurl"));
    }

    fn context_with_results(results: Vec<BidderResult>) -> AuctionContext {
        let req = BidRequestBuilder::default()
            .id("r")
            .imp(vec![
                ImpBuilder::default()
                    .id("i1")
                    .banner(Some(Banner::default()))
                    .bidfloor(1.0)
                    .build()
                    .unwrap(),
            ])
            .build()
            .unwrap();

        let context = AuctionContext::new(req);

        let mut map = context.results.lock();
        for result in results {
            map.insert(result.bidder_code.clone(), result);
        }
        drop(map);

        context
    }

    fn result_with_bids(code: &str, bids: Vec<Bid>) -> BidderResult {
        BidderResult {
            bidder_code: code.to_string(),
            bids: bids
                .into_iter()
                .map(|bid| TypedBid {
                    bid,
                    bid_type: BidType::Banner,
                })
                .collect(),
            currency: Some("USD".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_duplicate_ids_first_bidder_in_order_wins() {
        let context = context_with_results(vec![
            result_with_bids("zeta", vec![bid("dup", "i1", 3.0)]),
            result_with_bids("acme", vec![bid("dup", "i1", 2.0)]),
        ]);

        BidValidationTask::new(0.0, "USD".to_string())
            .run(&context)
            .unwrap();

        let results = context.results.lock();

        // acme sorts before zeta, its bid survives
        assert_eq!(results["acme"].bids.len(), 1);
        assert!(results["zeta"].bids.is_empty());
        assert!(
            context.debug.lock().errors["zeta"][0].contains("duplicate bid id")
        );
    }

    #[test]
    fn test_currency_mismatch_drops_all_bids() {
        let mut mismatched = result_with_bids("acme", vec![bid("b1", "i1", 5.0)]);
        mismatched.currency = Some("EUR".to_string());

        let context = context_with_results(vec![mismatched]);

        BidValidationTask::new(0.0, "USD".to_string())
            .run(&context)
            .unwrap();

        let results = context.results.lock();
        assert!(results["acme"].bids.is_empty());
        assert!(
            context.debug.lock().errors["acme"][0].contains("currency EUR not supported")
        );
    }
}
