use crate::app::pipeline::auction::AuctionContext;
use crate::child_span_info;
use crate::core::auction::pricing::{AuctionType, clearing_price, sort_prices_desc};
use crate::core::ortb::nobidreason;
use crate::core::ortb::response::{BidResponse, SeatBid};
use crate::core::pipeline::BlockingTask;
use ahash::AHashMap;
use anyhow::anyhow;
use tracing::debug;

/// Winner resolution and response assembly.
///
/// Surviving bids are grouped per impression and the winner's
/// price is rewritten to the clearing price of the configured
/// auction rule. Seats are emitted in bidder enumeration order,
/// not completion order, so equal inputs always produce the same
/// response
pub struct BidSettlementTask {
    auction_type: AuctionType,
    price_increment: f64,
    default_currency: String,
}

impl BidSettlementTask {
    pub fn new(auction_type: AuctionType, price_increment: f64, default_currency: String) -> Self {
        BidSettlementTask {
            auction_type,
            price_increment,
            default_currency,
        }
    }

    fn no_bid_reason(&self, context: &AuctionContext) -> (i32, &'static str) {
        if context.chosen.lock().is_empty() {
            return (nobidreason::NO_BIDDERS_AVAILABLE, "no bidders available");
        }

        let results = context.results.lock();

        if results.values().any(|result| result.timed_out)
            && results.values().all(|result| result.bids.is_empty())
        {
            return (
                nobidreason::AUCTION_DEADLINE_EXCEEDED,
                "auction deadline expired before any bid was collected",
            );
        }

        (nobidreason::NO_BIDS_RECEIVED, "no bids received")
    }

    /// Rewrite each impression winner's price per the auction rule
    fn resolve_winners(&self, context: &AuctionContext) {
        let floors: AHashMap<String, f64> = {
            let req = context.req.read();
            req.imp
                .iter()
                .map(|imp| (imp.id.clone(), imp.bidfloor))
                .collect()
        };

        let mut results = context.results.lock();

        // (imp id -> prices) and (imp id -> winning bidder/bid)
        let mut prices_per_imp: AHashMap<String, Vec<f64>> = AHashMap::new();
        let mut best_per_imp: AHashMap<String, (String, String, f64)> = AHashMap::new();

        for result in results.values() {
            for typed in &result.bids {
                let price = typed.bid.price;
                let impid = typed.bid.impid.clone();

                prices_per_imp.entry(impid.clone()).or_default().push(price);

                let is_better = best_per_imp
                    .get(&impid)
                    .map(|(_, _, best)| price > *best)
                    .unwrap_or(true);

                if is_better {
                    best_per_imp.insert(
                        impid,
                        (result.bidder_code.clone(), typed.bid.id.clone(), price),
                    );
                }
            }
        }

        let mut debug_info = context.debug.lock();

        for (impid, (winner_code, winner_bid_id, _)) in best_per_imp {
            let prices = prices_per_imp.get_mut(&impid).expect("imp has prices");
            sort_prices_desc(prices);

            let floor = floors.get(&impid).copied().unwrap_or(0.0);
            let clearing =
                clearing_price(self.auction_type, prices, floor, self.price_increment);

            if let Some(result) = results.get_mut(&winner_code) {
                if let Some(winning) = result
                    .bids
                    .iter_mut()
                    .find(|typed| typed.bid.id == winner_bid_id)
                {
                    winning.bid.price = clearing;
                }
            }

            debug_info.winners.insert(impid, winner_code);
        }
    }

    fn build_response(&self, context: &AuctionContext) -> BidResponse {
        let req = context.req.read();
        let req_id = req.id.clone();
        let is_test = req.test == 1;
        drop(req);

        let enumeration: Vec<String> = context
            .chosen
            .lock()
            .iter()
            .map(|chosen| chosen.code.clone())
            .collect();

        let results = context.results.lock();

        let mut seatbid = Vec::with_capacity(enumeration.len());

        for code in &enumeration {
            let Some(result) = results.get(code) else {
                continue;
            };

            if result.bids.is_empty() {
                continue;
            }

            let mut bids: Vec<_> = result.bids.iter().map(|typed| typed.bid.clone()).collect();
            bids.sort_by(|a, b| b.price.total_cmp(&a.price));

            seatbid.push(SeatBid {
                seat: code.clone(),
                bid: bids,
                ..Default::default()
            });
        }

        drop(results);

        let mut response = BidResponse {
            id: req_id,
            seatbid,
            bidid: Some(uuid::Uuid::new_v4().to_string()),
            cur: Some(self.default_currency.clone()),
            ..Default::default()
        };

        if response.seatbid.is_empty() {
            let (nbr, reason) = self.no_bid_reason(context);
            response.nbr = Some(nbr);
            context.debug.lock().reason = Some(reason.to_string());
        }

        if is_test {
            // surface the debug payload to the caller on test traffic
            let debug_info = context.debug.lock();
            if let Ok(encoded) = serde_json::to_value(&*debug_info) {
                response.ext = Some(serde_json::json!({ "debug": encoded }));
            }
        }

        response
    }
}

impl BlockingTask<AuctionContext, anyhow::Error> for BidSettlementTask {
    fn run(&self, context: &AuctionContext) -> Result<(), anyhow::Error> {
        let span = child_span_info!("bid_settlement_task", seats = tracing::field::Empty).entered();

        self.resolve_winners(context);

        let response = self.build_response(context);

        span.record("seats", response.seatbid.len());
        debug!("Assembled response with {} seats", response.seatbid.len());

        context
            .res
            .set(response)
            .map_err(|_| anyhow!("Response already assigned on context"))?;

        Ok(())
    }
}
