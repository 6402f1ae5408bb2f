use crate::app::pipeline::auction::AuctionContext;
use crate::core::events::{EventRecorder, OutcomeEvent};
use crate::core::ortb::BidRequest;
use crate::core::pipeline::BlockingTask;
use std::sync::Arc;

/// Enqueues one outcome event per chosen bidder for the selector's
/// training feedback loop. Enqueue is non-blocking, a full buffer
/// drops events rather than delaying the response
pub struct RecordEventsTask {
    recorder: Option<Arc<EventRecorder>>,
}

impl RecordEventsTask {
    pub fn new(recorder: Option<Arc<EventRecorder>>) -> Self {
        RecordEventsTask { recorder }
    }
}

fn publisher_id(req: &BidRequest) -> Option<String> {
    let publisher = req
        .site
        .as_ref()
        .and_then(|site| site.publisher.as_ref())
        .or_else(|| req.app.as_ref().and_then(|app| app.publisher.as_ref()));

    publisher.and_then(|publisher| publisher.id.clone())
}

fn country(req: &BidRequest) -> Option<String> {
    req.device
        .as_ref()
        .and_then(|device| device.geo.as_ref())
        .or_else(|| req.user.as_ref().and_then(|user| user.geo.as_ref()))
        .and_then(|geo| geo.country.clone())
}

impl BlockingTask<AuctionContext, anyhow::Error> for RecordEventsTask {
    fn run(&self, context: &AuctionContext) -> Result<(), anyhow::Error> {
        let Some(recorder) = self.recorder.as_ref() else {
            return Ok(());
        };

        let req = context.req.read();
        let publisher = publisher_id(&req);
        let country = country(&req);
        let device_type = req.device.as_ref().and_then(|device| device.devicetype);
        let first_floor = req.imp.first().map(|imp| imp.bidfloor).unwrap_or(0.0);
        drop(req);

        let results = context.results.lock();

        for chosen in context.chosen.lock().iter() {
            let result = results.get(&chosen.code);

            let mut event = OutcomeEvent {
                bidder_code: chosen.code.clone(),
                floor: first_floor,
                country: country.clone(),
                device_type,
                publisher_id: publisher.clone(),
                ..Default::default()
            };

            if let Some(result) = result {
                event.latency_ms = result.latency.as_millis() as u64;
                event.timed_out = result.timed_out;
                event.had_error = !result.errors.is_empty();
                event.error = result.errors.first().map(|error| error.to_string());

                if let Some(best) = result
                    .bids
                    .iter()
                    .max_by(|a, b| a.bid.price.total_cmp(&b.bid.price))
                {
                    event.had_bid = true;
                    event.cpm = best.bid.price;
                    event.media_type = Some(best.bid_type.to_string());

                    if let (Some(w), Some(h)) = (best.bid.w, best.bid.h) {
                        event.ad_size = Some(format!("{}x{}", w, h));
                    }
                }
            }

            recorder.record(event);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_publisher_and_country_extraction() {
        let req: BidRequest = serde_json::from_value(json!({
            "id": "r",
            "imp": [{"id": "i1"}],
            "site": {"publisher": {"id": "pub-7"}},
            "device": {"geo": {"country": "USA"}, "devicetype": 2}
        }))
        .unwrap();

        assert_eq!(publisher_id(&req).as_deref(), Some("pub-7"));
        assert_eq!(country(&req).as_deref(), Some("USA"));
    }

    #[test]
    fn test_missing_recorder_is_noop() {
        let req: BidRequest =
            serde_json::from_value(json!({"id": "r", "imp": [{"id": "i1"}]})).unwrap();
        let context = AuctionContext::new(req);

        assert!(RecordEventsTask::new(None).run(&context).is_ok());
    }
}
