use crate::app::pipeline::auction::AuctionContext;
use crate::app::pipeline::auction::context::ChosenBidder;
use crate::core::adapters::BidderRegistry;
use crate::core::adapters::dynamic::DynamicRegistry;
use crate::core::pipeline::BlockingTask;
use std::sync::Arc;
use tracing::debug;

/// Enumerates the bidders eligible for this auction.
///
/// The set is the union of enabled static and dynamic codes in
/// sorted order, so enumeration is deterministic across runs on
/// equal inputs. A static bidder shadows a dynamic one under the
/// same code. The dynamic snapshot is taken once here, a refresh
/// mid-auction can not tear the set
pub struct BidderSelectTask {
    registry: Arc<BidderRegistry>,
    dynamic: Option<Arc<DynamicRegistry>>,
}

impl BidderSelectTask {
    pub fn new(registry: Arc<BidderRegistry>, dynamic: Option<Arc<DynamicRegistry>>) -> Self {
        BidderSelectTask { registry, dynamic }
    }
}

impl BlockingTask<AuctionContext, anyhow::Error> for BidderSelectTask {
    fn run(&self, context: &AuctionContext) -> Result<(), anyhow::Error> {
        let snapshot = self.dynamic.as_ref().map(|dynamic| dynamic.snapshot());

        let mut codes = self.registry.enabled_codes();

        if let Some(snapshot) = snapshot.as_ref() {
            codes.extend(snapshot.enabled_codes());
        }

        codes.sort();
        codes.dedup();

        let mut chosen = Vec::with_capacity(codes.len());

        for code in codes {
            let resolved = self.registry.adapter(&code).or_else(|| {
                snapshot
                    .as_ref()
                    .and_then(|snapshot| snapshot.adapter(&code))
            });

            if let Some((adapter, spec)) = resolved {
                chosen.push(ChosenBidder {
                    code,
                    adapter,
                    spec: spec.clone(),
                });
            }
        }

        debug!("Enumerated {} eligible bidders", chosen.len());

        *context.chosen.lock() = chosen;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::adapters::spec::AdapterSpecBuilder;
    use crate::core::ortb::request::BidRequestBuilder;

    fn context() -> AuctionContext {
        AuctionContext::new(BidRequestBuilder::default().id("r").build().unwrap())
    }

    fn registry(codes: &[&str]) -> Arc<BidderRegistry> {
        let specs: Vec<_> = codes
            .iter()
            .map(|code| {
                AdapterSpecBuilder::default()
                    .code(*code)
                    .endpoint(format!("https://{}.example/rtb", code))
                    .build()
                    .unwrap()
            })
            .collect();

        Arc::new(BidderRegistry::new(&specs).unwrap())
    }

    #[test]
    fn test_static_codes_sorted() {
        let context = context();
        let task = BidderSelectTask::new(registry(&["zeta", "acme", "mid"]), None);

        task.run(&context).unwrap();

        let codes: Vec<_> = context
            .chosen
            .lock()
            .iter()
            .map(|chosen| chosen.code.clone())
            .collect();

        assert_eq!(codes, vec!["acme", "mid", "zeta"]);
    }

    #[test]
    fn test_union_with_dynamic_dedups() {
        let dir = std::env::temp_dir().join(format!("nexus-sel-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("bidders.json");

        std::fs::write(
            &path,
            r#"{"bidders": [
                {"code": "acme", "endpoint": "https://dyn.example/a"},
                {"code": "dynamo", "endpoint": "https://dyn.example/d"}
            ]}"#,
        )
        .unwrap();

        let dynamic = Arc::new(DynamicRegistry::new(path));
        dynamic.reload().unwrap();

        let context = context();
        let task = BidderSelectTask::new(registry(&["acme"]), Some(dynamic));

        task.run(&context).unwrap();

        let chosen = context.chosen.lock();
        let codes: Vec<_> = chosen.iter().map(|c| c.code.clone()).collect();
        assert_eq!(codes, vec!["acme", "dynamo"]);

        // static definition shadows the dynamic one for acme
        let acme = chosen.iter().find(|c| c.code == "acme").unwrap();
        assert_eq!(acme.spec.endpoint, "https://acme.example/rtb");

        drop(chosen);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
