use crate::app::config::FpdConfig;
use crate::app::pipeline::auction::AuctionContext;
use crate::child_span_info;
use crate::core::fpd::processor;
use crate::core::pipeline::BlockingTask;
use ahash::AHashMap;
use anyhow::anyhow;

/// Computes the per-bidder first party data bundles over the
/// chosen bidder set. Pure read of the shared request, the bundles
/// are applied to clones later during fan-out
pub struct FpdResolveTask {
    cfg: FpdConfig,
}

impl FpdResolveTask {
    pub fn new(cfg: FpdConfig) -> Self {
        FpdResolveTask { cfg }
    }
}

impl BlockingTask<AuctionContext, anyhow::Error> for FpdResolveTask {
    fn run(&self, context: &AuctionContext) -> Result<(), anyhow::Error> {
        let span = child_span_info!("fpd_resolve_task", bidders = tracing::field::Empty).entered();

        let resolved = if self.cfg.enabled {
            let codes: Vec<String> = context
                .chosen
                .lock()
                .iter()
                .map(|chosen| chosen.code.clone())
                .collect();

            let req = context.req.read();
            processor::resolve(&req, &self.cfg, &codes)
        } else {
            AHashMap::new()
        };

        span.record("bidders", resolved.len());

        context
            .fpd
            .set(resolved)
            .map_err(|_| anyhow!("FPD already resolved on context"))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::pipeline::auction::context::ChosenBidder;
    use crate::core::adapters::ortb_adapter::OrtbAdapter;
    use crate::core::adapters::spec::AdapterSpecBuilder;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_resolves_for_each_chosen_bidder() {
        let req = serde_json::from_value(json!({
            "id": "r",
            "imp": [{"id": "i1"}],
            "site": {"ext": {"data": {"section": "sports"}}}
        }))
        .unwrap();

        let context = AuctionContext::new(req);

        let spec = AdapterSpecBuilder::default()
            .code("acme")
            .endpoint("https://bid.example/rtb")
            .build()
            .unwrap();

        *context.chosen.lock() = vec![ChosenBidder {
            code: "acme".to_string(),
            adapter: Arc::new(OrtbAdapter::from_spec(&spec)),
            spec,
        }];

        FpdResolveTask::new(FpdConfig::default())
            .run(&context)
            .unwrap();

        let fpd = context.fpd.get().unwrap();
        assert_eq!(fpd.len(), 1);
        assert_eq!(fpd["acme"].site.as_ref().unwrap()["section"], "sports");
    }

    #[test]
    fn test_disabled_fpd_resolves_nothing() {
        let context = AuctionContext::new(
            serde_json::from_value(json!({"id": "r", "imp": [{"id": "i1"}]})).unwrap(),
        );

        let cfg = FpdConfig {
            enabled: false,
            ..Default::default()
        };

        FpdResolveTask::new(cfg).run(&context).unwrap();

        assert!(context.fpd.get().unwrap().is_empty());
    }
}
