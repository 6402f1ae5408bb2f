use crate::app::config::FpdConfig;
use crate::app::pipeline::auction::AuctionContext;
use crate::core::fpd::eids::filter_eids;
use crate::core::pipeline::BlockingTask;
use tracing::debug;

/// The single sanctioned mutation of the shared request: project
/// user EIDs down to allow-listed sources before any per-bidder
/// cloning happens
pub struct EidFilterTask {
    cfg: FpdConfig,
}

impl EidFilterTask {
    pub fn new(cfg: FpdConfig) -> Self {
        EidFilterTask { cfg }
    }
}

impl BlockingTask<AuctionContext, anyhow::Error> for EidFilterTask {
    fn run(&self, context: &AuctionContext) -> Result<(), anyhow::Error> {
        if !self.cfg.enabled || !self.cfg.eids_enabled {
            return Ok(());
        }

        let removed = filter_eids(&mut context.req.write(), &self.cfg.eid_sources);

        if removed > 0 {
            debug!("Filtered {} EIDs with disallowed sources", removed);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ortb::BidRequest;
    use serde_json::json;

    fn eid_request() -> BidRequest {
        serde_json::from_value(json!({
            "id": "r",
            "imp": [{"id": "i1"}],
            "user": {"eids": [
                {"source": "liveramp.com", "uids": [{"id": "a"}]},
                {"source": "blocked.com", "uids": [{"id": "b"}]}
            ]}
        }))
        .unwrap()
    }

    fn cfg(eids_enabled: bool, sources: &[&str]) -> FpdConfig {
        FpdConfig {
            eids_enabled,
            eid_sources: sources.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_allow_listed_source_survives() {
        let context = AuctionContext::new(eid_request());
        let task = EidFilterTask::new(cfg(true, &["liveramp.com"]));

        task.run(&context).unwrap();

        let req = context.req.read();
        let eids = &req.user.as_ref().unwrap().eids;

        assert_eq!(eids.len(), 1);
        assert_eq!(eids[0].source, "liveramp.com");
    }

    #[test]
    fn test_disabled_filter_leaves_request_alone() {
        let context = AuctionContext::new(eid_request());
        let task = EidFilterTask::new(cfg(false, &["liveramp.com"]));

        task.run(&context).unwrap();

        assert_eq!(context.req.read().user.as_ref().unwrap().eids.len(), 2);
    }
}
