use crate::app::pipeline::auction::AuctionContext;
use crate::child_span_info;
use crate::core::pipeline::BlockingTask;
use ahash::AHashSet;
use anyhow::anyhow;
use tracing::debug;

/// Structural validation of the inbound request. A failure here is
/// the publisher's fault and surfaces as a 400, not a no-bid
pub struct ValidateRequestTask;

impl ValidateRequestTask {
    fn reject(context: &AuctionContext, reason: &str) -> anyhow::Error {
        let _ = context.malformed.set(reason.to_string());

        anyhow!("Rejected malformed request: {}", reason)
    }
}

impl BlockingTask<AuctionContext, anyhow::Error> for ValidateRequestTask {
    fn run(&self, context: &AuctionContext) -> Result<(), anyhow::Error> {
        let span = child_span_info!(
            "request_validate_task",
            invalid_reason = tracing::field::Empty
        )
        .entered();

        let req = context.req.read();

        if req.id.is_empty() {
            span.record("invalid_reason", "missing_request_id");
            return Err(Self::reject(context, "missing request id"));
        }

        if req.imp.is_empty() {
            span.record("invalid_reason", "missing_imps");
            return Err(Self::reject(context, "request has no impressions"));
        }

        if req.site.is_some() && req.app.is_some() {
            span.record("invalid_reason", "site_and_app");
            return Err(Self::reject(context, "request carries both site and app"));
        }

        let mut seen_ids = AHashSet::with_capacity(req.imp.len());

        for imp in &req.imp {
            if imp.id.is_empty() {
                span.record("invalid_reason", "missing_imp_id");
                return Err(Self::reject(context, "imp without id"));
            }

            if !seen_ids.insert(imp.id.as_str()) {
                span.record("invalid_reason", "duplicate_imp_id");
                return Err(Self::reject(
                    context,
                    &format!("duplicate imp id {}", imp.id),
                ));
            }

            if !imp.has_media() {
                span.record("invalid_reason", "missing_media");
                return Err(Self::reject(
                    context,
                    &format!("imp {} has no media object", imp.id),
                ));
            }
        }

        debug!("Request {} passed basic validation", req.id);
        span.record("invalid_reason", "none");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ortb::request::{Banner, BidRequestBuilder, ImpBuilder};

    fn banner_imp(id: &str) -> crate::core::ortb::request::Imp {
        ImpBuilder::default()
            .id(id)
            .banner(Some(Banner::default()))
            .build()
            .unwrap()
    }

    #[test]
    fn test_valid_request_passes() {
        let req = BidRequestBuilder::default()
            .id("r1")
            .imp(vec![banner_imp("i1"), banner_imp("i2")])
            .build()
            .unwrap();

        let context = AuctionContext::new(req);

        assert!(ValidateRequestTask.run(&context).is_ok());
        assert!(context.malformed.get().is_none());
    }

    #[test]
    fn test_missing_id_rejected() {
        let req = BidRequestBuilder::default()
            .imp(vec![banner_imp("i1")])
            .build()
            .unwrap();

        let context = AuctionContext::new(req);

        assert!(ValidateRequestTask.run(&context).is_err());
        assert!(context.malformed.get().unwrap().contains("request id"));
    }

    #[test]
    fn test_duplicate_imp_ids_rejected() {
        let req = BidRequestBuilder::default()
            .id("r1")
            .imp(vec![banner_imp("dup"), banner_imp("dup")])
            .build()
            .unwrap();

        let context = AuctionContext::new(req);

        assert!(ValidateRequestTask.run(&context).is_err());
        assert!(context.malformed.get().unwrap().contains("duplicate"));
    }

    #[test]
    fn test_imp_without_media_rejected() {
        let req = BidRequestBuilder::default()
            .id("r1")
            .imp(vec![ImpBuilder::default().id("i1").build().unwrap()])
            .build()
            .unwrap();

        let context = AuctionContext::new(req);

        assert!(ValidateRequestTask.run(&context).is_err());
        assert!(context.malformed.get().unwrap().contains("media"));
    }
}
