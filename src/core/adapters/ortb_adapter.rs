use crate::core::adapters::adapter::{
    Adapter, BidderError, BidderResponse, ExtraInfo, HttpMethod, RequestData, ResponseData,
    StatusGate, classify_bid_type, gate_status,
};
use crate::core::adapters::spec::AdapterSpec;
use crate::core::demand::encoding::{RequestEncoder, ResponseDecoder};
use crate::core::ortb::TypedBid;
use crate::core::ortb::request::{BidRequest, Imp};
use std::time::Duration;

/// The built-in adapter speaking plain OpenRTB json to a
/// configured endpoint.
///
/// Covers the common exchange integration shape: post the
/// (already cloned and customized) request as json, optionally
/// gzipped, and read an OpenRTB response back. Bidders which only
/// accept one imp per request get one outbound call per imp.
pub struct OrtbAdapter {
    code: String,
    endpoint: String,
    gzip: bool,
    multi_imp: bool,
    spec: AdapterSpec,
    timeout: Option<Duration>,
}

impl OrtbAdapter {
    pub fn from_spec(spec: &AdapterSpec) -> Self {
        OrtbAdapter {
            code: spec.code.clone(),
            endpoint: spec.endpoint.clone(),
            gzip: spec.gzip,
            multi_imp: spec.multi_imp,
            timeout: spec.timeout,
            spec: spec.clone(),
        }
    }

    /// Keep only imps with at least one media object this bidder
    /// accepts on the request platform
    fn supported_imps(&self, req: &BidRequest) -> (Vec<Imp>, Vec<BidderError>) {
        let media = self.spec.media_for_app(req.app.is_some());

        let mut kept = Vec::with_capacity(req.imp.len());
        let mut errors = Vec::new();

        for imp in &req.imp {
            let supported = (imp.banner.is_some() && media.banner)
                || (imp.video.is_some() && media.video)
                || (imp.audio.is_some() && media.audio)
                || (imp.native.is_some() && media.native);

            if supported {
                kept.push(imp.clone());
            } else {
                errors.push(BidderError::Adapter(format!(
                    "imp {} has no media supported by {}",
                    imp.id, self.code
                )));
            }
        }

        (kept, errors)
    }

    fn encode_call(&self, req: &BidRequest) -> Result<RequestData, BidderError> {
        let encoded = RequestEncoder::encode(req, self.gzip)
            .map_err(|e| BidderError::Adapter(format!("failed to encode request: {}", e)))?;

        Ok(RequestData {
            method: HttpMethod::Post,
            url: self.endpoint.clone(),
            headers: encoded.headers,
            body: encoded.data,
            timeout: self.timeout,
        })
    }
}

impl Adapter for OrtbAdapter {
    fn make_requests(
        &self,
        req: &BidRequest,
        _info: &ExtraInfo,
    ) -> (Vec<RequestData>, Vec<BidderError>) {
        let (kept, mut errors) = self.supported_imps(req);

        if kept.is_empty() {
            // opt out entirely, nothing this bidder can buy here
            return (Vec::new(), errors);
        }

        let mut outbound = Vec::with_capacity(if self.multi_imp { 1 } else { kept.len() });

        if self.multi_imp || kept.len() == 1 {
            let mut single = req.clone();
            single.imp = kept;

            match self.encode_call(&single) {
                Ok(data) => outbound.push(data),
                Err(e) => errors.push(e),
            }
        } else {
            // single imp exchange, break the request out per imp
            for imp in kept {
                let mut broken_out = req.clone();
                broken_out.imp = vec![imp];

                match self.encode_call(&broken_out) {
                    Ok(data) => outbound.push(data),
                    Err(e) => errors.push(e),
                }
            }
        }

        (outbound, errors)
    }

    fn make_bids(
        &self,
        req: &BidRequest,
        res: &ResponseData,
    ) -> (BidderResponse, Vec<BidderError>) {
        match gate_status(res.status, &res.body) {
            StatusGate::NoBid => return (BidderResponse::default(), Vec::new()),
            StatusGate::Fatal(e) => return (BidderResponse::default(), vec![e]),
            StatusGate::Proceed => {}
        }

        let parsed = match ResponseDecoder::decode(&res.body) {
            Ok(parsed) => parsed,
            Err(e) => {
                return (
                    BidderResponse::default(),
                    vec![BidderError::Parse(e.to_string())],
                );
            }
        };

        let currency = parsed.cur.clone();
        let mut bids = Vec::new();

        for seatbid in parsed.seatbid {
            for bid in seatbid.bid {
                let bid_type = classify_bid_type(req, &bid);
                bids.push(TypedBid { bid, bid_type });
            }
        }

        (BidderResponse { bids, currency }, Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::adapters::spec::{AdapterSpecBuilder, MediaTypes, PlatformMediaTypes};
    use crate::core::ortb::BidType;
    use crate::core::ortb::request::{Banner, BidRequestBuilder, ImpBuilder, Video};
    use bytes::Bytes;

    fn extra_info() -> ExtraInfo {
        ExtraInfo {
            default_currency: "USD".to_string(),
        }
    }

    fn banner_imp(id: &str) -> crate::core::ortb::request::Imp {
        ImpBuilder::default()
            .id(id)
            .banner(Some(Banner {
                w: Some(300),
                h: Some(250),
                ..Default::default()
            }))
            .build()
            .unwrap()
    }

    fn two_imp_request() -> BidRequest {
        BidRequestBuilder::default()
            .id("req-1")
            .imp(vec![banner_imp("i1"), banner_imp("i2")])
            .build()
            .unwrap()
    }

    fn adapter(multi_imp: bool) -> OrtbAdapter {
        let spec = AdapterSpecBuilder::default()
            .code("acme")
            .endpoint("https://bid.acme.example/rtb")
            .gzip(false)
            .multi_imp(multi_imp)
            .build()
            .unwrap();

        OrtbAdapter::from_spec(&spec)
    }

    #[test]
    fn test_multi_imp_bidder_gets_one_call() {
        let (calls, errors) = adapter(true).make_requests(&two_imp_request(), &extra_info());

        assert_eq!(calls.len(), 1);
        assert!(errors.is_empty());

        let sent: BidRequest = serde_json::from_slice(&calls[0].body).unwrap();
        assert_eq!(sent.imp.len(), 2);
    }

    #[test]
    fn test_single_imp_bidder_gets_broken_out_calls() {
        let (calls, errors) = adapter(false).make_requests(&two_imp_request(), &extra_info());

        assert_eq!(calls.len(), 2);
        assert!(errors.is_empty());

        let first: BidRequest = serde_json::from_slice(&calls[0].body).unwrap();
        let second: BidRequest = serde_json::from_slice(&calls[1].body).unwrap();
        assert_eq!(first.imp.len(), 1);
        assert_eq!(first.imp[0].id, "i1");
        assert_eq!(second.imp[0].id, "i2");
    }

    #[test]
    fn test_unsupported_media_opts_out() {
        let spec = AdapterSpecBuilder::default()
            .code("videoless")
            .endpoint("https://bid.example/rtb")
            .media_types(PlatformMediaTypes {
                site: MediaTypes {
                    video: false,
                    ..Default::default()
                },
                app: MediaTypes::default(),
            })
            .build()
            .unwrap();

        let video_only = BidRequestBuilder::default()
            .id("req-v")
            .imp(vec![
                ImpBuilder::default()
                    .id("v1")
                    .video(Some(Video::default()))
                    .build()
                    .unwrap(),
            ])
            .build()
            .unwrap();

        let (calls, errors) =
            OrtbAdapter::from_spec(&spec).make_requests(&video_only, &extra_info());

        assert!(calls.is_empty());
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_make_bids_no_content() {
        let res = ResponseData {
            status: 204,
            body: Bytes::new(),
            headers: Vec::new(),
        };

        let (parsed, errors) = adapter(true).make_bids(&two_imp_request(), &res);

        assert!(parsed.bids.is_empty());
        assert!(errors.is_empty());
    }

    #[test]
    fn test_make_bids_bad_request_is_fatal() {
        let res = ResponseData {
            status: 400,
            body: Bytes::from_static(b"missing imp"),
            headers: Vec::new(),
        };

        let (parsed, errors) = adapter(true).make_bids(&two_imp_request(), &res);

        assert!(parsed.bids.is_empty());
        assert_eq!(errors.len(), 1);
        assert!(errors[0].to_string().contains("missing imp"));
    }

    #[test]
    fn test_make_bids_parses_typed_bids() {
        let body = r#"{
            "id": "req-1",
            "cur": "USD",
            "seatbid": [{"seat": "acme", "bid": [
                {"id": "b1", "impid": "i1", "price": 1.2, "adm": "<div/>"}
            ]}]
        }"#;

        let res = ResponseData {
            status: 200,
            body: Bytes::from(body.to_string()),
            headers: Vec::new(),
        };

        let (parsed, errors) = adapter(true).make_bids(&two_imp_request(), &res);

        assert!(errors.is_empty());
        assert_eq!(parsed.currency.as_deref(), Some("USD"));
        assert_eq!(parsed.bids.len(), 1);
        assert_eq!(parsed.bids[0].bid_type, BidType::Banner);
        assert_eq!(parsed.bids[0].bid.price, 1.2);
    }

    #[test]
    fn test_make_bids_undecodable_body() {
        let res = ResponseData {
            status: 200,
            body: Bytes::from_static(b"<html>oops</html>"),
            headers: Vec::new(),
        };

        let (parsed, errors) = adapter(true).make_bids(&two_imp_request(), &res);

        assert!(parsed.bids.is_empty());
        assert!(matches!(errors[0], BidderError::Parse(_)));
    }
}
