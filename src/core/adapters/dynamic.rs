use crate::core::adapters::adapter::{
    Adapter, BidderError, BidderResponse, ExtraInfo, Header, HttpMethod, RequestData,
    ResponseData, StatusGate, classify_bid_type, gate_status,
};
use crate::core::adapters::spec::{AdapterSpec, PlatformMediaTypes};
use crate::core::demand::encoding::ResponseDecoder;
use crate::core::ortb::request::BidRequest;
use crate::core::ortb::response::BidType;
use crate::core::ortb::TypedBid;
use ahash::AHashMap;
use anyhow::{Context, bail};
use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Body/header template macro for the inbound auction id
const MACRO_AUCTION_ID: &str = "${AUCTION_ID}";
/// Body/header template macro for the bidder code
const MACRO_BIDDER_CODE: &str = "${BIDDER_CODE}";
/// Body template macro for the full request json
const MACRO_REQUEST: &str = "${REQUEST}";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeaderTemplate {
    pub key: String,
    pub value: String,
}

/// Response mapping hints for a dynamic bidder
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseHints {
    /// Forced media type for all bids, inferred per bid when unset
    pub bid_type: Option<BidType>,
    /// Assumed response currency when the response omits `cur`
    pub currency: Option<String>,
}

/// A bidder declared entirely by data, no code registration needed
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DynamicBidderConfig {
    pub code: String,
    pub enabled: bool,
    pub maintainer: String,
    pub endpoint: String,
    pub method: DynamicMethod,
    pub headers: Vec<HeaderTemplate>,
    /// Outbound body template. Empty means pass the OpenRTB json
    /// through untouched
    pub body_template: String,
    pub response: ResponseHints,
    pub media_types: PlatformMediaTypes,
    pub gvl_vendor_id: Option<u32>,
    #[serde(with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

impl Default for DynamicBidderConfig {
    fn default() -> Self {
        Self {
            code: String::new(),
            enabled: true,
            maintainer: String::new(),
            endpoint: String::new(),
            method: DynamicMethod::Post,
            headers: Vec::new(),
            body_template: String::new(),
            response: ResponseHints::default(),
            media_types: PlatformMediaTypes::default(),
            gvl_vendor_id: None,
            timeout: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DynamicMethod {
    Post,
    Get,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct DynamicBiddersFile {
    bidders: Vec<DynamicBidderConfig>,
}

fn render(template: &str, code: &str, req: &BidRequest, req_json: &str) -> String {
    template
        .replace(MACRO_AUCTION_ID, &req.id)
        .replace(MACRO_BIDDER_CODE, code)
        .replace(MACRO_REQUEST, req_json)
}

/// Adapter driven entirely by a [`DynamicBidderConfig`]
pub struct DynamicAdapter {
    cfg: DynamicBidderConfig,
}

impl DynamicAdapter {
    pub fn new(cfg: DynamicBidderConfig) -> Self {
        DynamicAdapter { cfg }
    }
}

impl Adapter for DynamicAdapter {
    fn make_requests(
        &self,
        req: &BidRequest,
        _info: &ExtraInfo,
    ) -> (Vec<RequestData>, Vec<BidderError>) {
        let req_json = match serde_json::to_string(req) {
            Ok(json) => json,
            Err(e) => {
                return (
                    Vec::new(),
                    vec![BidderError::Adapter(format!("failed to encode request: {}", e))],
                );
            }
        };

        let body = if self.cfg.body_template.is_empty() {
            req_json.clone()
        } else {
            render(&self.cfg.body_template, &self.cfg.code, req, &req_json)
        };

        let mut headers = vec![Header::new("content-type", "application/json")];
        for header in &self.cfg.headers {
            headers.push(Header::new(
                header.key.clone(),
                render(&header.value, &self.cfg.code, req, ""),
            ));
        }

        let method = match self.cfg.method {
            DynamicMethod::Post => HttpMethod::Post,
            DynamicMethod::Get => HttpMethod::Get,
        };

        let data = RequestData {
            method,
            url: render(&self.cfg.endpoint, &self.cfg.code, req, ""),
            headers,
            body: body.into_bytes(),
            timeout: self.cfg.timeout,
        };

        (vec![data], Vec::new())
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

        let currency = parsed.cur.clone().or_else(|| self.cfg.response.currency.clone());
        let mut bids = Vec::new();

        for seatbid in parsed.seatbid {
            for bid in seatbid.bid {
                let bid_type = self
                    .cfg
                    .response
                    .bid_type
                    .unwrap_or_else(|| classify_bid_type(req, &bid));

                bids.push(TypedBid { bid, bid_type });
            }
        }

        (BidderResponse { bids, currency }, Vec::new())
    }
}

fn spec_for(cfg: &DynamicBidderConfig) -> AdapterSpec {
    AdapterSpec {
        code: cfg.code.to_lowercase(),
        maintainer: cfg.maintainer.clone(),
        enabled: cfg.enabled,
        media_types: cfg.media_types.clone(),
        gvl_vendor_id: cfg.gvl_vendor_id,
        endpoint: cfg.endpoint.clone(),
        gzip: false,
        multi_imp: true,
        timeout: cfg.timeout,
    }
}

/// One immutable generation of dynamic bidders
#[derive(Default)]
pub struct DynamicSnapshot {
    adapters: Vec<(Arc<dyn Adapter>, AdapterSpec)>,
    index: AHashMap<String, usize>,
}

impl DynamicSnapshot {
    fn from_file(parsed: DynamicBiddersFile) -> Result<Self, anyhow::Error> {
        let mut configs = parsed.bidders;
        configs.sort_by(|a, b| a.code.cmp(&b.code));

        let mut adapters: Vec<(Arc<dyn Adapter>, AdapterSpec)> =
            Vec::with_capacity(configs.len());
        let mut index = AHashMap::with_capacity(configs.len());

        for cfg in configs {
            let spec = spec_for(&cfg);

            if spec.code.is_empty() || spec.endpoint.is_empty() {
                bail!("Dynamic bidder missing code or endpoint");
            }

            if index.contains_key(&spec.code) {
                bail!("Duplicate dynamic bidder code {}", spec.code);
            }

            let adapter: Arc<dyn Adapter> = Arc::new(DynamicAdapter::new(cfg));

            index.insert(spec.code.clone(), adapters.len());
            adapters.push((adapter, spec));
        }

        Ok(DynamicSnapshot { adapters, index })
    }

    pub fn adapter(&self, code: &str) -> Option<(Arc<dyn Adapter>, &AdapterSpec)> {
        self.index
            .get(&code.to_lowercase())
            .map(|idx| (self.adapters[*idx].0.clone(), &self.adapters[*idx].1))
    }

    pub fn enabled_codes(&self) -> Vec<String> {
        self.adapters
            .iter()
            .filter(|(_, spec)| spec.enabled)
            .map(|(_, spec)| spec.code.clone())
            .collect()
    }
}

/// Holds the current dynamic bidder snapshot and reloads it on a
/// configured interval.
///
/// # Behavior
/// Snapshot swaps are a single atomic pointer handoff, an auction
/// reading mid-refresh sees either the old or the new generation,
/// never a torn state. A failed reload keeps the previous snapshot.
pub struct DynamicRegistry {
    path: PathBuf,
    snapshot: ArcSwap<DynamicSnapshot>,
}

impl DynamicRegistry {
    pub fn new(path: PathBuf) -> Self {
        DynamicRegistry {
            path,
            snapshot: ArcSwap::from_pointee(DynamicSnapshot::default()),
        }
    }

    /// Parse the backing file and swap in the new generation,
    /// returning the count of loaded bidders
    pub fn reload(&self) -> Result<usize, anyhow::Error> {
        let cfg = config::Config::builder()
            .add_source(config::File::from(self.path.clone()))
            .build()
            .with_context(|| format!("reading dynamic bidders from {:?}", self.path))?;

        let parsed: DynamicBiddersFile = cfg.try_deserialize()?;
        let snapshot = DynamicSnapshot::from_file(parsed)?;
        let count = snapshot.adapters.len();

        self.snapshot.store(Arc::new(snapshot));

        debug!("Dynamic bidder snapshot swapped, {} bidders", count);

        Ok(count)
    }

    pub fn snapshot(&self) -> Arc<DynamicSnapshot> {
        self.snapshot.load_full()
    }

    /// Detached refresh loop, reload failures keep the last good
    /// snapshot and are logged only
    pub fn start_refresh(self: Arc<Self>, period: Duration) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            // first tick fires immediately, skip it since startup
            // already did the initial load
            ticker.tick().await;

            loop {
                ticker.tick().await;

                match self.reload() {
                    Ok(count) => info!("Refreshed dynamic bidders, {} loaded", count),
                    Err(e) => warn!("Dynamic bidder refresh failed, keeping last snapshot: {}", e),
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ortb::request::BidRequestBuilder;
    use bytes::Bytes;

    fn dynamic_cfg() -> DynamicBidderConfig {
        DynamicBidderConfig {
            code: "dyn1".to_string(),
            endpoint: "https://dyn.example/rtb?src=${BIDDER_CODE}".to_string(),
            headers: vec![HeaderTemplate {
                key: "x-auction".to_string(),
                value: MACRO_AUCTION_ID.to_string(),
            }],
            ..Default::default()
        }
    }

    fn request() -> BidRequest {
        BidRequestBuilder::default().id("a-77").build().unwrap()
    }

    #[test]
    fn test_passthrough_body_and_rendered_macros() {
        let adapter = DynamicAdapter::new(dynamic_cfg());
        let info = ExtraInfo {
            default_currency: "USD".to_string(),
        };

        let (calls, errors) = adapter.make_requests(&request(), &info);

        assert!(errors.is_empty());
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].url, "https://dyn.example/rtb?src=dyn1");
        assert!(
            calls[0]
                .headers
                .iter()
                .any(|h| h.key == "x-auction" && h.value == "a-77")
        );

        let sent: BidRequest = serde_json::from_slice(&calls[0].body).unwrap();
        assert_eq!(sent.id, "a-77");
    }

    #[test]
    fn test_body_template_rendering() {
        let mut cfg = dynamic_cfg();
        cfg.body_template = r#"{"auction": "${AUCTION_ID}", "ortb": ${REQUEST}}"#.to_string();

        let adapter = DynamicAdapter::new(cfg);
        let info = ExtraInfo {
            default_currency: "USD".to_string(),
        };

        let (calls, _) = adapter.make_requests(&request(), &info);
        let body: serde_json::Value = serde_json::from_slice(&calls[0].body).unwrap();

        assert_eq!(body["auction"], "a-77");
        assert_eq!(body["ortb"]["id"], "a-77");
    }

    #[test]
    fn test_response_hints_force_bid_type() {
        let mut cfg = dynamic_cfg();
        cfg.response.bid_type = Some(BidType::Video);

        let adapter = DynamicAdapter::new(cfg);

        let body = r#"{"id": "a-77", "seatbid": [{"bid": [
            {"id": "b1", "impid": "i1", "price": 4.0, "adm": "<VAST/>"}
        ]}]}"#;

        let res = ResponseData {
            status: 200,
            body: Bytes::from(body.to_string()),
            headers: Vec::new(),
        };

        let (parsed, errors) = adapter.make_bids(&request(), &res);

        assert!(errors.is_empty());
        assert_eq!(parsed.bids[0].bid_type, BidType::Video);
    }

    #[test]
    fn test_snapshot_reload_swaps_atomically() {
        let dir = std::env::temp_dir().join(format!("nexus-dyn-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("bidders.json");

        std::fs::write(
            &path,
            r#"{"bidders": [{"code": "alpha", "endpoint": "https://a.example/rtb"}]}"#,
        )
        .unwrap();

        let registry = DynamicRegistry::new(path.clone());
        assert!(registry.snapshot().enabled_codes().is_empty());

        assert_eq!(registry.reload().unwrap(), 1);
        let first = registry.snapshot();
        assert_eq!(first.enabled_codes(), vec!["alpha"]);

        std::fs::write(
            &path,
            r#"{"bidders": [
                {"code": "alpha", "endpoint": "https://a.example/rtb"},
                {"code": "beta", "endpoint": "https://b.example/rtb"}
            ]}"#,
        )
        .unwrap();

        assert_eq!(registry.reload().unwrap(), 2);

        // the old generation is still intact for holders of the
        // prior snapshot
        assert_eq!(first.enabled_codes(), vec!["alpha"]);
        assert_eq!(registry.snapshot().enabled_codes(), vec!["alpha", "beta"]);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_failed_reload_keeps_previous_snapshot() {
        let dir = std::env::temp_dir().join(format!("nexus-dyn-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("bidders.json");

        std::fs::write(
            &path,
            r#"{"bidders": [{"code": "alpha", "endpoint": "https://a.example/rtb"}]}"#,
        )
        .unwrap();

        let registry = DynamicRegistry::new(path.clone());
        registry.reload().unwrap();

        std::fs::write(&path, "{not json").unwrap();

        assert!(registry.reload().is_err());
        assert_eq!(registry.snapshot().enabled_codes(), vec!["alpha"]);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
