use crate::core::adapters::adapter::{Adapter, BidderError};
use crate::core::adapters::spec::AdapterSpec;
use crate::core::fpd::ResolvedFpd;
use crate::core::idr::IdrDecision;
use crate::core::ortb::{BidRequest, BidResponse, TypedBid};
use ahash::AHashMap;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

/// One bidder chosen for an auction, resolved to its adapter
#[derive(Clone)]
pub struct ChosenBidder {
    pub code: String,
    pub adapter: Arc<dyn Adapter>,
    pub spec: AdapterSpec,
}

/// Outcome of one bidder in one auction. Populated by a single
/// worker, read-only once inserted into the result map
#[derive(Debug, Default)]
pub struct BidderResult {
    pub bidder_code: String,
    pub bids: Vec<TypedBid>,
    pub errors: Vec<BidderError>,
    /// Currency the bidder responded in, when it declared one
    pub currency: Option<String>,
    pub latency: Duration,
    pub timed_out: bool,
}

/// Auction debug payload, exposed on test requests and kept on
/// the auction result. Maps are ordered so output is stable
#[derive(Debug, Default, Serialize)]
pub struct DebugInfo {
    pub selected_bidders: Vec<String>,
    pub excluded_bidders: Vec<String>,
    pub latencies_ms: BTreeMap<String, u64>,
    pub errors: BTreeMap<String, Vec<String>>,
    /// imp id -> winning bidder code
    pub winners: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Everything the HTTP layer gets back from one auction
pub struct AuctionResult {
    pub response: BidResponse,
    pub results: AHashMap<String, BidderResult>,
    pub debug: DebugInfo,
    pub idr: IdrDecision,
}

/// Top level auction context carried through the pipeline.
///
/// # Behavior
/// The inbound request behind `req` is only ever mutated by the
/// EID filter pass, everything else works on per-bidder clones.
/// `results` and the debug error map are the only worker-shared
/// state, guarded by small mutexes with short critical sections.
pub struct AuctionContext {
    pub req: RwLock<BidRequest>,
    pub received_at: Instant,
    /// Absolute auction deadline, assigned by the deadline task
    pub deadline: OnceLock<Instant>,
    /// Bidders chosen for fan-out, in deterministic code order
    pub chosen: Mutex<Vec<ChosenBidder>>,
    /// Per bidder resolved first party data
    pub fpd: OnceLock<AHashMap<String, ResolvedFpd>>,
    /// Completed bidder results keyed by code, written by workers
    pub results: Arc<Mutex<AHashMap<String, BidderResult>>>,
    pub debug: Mutex<DebugInfo>,
    pub idr: OnceLock<IdrDecision>,
    /// Final response, assigned exactly once by settlement or an
    /// early-abort task
    pub res: OnceLock<BidResponse>,
    /// Set when the request itself is malformed, the handler turns
    /// this into a 400
    pub malformed: OnceLock<String>,
}

impl AuctionContext {
    pub fn new(req: BidRequest) -> AuctionContext {
        AuctionContext {
            req: RwLock::new(req),
            received_at: Instant::now(),
            deadline: OnceLock::new(),
            chosen: Mutex::new(Vec::new()),
            fpd: OnceLock::new(),
            results: Arc::new(Mutex::new(AHashMap::new())),
            debug: Mutex::new(DebugInfo::default()),
            idr: OnceLock::new(),
            res: OnceLock::new(),
            malformed: OnceLock::new(),
        }
    }

    /// Time left until the auction deadline, zero once elapsed or
    /// before the deadline task ran
    pub fn remaining(&self) -> Duration {
        self.deadline
            .get()
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
            .unwrap_or(Duration::ZERO)
    }

    pub fn record_bidder_error(&self, code: &str, message: String) {
        self.debug
            .lock()
            .errors
            .entry(code.to_string())
            .or_default()
            .push(message);
    }

    /// Tear the context down into the result handed to the HTTP
    /// layer. The response falls back to an empty no-bid shell if
    /// no task assigned one
    pub fn into_result(self) -> AuctionResult {
        let req_id = self.req.read().id.clone();

        let response = self.res.into_inner().unwrap_or_else(|| BidResponse {
            id: req_id,
            ..Default::default()
        });

        let results = Arc::try_unwrap(self.results)
            .map(|mutex| mutex.into_inner())
            .unwrap_or_default();

        AuctionResult {
            response,
            results,
            debug: self.debug.into_inner(),
            idr: self.idr.into_inner().unwrap_or_default(),
        }
    }
}
