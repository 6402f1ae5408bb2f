use crate::core::ortb::BidRequest;
use serde::{Deserialize, Serialize};

/// Body of `POST /api/select`
#[derive(Debug, Serialize)]
pub struct SelectRequest<'a> {
    pub request: &'a BidRequest,
    pub available_bidders: &'a [String],
}

/// One scored bidder entry from the selector. Reasons are free
/// text from the service, e.g. ANCHOR, HIGH_SCORE, DIVERSITY,
/// EXPLORATION, LOW_SCORE
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BidderScore {
    pub bidder_code: String,
    pub score: f64,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectResponse {
    pub selected_bidders: Vec<BidderScore>,
    pub excluded_bidders: Vec<BidderScore>,
    pub mode: String,
    pub processing_time_ms: f64,
}

/// How the selector influenced one auction, carried on the
/// auction result for debugging
#[derive(Debug, Clone, Default, Serialize)]
pub struct IdrDecision {
    /// Whether a selector call was attempted at all
    pub consulted: bool,
    /// Whether the selected set actually replaced the full set
    pub applied: bool,
    pub selected: Vec<BidderScore>,
    pub excluded: Vec<BidderScore>,
    pub mode: Option<String>,
}

/// Body for the remote mode toggle endpoints
#[derive(Debug, Serialize, Deserialize)]
pub struct ModeToggle {
    pub enabled: bool,
}
