use crate::core::ortb::request::{is_zero_f64, is_zero_i32};
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};

/// Top level OpenRTB bid response
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, Builder)]
#[serde(default)]
#[builder(setter(into), default)]
pub struct BidResponse {
    /// Echo of the request id
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub seatbid: Vec<SeatBid>,
    /// Exchange generated response id for logging/tracking
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bidid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cur: Option<String>,
    /// No bid reason code when the response carries no seats
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nbr: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ext: Option<Value>,
}

/// A set of bids returned under one bidder seat
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, Builder)]
#[serde(default)]
#[builder(setter(into), default)]
pub struct SeatBid {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub bid: Vec<Bid>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub seat: String,
    #[serde(skip_serializing_if = "is_zero_i32")]
    pub group: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ext: Option<Value>,
}

/// A single bid on one impression.
///
/// At least one of `adm` or `nurl` must be present for the bid to be
/// servable, which bid validation enforces
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, Builder)]
#[serde(default)]
#[builder(setter(into), default)]
pub struct Bid {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id: String,
    /// Id of the imp this bid applies to, must resolve to an
    /// imp of the originating request
    #[serde(skip_serializing_if = "String::is_empty")]
    pub impid: String,
    /// Bid price as CPM in the response currency
    #[serde(skip_serializing_if = "is_zero_f64")]
    pub price: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nurl: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub burl: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lurl: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adm: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adid: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub adomain: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crid: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cat: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub w: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub h: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dealid: Option<String>,
    /// 2.6 media type marker, 1 banner, 2 video, 3 audio, 4 native
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mtype: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ext: Option<Value>,
}

/// Media type a bid was classified as, used for validation
/// and outcome reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum BidType {
    Banner,
    Video,
    Audio,
    Native,
}

/// A parsed bid paired with the media type the adapter
/// classified it as
#[derive(Debug, Clone, PartialEq)]
pub struct TypedBid {
    pub bid: Bid,
    pub bid_type: BidType,
}
