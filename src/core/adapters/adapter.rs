use crate::core::ortb::request::{BidRequest, Imp};
use crate::core::ortb::response::{Bid, BidType, TypedBid};
use bytes::Bytes;
use std::fmt;
use std::time::Duration;

/// Exchange level context handed to adapters when building
/// outbound requests
#[derive(Debug, Clone)]
pub struct ExtraInfo {
    /// The currency every outbound request is normalized to
    pub default_currency: String,
}

#[derive(Debug, Clone)]
pub struct Header {
    pub key: String,
    pub value: String,
}

impl Header {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Header {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// One outbound HTTP call an adapter wants issued
#[derive(Debug, Clone)]
pub struct RequestData {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<Header>,
    pub body: Vec<u8>,
    /// Optional per-adapter cap, the worker takes the min of this
    /// and the remaining auction deadline
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HttpMethod {
    #[default]
    Post,
    Get,
}

/// A completed transport response handed back to the adapter
#[derive(Debug, Clone)]
pub struct ResponseData {
    pub status: u16,
    pub body: Bytes,
    pub headers: Vec<Header>,
}

/// Parsed outcome of one transport response
#[derive(Debug, Clone, Default)]
pub struct BidderResponse {
    pub bids: Vec<TypedBid>,
    pub currency: Option<String>,
}

/// Per bidder failure taxonomy. These are recorded data, not
/// propagated errors, a bidder failure never fails the auction
#[derive(Debug, Clone)]
pub enum BidderError {
    /// Connection, DNS, TLS or read failure
    Transport(String),
    /// Response status outside {200, 204}
    Protocol { status: u16, message: String },
    /// Response body not decodable as OpenRTB
    Parse(String),
    /// Bid dropped by validation or dedup
    Rejected(String),
    /// Non-fatal adapter issue while building requests
    Adapter(String),
    /// The auction deadline fired before the call completed
    TimedOut,
}

impl fmt::Display for BidderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BidderError::Transport(msg) => write!(f, "transport error: {}", msg),
            BidderError::Protocol { status, message } => {
                write!(f, "unexpected status {}: {}", status, message)
            }
            BidderError::Parse(msg) => write!(f, "response parse error: {}", msg),
            BidderError::Rejected(msg) => write!(f, "bid rejected: {}", msg),
            BidderError::Adapter(msg) => write!(f, "adapter error: {}", msg),
            BidderError::TimedOut => write!(f, "timed out"),
        }
    }
}

/// The two-phase bidder contract. Build zero or more outbound
/// calls for a (cloned, FPD applied) request, then parse each
/// transport response into typed bids.
///
/// # Behavior
/// Returning zero requests from [`Adapter::make_requests`] is a
/// legal opt-out, e.g. no supported media on this request.
/// Non-fatal issues are returned alongside valid output on both
/// phases.
pub trait Adapter: Send + Sync {
    fn make_requests(
        &self,
        req: &BidRequest,
        info: &ExtraInfo,
    ) -> (Vec<RequestData>, Vec<BidderError>);

    fn make_bids(
        &self,
        req: &BidRequest,
        res: &ResponseData,
    ) -> (BidderResponse, Vec<BidderError>);
}

/// Shared status handling for adapter [`Adapter::make_bids`]
/// implementations
pub enum StatusGate {
    /// 200, parse the body
    Proceed,
    /// 204, no bids and no error
    NoBid,
    /// Anything else is fatal for this call
    Fatal(BidderError),
}

pub fn gate_status(status: u16, body: &[u8]) -> StatusGate {
    match status {
        200 => StatusGate::Proceed,
        204 => StatusGate::NoBid,
        400 => StatusGate::Fatal(BidderError::Protocol {
            status,
            message: String::from_utf8_lossy(body).into_owned(),
        }),
        other => StatusGate::Fatal(BidderError::Protocol {
            status: other,
            message: "unexpected status code".to_string(),
        }),
    }
}

/// Classify the media type of a bid.
///
/// Prefers the 2.6 `mtype` field when the bidder set it, otherwise
/// falls back to the media objects of the imp the bid references.
/// Ambiguous multi-format imps without an mtype default to banner.
pub fn classify_bid_type(req: &BidRequest, bid: &Bid) -> BidType {
    match bid.mtype {
        Some(1) => return BidType::Banner,
        Some(2) => return BidType::Video,
        Some(3) => return BidType::Audio,
        Some(4) => return BidType::Native,
        _ => {}
    }

    let imp: Option<&Imp> = req.imp.iter().find(|imp| imp.id == bid.impid);

    match imp {
        Some(imp) if imp.video.is_some() && imp.banner.is_none() => BidType::Video,
        Some(imp) if imp.audio.is_some() && imp.banner.is_none() && imp.video.is_none() => {
            BidType::Audio
        }
        Some(imp)
            if imp.native.is_some()
                && imp.banner.is_none()
                && imp.video.is_none()
                && imp.audio.is_none() =>
        {
            BidType::Native
        }
        _ => BidType::Banner,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ortb::request::{BidRequestBuilder, ImpBuilder, Video};
    use crate::core::ortb::response::BidBuilder;

    #[test]
    fn test_gate_status_variants() {
        assert!(matches!(gate_status(200, b""), StatusGate::Proceed));
        assert!(matches!(gate_status(204, b""), StatusGate::NoBid));

        match gate_status(400, b"bad imp") {
            StatusGate::Fatal(BidderError::Protocol { status, message }) => {
                assert_eq!(status, 400);
                assert_eq!(message, "bad imp");
            }
            _ => panic!("expected fatal protocol error"),
        }

        assert!(matches!(
            gate_status(503, b""),
            StatusGate::Fatal(BidderError::Protocol { status: 503, .. })
        ));
    }

    #[test]
    fn test_classify_prefers_mtype() {
        let req = BidRequestBuilder::default().id("r").build().unwrap();
        let bid = BidBuilder::default()
            .id("b")
            .impid("missing")
            .mtype(Some(2))
            .build()
            .unwrap();

        assert_eq!(classify_bid_type(&req, &bid), BidType::Video);
    }

    #[test]
    fn test_classify_falls_back_to_imp_media() {
        let req = BidRequestBuilder::default()
            .id("r")
            .imp(vec![
                ImpBuilder::default()
                    .id("v1")
                    .video(Some(Video::default()))
                    .build()
                    .unwrap(),
            ])
            .build()
            .unwrap();

        let bid = BidBuilder::default().id("b").impid("v1").build().unwrap();

        assert_eq!(classify_bid_type(&req, &bid), BidType::Video);
    }
}
