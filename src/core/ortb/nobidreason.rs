//! OpenRTB no-bid reason codes plus exchange specific codes.
//! Codes >= 500 sit in OpenRTB's exchange-specific range.

pub const UNKNOWN_ERROR: i32 = 0;
pub const TECHNICAL_ERROR: i32 = 1;
pub const INVALID_REQUEST: i32 = 2;
pub const INSUFFICIENT_AUCTION_TIME: i32 = 11;

/// No bidders were enabled or matched for this request
pub const NO_BIDDERS_AVAILABLE: i32 = 500;
/// Bidders were called but none returned a usable bid
pub const NO_BIDS_RECEIVED: i32 = 501;
/// The auction deadline expired before any bid was collected
pub const AUCTION_DEADLINE_EXCEEDED: i32 = 502;
