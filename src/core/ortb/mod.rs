pub mod nobidreason;
pub mod request;
pub mod response;
pub mod sanitize;

pub use request::BidRequest;
pub use response::{Bid, BidResponse, BidType, SeatBid, TypedBid};
