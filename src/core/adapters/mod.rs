pub mod adapter;
pub mod dynamic;
pub mod ortb_adapter;
pub mod registry;
pub mod spec;

pub use adapter::{Adapter, BidderError, BidderResponse, ExtraInfo, RequestData, ResponseData};
pub use registry::BidderRegistry;
pub use spec::AdapterSpec;
