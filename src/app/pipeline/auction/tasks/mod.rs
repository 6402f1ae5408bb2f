mod validate;
pub use validate::ValidateRequestTask;

mod deadline;
pub use deadline::DeadlineTask;

mod bidder_select;
pub use bidder_select::BidderSelectTask;

mod idr_select;
pub use idr_select::IdrSelectTask;

mod eid_filter;
pub use eid_filter::EidFilterTask;

mod fpd_resolve;
pub use fpd_resolve::FpdResolveTask;

mod callouts;
pub use callouts::BidderCalloutsTask;

mod bid_validation;
pub use bid_validation::BidValidationTask;

mod settlement;
pub use settlement::BidSettlementTask;

mod record_events;
pub use record_events::RecordEventsTask;
