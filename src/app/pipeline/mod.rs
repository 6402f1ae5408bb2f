/// Pipeline for processing bid requests through an auction. Could
/// be prefixed with other inbound pipelines such as vast or prebid
/// to extend functionality
pub mod auction;
