use crate::core::ortb::request::BidRequest;

/// Produce the per-bidder working copy of an inbound request.
///
/// The copy is structurally disjoint from the original, adapters may
/// mutate it freely without racing the shared request or any other
/// bidder's copy. Currency is normalized while cloning: the request
/// level currency list and every imp floor currency are forced to the
/// configured default currency, so every outbound request declares a
/// single known currency regardless of what the publisher sent.
pub fn clone_for_bidder(req: &BidRequest, default_currency: &str) -> BidRequest {
    let mut cloned = req.clone();

    cloned.cur = vec![default_currency.to_string()];

    for imp in cloned.imp.iter_mut() {
        if imp.bidfloor > 0.0 || imp.bidfloorcur.is_some() {
            imp.bidfloorcur = Some(default_currency.to_string());
        }
    }

    cloned
}
