use crate::core::ortb::BidRequest;

/// Project `user.eids` down to sources on the allow list.
///
/// Runs once on the shared post-ingress request before per-bidder
/// cloning, the single sanctioned mutation of the inbound request.
/// Returns how many entries were removed.
pub fn filter_eids(req: &mut BidRequest, allowed_sources: &[String]) -> usize {
    let Some(user) = req.user.as_mut() else {
        return 0;
    };

    if user.eids.is_empty() {
        return 0;
    }

    let before = user.eids.len();
    user.eids
        .retain(|eid| allowed_sources.iter().any(|source| source == &eid.source));

    before - user.eids.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ortb::request::{BidRequestBuilder, Eid, Uid, User};

    fn request_with_eids(sources: &[&str]) -> BidRequest {
        let eids = sources
            .iter()
            .map(|source| Eid {
                source: source.to_string(),
                uids: vec![Uid {
                    id: "u1".to_string(),
                    ..Default::default()
                }],
                ..Default::default()
            })
            .collect();

        BidRequestBuilder::default()
            .id("r")
            .user(Some(User {
                eids,
                ..Default::default()
            }))
            .build()
            .unwrap()
    }

    #[test]
    fn test_disallowed_sources_removed() {
        let mut req = request_with_eids(&["liveramp.com", "blocked.com"]);

        let removed = filter_eids(&mut req, &["liveramp.com".to_string()]);

        assert_eq!(removed, 1);
        let eids = &req.user.as_ref().unwrap().eids;
        assert_eq!(eids.len(), 1);
        assert_eq!(eids[0].source, "liveramp.com");
    }

    #[test]
    fn test_empty_allow_list_removes_all() {
        let mut req = request_with_eids(&["a.com", "b.com"]);

        assert_eq!(filter_eids(&mut req, &[]), 2);
        assert!(req.user.as_ref().unwrap().eids.is_empty());
    }

    #[test]
    fn test_no_user_is_noop() {
        let mut req = BidRequestBuilder::default().id("r").build().unwrap();

        assert_eq!(filter_eids(&mut req, &["a.com".to_string()]), 0);
    }
}
