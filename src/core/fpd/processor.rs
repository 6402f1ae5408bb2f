use crate::app::config::FpdConfig;
use crate::core::ortb::BidRequest;
use ahash::AHashMap;
use serde_json::{Map, Value};
use tracing::debug;

/// Per bidder bundle of first party data fragments, each destined
/// for the `data` subkey of the matching `ext` object on the
/// outgoing request clone. Computed per auction, discarded with it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedFpd {
    pub site: Option<Map<String, Value>>,
    pub app: Option<Map<String, Value>>,
    pub user: Option<Map<String, Value>>,
    /// Fragments keyed by imp id
    pub imp: AHashMap<String, Map<String, Value>>,
}

impl ResolvedFpd {
    pub fn is_empty(&self) -> bool {
        self.site.is_none() && self.app.is_none() && self.user.is_none() && self.imp.is_empty()
    }
}

/// Shallow object merge, overlay wins on key collision
fn merge_overlay(base: &mut Map<String, Value>, overlay: &Map<String, Value>) {
    for (key, value) in overlay {
        base.insert(key.clone(), value.clone());
    }
}

fn merge_optional(target: &mut Option<Map<String, Value>>, overlay: &Map<String, Value>) {
    match target {
        Some(base) => merge_overlay(base, overlay),
        None => *target = Some(overlay.clone()),
    }
}

/// Pull an object out of `ext.data` from an opaque ext blob
fn ext_data_object(ext: Option<&Value>) -> Option<&Map<String, Value>> {
    ext?.get("data")?.as_object()
}

fn prebid_section<'a>(req: &'a BidRequest, key: &str) -> Option<&'a Value> {
    req.ext.as_ref()?.get("prebid")?.get(key)
}

/// Computes the `bidder code -> ResolvedFpd` mapping for an auction.
///
/// Three passes, later passes win on key collision:
/// 1. base fragments from `site.ext.data`, `app.ext.data`,
///    `user.ext.data` and per imp `ext.data`
/// 2. global additions from `ext.prebid.data.{site,app,user}`
/// 3. per bidder overrides from `ext.prebid.bidderconfig[]`, applied
///    in declaration order, `"*"` matching every chosen bidder
pub fn resolve(
    req: &BidRequest,
    cfg: &FpdConfig,
    bidders: &[String],
) -> AHashMap<String, ResolvedFpd> {
    let mut base = ResolvedFpd::default();

    if cfg.site_enabled {
        if let Some(site) = req.site.as_ref() {
            if let Some(data) = ext_data_object(site.ext.as_ref()) {
                base.site = Some(data.clone());
            }

            if cfg.content_enabled {
                if let Some(content_data) = site
                    .content
                    .as_ref()
                    .and_then(|content| ext_data_object(content.ext.as_ref()))
                {
                    let fragment = base.site.get_or_insert_with(Map::new);
                    fragment.insert("content".to_string(), Value::Object(content_data.clone()));
                }
            }
        }

        if let Some(app) = req.app.as_ref() {
            if let Some(data) = ext_data_object(app.ext.as_ref()) {
                base.app = Some(data.clone());
            }

            if cfg.content_enabled {
                if let Some(content_data) = app
                    .content
                    .as_ref()
                    .and_then(|content| ext_data_object(content.ext.as_ref()))
                {
                    let fragment = base.app.get_or_insert_with(Map::new);
                    fragment.insert("content".to_string(), Value::Object(content_data.clone()));
                }
            }
        }
    }

    if cfg.user_enabled {
        if let Some(data) = req
            .user
            .as_ref()
            .and_then(|user| ext_data_object(user.ext.as_ref()))
        {
            base.user = Some(data.clone());
        }
    }

    if cfg.imp_enabled {
        for imp in &req.imp {
            if let Some(data) = ext_data_object(imp.ext.as_ref()) {
                base.imp.insert(imp.id.clone(), data.clone());
            }
        }
    }

    if cfg.global_enabled {
        if let Some(global) = prebid_section(req, "data") {
            for (key, target) in [
                ("site", &mut base.site),
                ("app", &mut base.app),
                ("user", &mut base.user),
            ] {
                if let Some(overlay) = global.get(key).and_then(Value::as_object) {
                    merge_optional(target, overlay);
                }
            }
        }
    }

    let mut resolved: AHashMap<String, ResolvedFpd> = bidders
        .iter()
        .map(|code| (code.clone(), base.clone()))
        .collect();

    if cfg.bidderconfig_enabled {
        apply_bidder_configs(req, bidders, &mut resolved);
    }

    resolved
}

/// `ext.prebid.bidderconfig[]` entries, in declaration order
fn apply_bidder_configs(
    req: &BidRequest,
    bidders: &[String],
    resolved: &mut AHashMap<String, ResolvedFpd>,
) {
    let Some(entries) = prebid_section(req, "bidderconfig").and_then(Value::as_array) else {
        return;
    };

    for entry in entries {
        let Some(targets) = entry.get("bidders").and_then(Value::as_array) else {
            debug!("bidderconfig entry without bidders list, skipping");
            continue;
        };

        let ortb2 = entry.get("config").and_then(|config| config.get("ortb2"));
        let Some(ortb2) = ortb2 else {
            continue;
        };

        let wildcard = targets.iter().any(|target| target.as_str() == Some("*"));

        for code in bidders {
            let matched = wildcard
                || targets
                    .iter()
                    .any(|target| target.as_str() == Some(code.as_str()));

            if !matched {
                continue;
            }

            let Some(fpd) = resolved.get_mut(code) else {
                continue;
            };

            for (key, target) in [
                ("site", &mut fpd.site),
                ("app", &mut fpd.app),
                ("user", &mut fpd.user),
            ] {
                if let Some(overlay) = ortb2.get(key).and_then(Value::as_object) {
                    merge_optional(target, overlay);
                }
            }
        }
    }
}

/// Write the `data` subkey of one ext blob, preserving sibling keys
fn write_ext_data(ext: &mut Option<Value>, fragment: &Map<String, Value>) {
    match ext {
        Some(Value::Object(existing)) => {
            existing.insert("data".to_string(), Value::Object(fragment.clone()));
        }
        _ => {
            let mut fresh = Map::new();
            fresh.insert("data".to_string(), Value::Object(fragment.clone()));
            *ext = Some(Value::Object(fresh));
        }
    }
}

/// Apply a bidder's resolved FPD onto its cloned request.
///
/// Only ever called on per-bidder clones, never the shared request.
/// Applying an empty bundle is a no-op.
pub fn apply(req: &mut BidRequest, fpd: &ResolvedFpd) {
    if let (Some(fragment), Some(site)) = (fpd.site.as_ref(), req.site.as_mut()) {
        write_ext_data(&mut site.ext, fragment);
    }

    if let (Some(fragment), Some(app)) = (fpd.app.as_ref(), req.app.as_mut()) {
        write_ext_data(&mut app.ext, fragment);
    }

    if let (Some(fragment), Some(user)) = (fpd.user.as_ref(), req.user.as_mut()) {
        write_ext_data(&mut user.ext, fragment);
    }

    for imp in req.imp.iter_mut() {
        if let Some(fragment) = fpd.imp.get(&imp.id) {
            write_ext_data(&mut imp.ext, fragment);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fpd_config() -> FpdConfig {
        FpdConfig {
            enabled: true,
            site_enabled: true,
            user_enabled: true,
            imp_enabled: true,
            global_enabled: true,
            bidderconfig_enabled: true,
            content_enabled: true,
            eids_enabled: true,
            eid_sources: Vec::new(),
        }
    }

    fn request(raw: serde_json::Value) -> BidRequest {
        serde_json::from_value(raw).unwrap()
    }

    fn bidders(codes: &[&str]) -> Vec<String> {
        codes.iter().map(|code| code.to_string()).collect()
    }

    #[test]
    fn test_base_extraction_per_category() {
        let req = request(json!({
            "id": "r",
            "imp": [{"id": "i1", "ext": {"data": {"pos": "atf"}, "gpid": "/1/slot"}}],
            "site": {"domain": "s.example", "ext": {"data": {"section": "sports"}}},
            "user": {"ext": {"data": {"segments": ["a"]}}}
        }));

        let resolved = resolve(&req, &fpd_config(), &bidders(&["acme"]));
        let fpd = &resolved["acme"];

        assert_eq!(fpd.site.as_ref().unwrap()["section"], "sports");
        assert_eq!(fpd.user.as_ref().unwrap()["segments"], json!(["a"]));
        assert_eq!(fpd.imp["i1"]["pos"], "atf");
        assert!(fpd.app.is_none());
    }

    #[test]
    fn test_disabled_categories_skipped() {
        let req = request(json!({
            "id": "r",
            "imp": [{"id": "i1", "ext": {"data": {"pos": "atf"}}}],
            "site": {"ext": {"data": {"section": "sports"}}}
        }));

        let mut cfg = fpd_config();
        cfg.site_enabled = false;
        cfg.imp_enabled = false;

        let resolved = resolve(&req, &cfg, &bidders(&["acme"]));

        assert!(resolved["acme"].is_empty());
    }

    #[test]
    fn test_global_overlay_wins_over_base() {
        let req = request(json!({
            "id": "r",
            "imp": [{"id": "i1"}],
            "site": {"ext": {"data": {"section": "sports", "keep": 1}}},
            "ext": {"prebid": {"data": {"site": {"section": "news"}}}}
        }));

        let resolved = resolve(&req, &fpd_config(), &bidders(&["acme"]));
        let site = resolved["acme"].site.as_ref().unwrap();

        assert_eq!(site["section"], "news");
        assert_eq!(site["keep"], 1);
    }

    #[test]
    fn test_bidderconfig_matches_literal_and_wildcard_in_order() {
        let req = request(json!({
            "id": "r",
            "imp": [{"id": "i1"}],
            "ext": {"prebid": {"bidderconfig": [
                {"bidders": ["*"], "config": {"ortb2": {"user": {"tier": "any"}}}},
                {"bidders": ["acme"], "config": {"ortb2": {"user": {"tier": "vip"}}}}
            ]}}
        }));

        let resolved = resolve(&req, &fpd_config(), &bidders(&["acme", "other"]));

        assert_eq!(resolved["acme"].user.as_ref().unwrap()["tier"], "vip");
        assert_eq!(resolved["other"].user.as_ref().unwrap()["tier"], "any");
    }

    #[test]
    fn test_content_data_nested_under_site_fragment() {
        let req = request(json!({
            "id": "r",
            "imp": [{"id": "i1"}],
            "site": {
                "content": {"ext": {"data": {"genre": "drama"}}},
                "ext": {"data": {"section": "tv"}}
            }
        }));

        let resolved = resolve(&req, &fpd_config(), &bidders(&["acme"]));
        let site = resolved["acme"].site.as_ref().unwrap();

        assert_eq!(site["content"]["genre"], "drama");
        assert_eq!(site["section"], "tv");
    }

    #[test]
    fn test_apply_preserves_sibling_ext_keys() {
        let mut req = request(json!({
            "id": "r",
            "imp": [{"id": "i1", "ext": {"gpid": "/1/slot"}}],
            "site": {"domain": "s.example", "ext": {"amp": 1}}
        }));

        let mut fpd = ResolvedFpd::default();
        let mut site_fragment = Map::new();
        site_fragment.insert("section".to_string(), json!("sports"));
        fpd.site = Some(site_fragment);

        let mut imp_fragment = Map::new();
        imp_fragment.insert("pos".to_string(), json!("btf"));
        fpd.imp.insert("i1".to_string(), imp_fragment);

        apply(&mut req, &fpd);

        let site_ext = req.site.as_ref().unwrap().ext.as_ref().unwrap();
        assert_eq!(site_ext["amp"], 1);
        assert_eq!(site_ext["data"]["section"], "sports");

        let imp_ext = req.imp[0].ext.as_ref().unwrap();
        assert_eq!(imp_ext["gpid"], "/1/slot");
        assert_eq!(imp_ext["data"]["pos"], "btf");
    }

    #[test]
    fn test_apply_empty_bundle_is_noop() {
        let mut req = request(json!({
            "id": "r",
            "imp": [{"id": "i1"}],
            "site": {"domain": "s.example"}
        }));

        let before = req.clone();
        apply(&mut req, &ResolvedFpd::default());

        assert_eq!(req, before);
    }
}
