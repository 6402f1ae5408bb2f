use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Media types an adapter accepts for one platform
#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
#[serde(default)]
pub struct MediaTypes {
    pub banner: bool,
    pub video: bool,
    pub audio: bool,
    pub native: bool,
}

impl Default for MediaTypes {
    fn default() -> Self {
        Self {
            banner: true,
            video: true,
            audio: true,
            native: true,
        }
    }
}

/// Declared media support per request platform
#[derive(Debug, Clone, Default, Serialize, Deserialize, Builder)]
#[serde(default)]
pub struct PlatformMediaTypes {
    pub site: MediaTypes,
    pub app: MediaTypes,
}

/// Static description of one bidder integration.
///
/// Created once at process start for built-in bidders, or per
/// refresh snapshot for dynamic ones.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Builder)]
#[serde(default)]
#[builder(setter(into), default)]
pub struct AdapterSpec {
    /// Lowercase registry key for this bidder
    pub code: String,
    pub maintainer: String,
    #[builder(default = "true")]
    pub enabled: bool,
    pub media_types: PlatformMediaTypes,
    /// IAB TCF global vendor list id, when registered
    pub gvl_vendor_id: Option<u32>,
    /// Default bid endpoint
    pub endpoint: String,
    #[builder(default = "true")]
    pub gzip: bool,
    /// Whether the bidder accepts multiple imps per request, single
    /// imp bidders get one outbound call per imp
    #[builder(default = "true")]
    pub multi_imp: bool,
    /// Per adapter call budget, the worker caps each call at the
    /// min of this and the remaining auction deadline
    #[serde(with = "humantime_serde", default)]
    pub timeout: Option<Duration>,
}

impl AdapterSpec {
    /// Media support for the request platform, site rules apply
    /// when neither site nor app is present
    pub fn media_for_app(&self, is_app: bool) -> &MediaTypes {
        if is_app {
            &self.media_types.app
        } else {
            &self.media_types.site
        }
    }
}
