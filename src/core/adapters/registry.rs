use crate::core::adapters::adapter::Adapter;
use crate::core::adapters::ortb_adapter::OrtbAdapter;
use crate::core::adapters::spec::AdapterSpec;
use ahash::AHashMap;
use anyhow::bail;
use std::sync::Arc;
use tracing::info;

/// Maps bidder codes to their built-in adapter and static
/// metadata. Populated once at startup and read-only after.
///
/// # Behavior
/// Codes are lowercased on registration and lookup. Listing is
/// sorted by code so bidder enumeration is deterministic across
/// runs on equal inputs.
pub struct BidderRegistry {
    adapters: Vec<(Arc<dyn Adapter>, AdapterSpec)>,
    index: AHashMap<String, usize>,
}

impl BidderRegistry {
    pub fn new(specs: &[AdapterSpec]) -> Result<Self, anyhow::Error> {
        let mut sorted: Vec<AdapterSpec> = specs.to_vec();
        sorted.sort_by(|a, b| a.code.cmp(&b.code));

        let mut adapters: Vec<(Arc<dyn Adapter>, AdapterSpec)> = Vec::with_capacity(sorted.len());
        let mut index = AHashMap::with_capacity(sorted.len());

        for mut spec in sorted {
            spec.code = spec.code.to_lowercase();

            if spec.code.is_empty() {
                bail!("Bidder spec with empty code");
            }

            if spec.endpoint.is_empty() {
                bail!("Bidder {} has no endpoint", spec.code);
            }

            url::Url::parse(&spec.endpoint)
                .map_err(|e| anyhow::anyhow!("Bidder {} endpoint invalid: {}", spec.code, e))?;

            if index.contains_key(&spec.code) {
                bail!("Duplicate bidder code {}", spec.code);
            }

            let adapter: Arc<dyn Adapter> = Arc::new(OrtbAdapter::from_spec(&spec));

            index.insert(spec.code.clone(), adapters.len());
            adapters.push((adapter, spec));
        }

        info!("Registered {} static bidders", adapters.len());

        Ok(BidderRegistry { adapters, index })
    }

    pub fn adapter(&self, code: &str) -> Option<(Arc<dyn Adapter>, &AdapterSpec)> {
        self.index
            .get(&code.to_lowercase())
            .map(|idx| (self.adapters[*idx].0.clone(), &self.adapters[*idx].1))
    }

    /// Enabled bidder codes in stable sorted order
    pub fn enabled_codes(&self) -> Vec<String> {
        self.adapters
            .iter()
            .filter(|(_, spec)| spec.enabled)
            .map(|(_, spec)| spec.code.clone())
            .collect()
    }
}
