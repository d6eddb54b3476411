//! Bootstrap compliance tracking.
//!
//! At session start the model is expected to fetch the working
//! context, list the most recent entries at the mandated page size,
//! and download every required asset. The tracker records which of
//! those duties have been observed; flags only ever move from unmet
//! to met.

use std::collections::BTreeSet;

/// Records which bootstrap duties the model has discharged.
#[derive(Debug, Clone)]
pub struct BootstrapTracker {
    context_fetched: bool,
    entries_listed: bool,
    required_assets: BTreeSet<String>,
    fetched_assets: BTreeSet<String>,
}

impl BootstrapTracker {
    pub fn new(required_assets: impl IntoIterator<Item = String>) -> Self {
        Self {
            context_fetched: false,
            entries_listed: false,
            required_assets: required_assets.into_iter().collect(),
            fetched_assets: BTreeSet::new(),
        }
    }

    pub fn record_context_fetch(&mut self) {
        self.context_fetched = true;
    }

    pub fn record_entry_listing(&mut self) {
        self.entries_listed = true;
    }

    pub fn record_asset(&mut self, asset_id: &str) {
        self.fetched_assets.insert(asset_id.to_string());
    }

    pub fn context_fetched(&self) -> bool {
        self.context_fetched
    }

    pub fn entries_listed(&self) -> bool {
        self.entries_listed
    }

    /// True once every required asset has been downloaded at least once.
    pub fn assets_complete(&self) -> bool {
        self.required_assets
            .iter()
            .all(|id| self.fetched_assets.contains(id))
    }

    /// Required assets not yet downloaded, in stable order.
    pub fn missing_assets(&self) -> Vec<&str> {
        self.required_assets
            .iter()
            .filter(|id| !self.fetched_assets.contains(*id))
            .map(String::as_str)
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.context_fetched && self.entries_listed && self.assets_complete()
    }
}
