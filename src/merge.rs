// src/merge.rs
//! Merging remote candidates with local attributes into the sorted result set.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::fetch::Candidate;
use crate::locator::Locator;
use crate::text::find_price;

pub const PRICE_ATTR: &str = "price";
/// Where the price lives on the alternate listing layout.
pub const PRICE_ALT_ATTR: &str = "price_alt";
pub const PRICE_SENTINEL: &str = "N/A";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedRecord {
    pub id: String,
    pub title: String,
    pub full_title: String,
    pub is_truncated: bool,
    pub rating: f32,
    pub rating_count: u64,
    pub review_count: u64,
    pub category: String,
    pub year: Option<i32>,
    pub on_shelf: bool,
    pub award: Option<String>,
    pub price: String,
    pub external_url: String,
}

impl EnrichedRecord {
    pub fn from_candidate(c: Candidate, price: String) -> Self {
        Self {
            id: c.id,
            title: c.title,
            full_title: c.full_title,
            is_truncated: c.is_truncated,
            rating: c.rating,
            rating_count: c.rating_count,
            review_count: c.review_count,
            category: c.category,
            year: c.year,
            on_shelf: c.on_shelf,
            award: c.award,
            price,
            external_url: c.external_url,
        }
    }
}

/// Price through the fallback chain: primary layout, alternate layout, then `"N/A"`.
pub fn resolve_price(locator: &Locator) -> String {
    [PRICE_ATTR, PRICE_ALT_ATTR]
        .iter()
        .find_map(|name| {
            locator
                .read_local_attribute(name)
                .and_then(|raw| find_price(&raw))
        })
        .unwrap_or_else(|| PRICE_SENTINEL.to_string())
}

/// Accumulated records plus the set of ids already settled (merged or confirmed absent).
/// Records stay sorted by rating, highest first; equal ratings keep arrival order.
#[derive(Debug, Default)]
pub struct ResultSet {
    records: Vec<EnrichedRecord>,
    seen: HashSet<String>,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_settled(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    /// Remember an id the remote side has no record for. Returns false if already settled.
    pub fn mark_absent(&mut self, id: &str) -> bool {
        self.seen.insert(id.to_string())
    }

    /// Add the candidate unless its id is already settled; re-sorts the whole set.
    /// Returns whether a record was added.
    pub fn merge(&mut self, candidate: Candidate, locator: &Locator) -> bool {
        if !self.seen.insert(candidate.id.clone()) {
            return false;
        }
        let price = resolve_price(locator);
        self.records.push(EnrichedRecord::from_candidate(candidate, price));
        // stable sort: ties keep insertion order
        self.records.sort_by(|a, b| b.rating.total_cmp(&a.rating));
        true
    }

    pub fn records(&self) -> &[EnrichedRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
