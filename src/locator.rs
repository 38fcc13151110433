// src/locator.rs
//! Locators: one discovered listing item plus a way to read its on-page attributes.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use regex::Regex;

/// Capability to read attributes that sit next to an item on the listing page
/// (price and friends). A miss is `None`, never an error.
pub trait LocalAttributes: Send + Sync {
    fn read(&self, name: &str) -> Option<String>;
}

/// Every read misses.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAttributes;

impl LocalAttributes for NoAttributes {
    fn read(&self, _name: &str) -> Option<String> {
        None
    }
}

impl LocalAttributes for HashMap<String, String> {
    fn read(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

/// Pull the 10-character product id out of a URL-like string,
/// e.g. `B0C1234567` from `/Some-Title/dp/B0C1234567/ref=sr_1`.
pub fn extract_id(href: &str) -> Option<&str> {
    static RE_ID: OnceCell<Regex> = OnceCell::new();
    let re = RE_ID.get_or_init(|| Regex::new(r"/([A-Z0-9]{10})(?:/|\?|$)").expect("id regex"));
    re.captures(href).and_then(|c| c.get(1)).map(|m| m.as_str())
}

/// Reference to one discovered item. Cheap to clone; never mutated once built.
#[derive(Clone)]
pub struct Locator {
    id: String,
    href: String,
    attrs: Arc<dyn LocalAttributes>,
}

impl Locator {
    /// Build a locator from a link target. Returns `None` when no id can be matched,
    /// which is how malformed links are silently dropped.
    pub fn from_href(href: &str, attrs: Arc<dyn LocalAttributes>) -> Option<Self> {
        let id = extract_id(href)?;
        Some(Self {
            id: id.to_string(),
            href: href.to_string(),
            attrs,
        })
    }

    /// Locator for a known id with no page link behind it.
    pub fn with_id(id: impl Into<String>, attrs: Arc<dyn LocalAttributes>) -> Self {
        let id = id.into();
        Self {
            href: format!("/dp/{id}"),
            id,
            attrs,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn href(&self) -> &str {
        &self.href
    }

    pub fn read_local_attribute(&self, name: &str) -> Option<String> {
        self.attrs.read(name)
    }
}

impl fmt::Debug for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Locator")
            .field("id", &self.id)
            .field("href", &self.href)
            .finish_non_exhaustive()
    }
}
