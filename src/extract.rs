// src/extract.rs
//! Listing-page scanner: finds item links per section and captures the local
//! attributes (price) each locator may later be asked for.

use once_cell::sync::OnceCell;
use scraper::{ElementRef, Html, Selector};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::locator::{LocalAttributes, Locator};
use crate::merge::{PRICE_ALT_ATTR, PRICE_ATTR};
use crate::text::normalize_text;

struct PageSelectors {
    section: Selector,
    face: Selector,
    link: Selector,
    price: Selector,
    price_alt: Selector,
}

fn selectors() -> &'static PageSelectors {
    static SEL: OnceCell<PageSelectors> = OnceCell::new();
    SEL.get_or_init(|| {
        let s = |css: &str| Selector::parse(css).expect("listing selector");
        PageSelectors {
            section: s(r#"div[data-testid="asin-faceout-shoveler.card-cont"]"#),
            face: s(r#"div[data-testid="asin-face"]"#),
            link: s("a[href]"),
            price: s(r#"[data-testid="price"], .a-price .a-offscreen"#),
            price_alt: s(r#".a-color-price, [data-a-color="price"]"#),
        }
    })
}

/// Attributes captured from one item face at scan time.
#[derive(Debug, Clone, Default)]
pub struct FaceAttributes {
    values: HashMap<String, String>,
}

impl FaceAttributes {
    fn capture(face: ElementRef<'_>) -> Self {
        let sel = selectors();
        let mut values = HashMap::new();
        for (name, selector) in [(PRICE_ATTR, &sel.price), (PRICE_ALT_ATTR, &sel.price_alt)] {
            if let Some(text) = face
                .select(selector)
                .map(|el| normalize_text(&el.text().collect::<String>()))
                .find(|t| !t.is_empty())
            {
                values.insert(name.to_string(), text);
            }
        }
        Self { values }
    }
}

impl LocalAttributes for FaceAttributes {
    fn read(&self, name: &str) -> Option<String> {
        self.values.get(name).cloned()
    }
}

/// Locators under `root`, in document order, deduplicated by href.
/// Links without a recognisable id are dropped.
fn locators_in(root: ElementRef<'_>) -> Vec<Locator> {
    let sel = selectors();
    let mut seen_hrefs = HashSet::new();
    let mut out = Vec::new();
    for face in root.select(&sel.face) {
        let Some(href) = face
            .select(&sel.link)
            .next()
            .and_then(|a| a.value().attr("href"))
        else {
            continue;
        };
        if !seen_hrefs.insert(href.to_string()) {
            continue;
        }
        let attrs: Arc<dyn LocalAttributes> = Arc::new(FaceAttributes::capture(face));
        if let Some(loc) = Locator::from_href(href, attrs) {
            out.push(loc);
        }
    }
    out
}

/// Locators in one container fragment (a single section).
pub fn extract_locators(container_html: &str) -> Vec<Locator> {
    let doc = Html::parse_fragment(container_html);
    locators_in(doc.root_element())
}

/// One locator batch per listing section; the whole page counts as one
/// section when no section markup is present. Empty batches are omitted.
pub fn extract_sections(page_html: &str) -> Vec<Vec<Locator>> {
    let doc = Html::parse_document(page_html);
    let sections: Vec<ElementRef<'_>> = doc.select(&selectors().section).collect();
    let batches: Vec<Vec<Locator>> = if sections.is_empty() {
        vec![locators_in(doc.root_element())]
    } else {
        sections.into_iter().map(locators_in).collect()
    };
    let batches: Vec<Vec<Locator>> = batches.into_iter().filter(|b| !b.is_empty()).collect();
    tracing::debug!(
        target: "enrich",
        sections = batches.len(),
        locators = batches.iter().map(Vec::len).sum::<usize>(),
        "scanned listing page"
    );
    batches
}
