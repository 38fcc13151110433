// src/fetch/goodreads.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::{counter, histogram};
use once_cell::sync::OnceCell;
use reqwest::StatusCode;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use super::{Candidate, FetchOutcome, Pacer, PauseProbe, RemoteFetcher};
use crate::config::EnrichConfig;
use crate::text::{first_year, normalize_text, parse_count, truncate_title};

const DEFAULT_CATEGORY: &str = "-";

pub struct GoodreadsFetcher {
    mode: Mode,
    base_url: String,
    title_max_chars: usize,
    pacer: Pacer,
}

enum Mode {
    /// id -> book page HTML, served without touching the network.
    Fixture(HashMap<String, String>),
    Http { client: reqwest::Client },
}

struct BookSelectors {
    title: Selector,
    rating: Selector,
    ratings_count: Selector,
    reviews_count: Selector,
    genre: Selector,
    publication: Selector,
    shelved: Selector,
    detail_term: Selector,
}

fn selectors() -> &'static BookSelectors {
    static SEL: OnceCell<BookSelectors> = OnceCell::new();
    SEL.get_or_init(|| {
        let s = |css: &str| Selector::parse(css).expect("book page selector");
        BookSelectors {
            title: s(r#"h1[data-testid="bookTitle"]"#),
            rating: s(".RatingStatistics__rating"),
            ratings_count: s(r#"[data-testid="ratingsCount"]"#),
            reviews_count: s(r#"[data-testid="reviewsCount"]"#),
            genre: s(".BookPageMetadataSection__genreButton a"),
            publication: s(r#"[data-testid="publicationInfo"]"#),
            shelved: s(r#"button[aria-label^="Shelved"]"#),
            detail_term: s("dt"),
        }
    })
}

fn element_text(el: ElementRef<'_>) -> String {
    normalize_text(&el.text().collect::<String>())
}

fn first_text(doc: &Html, sel: &Selector) -> Option<String> {
    doc.select(sel)
        .next()
        .map(element_text)
        .filter(|t| !t.is_empty())
}

/// Value of the `<dd>` following a `<dt>` labelled `label` (case-insensitive).
fn detail_value(doc: &Html, label: &str) -> Option<String> {
    let term = doc
        .select(&selectors().detail_term)
        .find(|dt| element_text(*dt).eq_ignore_ascii_case(label))?;
    term.next_siblings()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "dd")
        .map(element_text)
        .filter(|t| !t.is_empty())
}

impl GoodreadsFetcher {
    pub fn from_config(cfg: &EnrichConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(cfg.user_agent.clone())
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .build()
            .context("building http client")?;
        Ok(Self::with_mode(Mode::Http { client }, cfg))
    }

    pub fn from_fixtures(pages: HashMap<String, String>, cfg: &EnrichConfig) -> Self {
        Self::with_mode(Mode::Fixture(pages), cfg)
    }

    /// Fixture pages from a directory of `{id}.html` files.
    pub fn from_fixture_dir(dir: &Path, cfg: &EnrichConfig) -> Result<Self> {
        let mut pages = HashMap::new();
        let entries = std::fs::read_dir(dir)
            .with_context(|| format!("reading fixture dir {}", dir.display()))?;
        for e in entries.flatten() {
            let path = e.path();
            if path.extension().and_then(|s| s.to_str()) != Some("html") {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let html = std::fs::read_to_string(&path)
                .with_context(|| format!("reading fixture {}", path.display()))?;
            pages.insert(id.to_string(), html);
        }
        tracing::debug!(target: "enrich", pages = pages.len(), dir = %dir.display(), "fixtures loaded");
        Ok(Self::from_fixtures(pages, cfg))
    }

    fn with_mode(mode: Mode, cfg: &EnrichConfig) -> Self {
        Self {
            mode,
            base_url: cfg.base_url.clone(),
            title_max_chars: cfg.title_max_chars,
            pacer: Pacer::from_millis(cfg.request_delay_ms),
        }
    }

    pub fn book_url(&self, id: &str) -> String {
        format!("{}/book/isbn/{}", self.base_url, id)
    }

    /// Best-effort extraction from a book page. `None` when the title or the
    /// rating is missing; every other field falls back to a default.
    pub fn parse_book_page(
        id: &str,
        html: &str,
        title_max_chars: usize,
        external_url: String,
    ) -> Option<Candidate> {
        let t0 = std::time::Instant::now();
        let doc = Html::parse_document(html);
        let sel = selectors();

        let full_title = first_text(&doc, &sel.title)?;
        let rating = first_text(&doc, &sel.rating)?
            .replace(',', ".")
            .parse::<f32>()
            .ok()
            .filter(|r| r.is_finite())?;

        let rating_count = first_text(&doc, &sel.ratings_count)
            .map(|t| parse_count(&t))
            .unwrap_or(0);
        let review_count = first_text(&doc, &sel.reviews_count)
            .map(|t| parse_count(&t))
            .unwrap_or(0);
        let category =
            first_text(&doc, &sel.genre).unwrap_or_else(|| DEFAULT_CATEGORY.to_string());
        let year = first_text(&doc, &sel.publication).and_then(|t| first_year(&t));
        let on_shelf = doc.select(&sel.shelved).next().is_some();
        let award = detail_value(&doc, "Literary awards");

        let (title, is_truncated) = truncate_title(&full_title, title_max_chars);

        histogram!("enrich_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

        Some(Candidate {
            id: id.to_string(),
            title,
            full_title,
            is_truncated,
            rating,
            rating_count,
            review_count,
            category,
            year,
            on_shelf,
            award,
            external_url,
        })
    }

    fn outcome_from_body(&self, id: &str, body: &str) -> FetchOutcome {
        match Self::parse_book_page(id, body, self.title_max_chars, self.book_url(id)) {
            Some(c) => {
                tracing::debug!(target: "enrich", id, title = %c.title, rating = c.rating, "parsed book page");
                FetchOutcome::Found(c)
            }
            None => {
                tracing::info!(target: "enrich", id, "no results found");
                FetchOutcome::NotFound
            }
        }
    }
}

#[async_trait]
impl RemoteFetcher for GoodreadsFetcher {
    async fn fetch(&self, id: &str, pause: &PauseProbe) -> Result<FetchOutcome> {
        if !self.pacer.admit(pause).await {
            tracing::debug!(target: "enrich", id, "paused during pacing delay");
            return Ok(FetchOutcome::Deferred);
        }
        counter!("enrich_requests_total").increment(1);

        match &self.mode {
            Mode::Fixture(pages) => Ok(match pages.get(id) {
                Some(body) => self.outcome_from_body(id, body),
                None => FetchOutcome::NotFound,
            }),

            Mode::Http { client } => {
                let url = self.book_url(id);
                tracing::info!(target: "enrich", id, %url, "fetching book page");
                let t0 = std::time::Instant::now();
                let resp = client
                    .get(&url)
                    .send()
                    .await
                    .with_context(|| format!("GET {url}"))?;
                let status = resp.status();
                if status == StatusCode::NOT_FOUND {
                    return Ok(FetchOutcome::NotFound);
                }
                let resp = resp
                    .error_for_status()
                    .with_context(|| format!("GET {url} returned {status}"))?;
                let body = resp.text().await.context("book page .text()")?;
                histogram!("enrich_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
                Ok(self.outcome_from_body(id, &body))
            }
        }
    }

    fn name(&self) -> &'static str {
        "Goodreads"
    }
}
