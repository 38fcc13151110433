// tests/common/mod.rs
// Shared helpers for pipeline tests: a scripted fetcher with an optional gate
// that holds each request "on the wire" until the test releases it.
#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Semaphore};

use ratings_enricher::fetch::{Candidate, FetchOutcome, Pacer, PauseProbe, RemoteFetcher};
use ratings_enricher::locator::NoAttributes;
use ratings_enricher::Locator;

pub fn candidate(id: &str, rating: f32) -> Candidate {
    Candidate {
        id: id.to_string(),
        title: format!("Book {id}"),
        full_title: format!("Book {id}"),
        is_truncated: false,
        rating,
        rating_count: 1_000,
        review_count: 100,
        category: "-".to_string(),
        year: None,
        on_shelf: false,
        award: None,
        external_url: format!("https://example.test/book/isbn/{id}"),
    }
}

pub fn loc(id: &str) -> Locator {
    Locator::with_id(id, Arc::new(NoAttributes))
}

pub fn loc_with_price(id: &str, price: &str) -> Locator {
    let mut attrs = HashMap::new();
    attrs.insert("price".to_string(), price.to_string());
    Locator::with_id(id, Arc::new(attrs))
}

/// Lets a test observe request starts and decide when each one finishes.
pub struct Gate {
    started: mpsc::UnboundedReceiver<String>,
    permits: Arc<Semaphore>,
}

impl Gate {
    pub async fn next_started(&mut self) -> String {
        self.started.recv().await.expect("fetcher dropped")
    }

    pub fn release(&self, n: usize) {
        self.permits.add_permits(n);
    }
}

/// id -> Some(rating) is found, None (or unknown id) is not found.
pub struct ScriptedFetcher {
    ratings: HashMap<String, Option<f32>>,
    failing: HashSet<String>,
    pacer: Pacer,
    calls: Mutex<Vec<String>>,
    gate: Option<(mpsc::UnboundedSender<String>, Arc<Semaphore>)>,
}

impl ScriptedFetcher {
    pub fn new(script: &[(&str, Option<f32>)]) -> Self {
        Self {
            ratings: script
                .iter()
                .map(|(id, r)| (id.to_string(), *r))
                .collect(),
            failing: HashSet::new(),
            pacer: Pacer::from_millis(0),
            calls: Mutex::new(vec![]),
            gate: None,
        }
    }

    pub fn failing(mut self, id: &str) -> Self {
        self.failing.insert(id.to_string());
        self
    }

    pub fn with_delay_ms(mut self, ms: u64) -> Self {
        self.pacer = Pacer::from_millis(ms);
        self
    }

    pub fn gated(mut self) -> (Self, Gate) {
        let (tx, rx) = mpsc::unbounded_channel();
        let permits = Arc::new(Semaphore::new(0));
        self.gate = Some((tx, permits.clone()));
        (
            self,
            Gate {
                started: rx,
                permits,
            },
        )
    }

    /// Ids for which a request actually went out, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteFetcher for ScriptedFetcher {
    async fn fetch(&self, id: &str, pause: &PauseProbe) -> Result<FetchOutcome> {
        if !self.pacer.admit(pause).await {
            return Ok(FetchOutcome::Deferred);
        }
        self.calls.lock().unwrap().push(id.to_string());

        if let Some((started, permits)) = &self.gate {
            let _ = started.send(id.to_string());
            permits.acquire().await?.forget();
        }
        if self.failing.contains(id) {
            anyhow::bail!("connection reset while fetching {id}");
        }
        Ok(match self.ratings.get(id) {
            Some(Some(r)) => FetchOutcome::Found(candidate(id, *r)),
            _ => FetchOutcome::NotFound,
        })
    }

    fn name(&self) -> &'static str {
        "Scripted"
    }
}
