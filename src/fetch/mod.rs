// src/fetch/mod.rs
pub mod goodreads;
pub mod pacer;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub use goodreads::GoodreadsFetcher;
pub use pacer::Pacer;

/// Remote fields for one id, before the local price is merged in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
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
    pub external_url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Found(Candidate),
    /// The page had no title or no rating.
    NotFound,
    /// Paused while waiting for the pacer; no request was sent.
    Deferred,
}

/// Shared view of the pipeline's pause flag, checked by fetchers after pacing.
#[derive(Debug, Clone, Default)]
pub struct PauseProbe(Arc<AtomicBool>);

impl PauseProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_paused(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn set_paused(&self, paused: bool) {
        self.0.store(paused, Ordering::SeqCst);
    }
}

/// One paced request per id. Network failures are `Err`; the queue treats them
/// as "no record" and moves on.
#[async_trait::async_trait]
pub trait RemoteFetcher: Send + Sync {
    async fn fetch(&self, id: &str, pause: &PauseProbe) -> Result<FetchOutcome>;
    fn name(&self) -> &'static str;
}
