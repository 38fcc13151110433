// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod config;
pub mod extract;
pub mod fetch;
pub mod locator;
pub mod merge;
pub mod metrics;
pub mod pipeline;
pub mod present;
pub mod sink;
pub mod text;

// ---- Re-exports for stable public API ----
pub use crate::config::EnrichConfig;
pub use crate::fetch::{FetchOutcome, GoodreadsFetcher, PauseProbe, RemoteFetcher};
pub use crate::locator::{LocalAttributes, Locator};
pub use crate::merge::EnrichedRecord;
pub use crate::pipeline::{spawn_control, Pipeline, PipelineState};
pub use crate::sink::{ControlCommand, Progress, RenderSink, RenderSnapshot, Status};
