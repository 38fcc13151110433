// src/pipeline.rs
//! # Enrichment queue
//! Owns the pending locators, the settled-id set, the cursor and the pause flag,
//! and drives fetch + merge one locator at a time.
//!
//! Exactly one dispatch loop runs at a time. `enqueue` calls arriving while it
//! runs only append; the running loop picks their items up. Pausing is
//! cooperative: a fetch already on the wire completes and is merged, nothing
//! new is dispatched until `resume`.

use metrics::{counter, gauge};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::fetch::{FetchOutcome, PauseProbe, RemoteFetcher};
use crate::locator::Locator;
use crate::merge::{EnrichedRecord, ResultSet};
use crate::metrics::ensure_metrics_described;
use crate::sink::{ControlCommand, Progress, RenderSink, RenderSnapshot, Status};

/// `Idle → Running ⇄ Paused`, `Running → Draining → Done`; a later enqueue reopens `Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PipelineState {
    Idle,
    Running,
    Paused,
    /// The last pending locator is in flight.
    Draining,
    Done,
}

impl PipelineState {
    pub fn status(self) -> Status {
        match self {
            PipelineState::Idle => Status::Idle,
            PipelineState::Running | PipelineState::Draining => Status::Loading,
            PipelineState::Paused => Status::Paused,
            PipelineState::Done => Status::Done,
        }
    }

    fn dispatching(self) -> bool {
        matches!(self, PipelineState::Running | PipelineState::Draining)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Activity {
    state: PipelineState,
    looping: bool,
    /// Cursor has reached the end of the pending list.
    drained: bool,
}

struct Shared {
    pending: Vec<Locator>,
    /// Ids at or after the cursor.
    undispatched: HashSet<String>,
    cursor: usize,
    results: ResultSet,
    state: PipelineState,
    looping: bool,
}

impl Shared {
    fn progress(&self) -> Progress {
        Progress {
            done: self.cursor,
            total: self.pending.len(),
        }
    }

    fn has_work(&self) -> bool {
        self.cursor < self.pending.len()
    }

    fn snapshot(&self) -> RenderSnapshot {
        RenderSnapshot {
            records: self.results.records().to_vec(),
            status: self.state.status(),
            progress: self.progress(),
            rendered_at: chrono::Utc::now(),
        }
    }

    fn advance(&mut self) {
        if let Some(loc) = self.pending.get(self.cursor) {
            self.undispatched.remove(loc.id());
        }
        self.cursor += 1;
        gauge!("enrich_pending").set((self.pending.len() - self.cursor) as f64);
    }
}

struct Inner {
    fetcher: Arc<dyn RemoteFetcher>,
    sink: Arc<dyn RenderSink>,
    pause: PauseProbe,
    shared: Mutex<Shared>,
    activity: watch::Sender<Activity>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().expect("pipeline mutex poisoned")
    }

    fn publish(&self, s: &Shared) {
        self.activity.send_replace(Activity {
            state: s.state,
            looping: s.looping,
            drained: !s.has_work(),
        });
    }

    fn transition(&self, s: &mut Shared, to: PipelineState) {
        if s.state != to {
            tracing::debug!(target: "enrich", from = ?s.state, ?to, "state transition");
            s.state = to;
        }
        self.pause.set_paused(to == PipelineState::Paused);
        self.publish(s);
    }

    /// Ends the loop once every pending locator has been handled.
    fn settle_if_drained(&self, s: &mut Shared) -> bool {
        if s.has_work() {
            return false;
        }
        s.looping = false;
        self.transition(s, PipelineState::Done);
        tracing::info!(
            target: "enrich",
            total = s.pending.len(),
            records = s.results.len(),
            "all locators processed"
        );
        true
    }
}

enum Step {
    Dispatch(Locator),
    Skipped(RenderSnapshot),
    Stop(RenderSnapshot),
}

/// Handle to one enrichment session. Clones share the same queue.
#[derive(Clone)]
pub struct Pipeline {
    inner: Arc<Inner>,
}

impl Pipeline {
    pub fn new(fetcher: Arc<dyn RemoteFetcher>, sink: Arc<dyn RenderSink>) -> Self {
        ensure_metrics_described();
        let (activity, _) = watch::channel(Activity {
            state: PipelineState::Idle,
            looping: false,
            drained: true,
        });
        Self {
            inner: Arc::new(Inner {
                fetcher,
                sink,
                pause: PauseProbe::new(),
                shared: Mutex::new(Shared {
                    pending: Vec::new(),
                    undispatched: HashSet::new(),
                    cursor: 0,
                    results: ResultSet::new(),
                    state: PipelineState::Idle,
                    looping: false,
                }),
                activity,
            }),
        }
    }

    /// Append locators whose ids are neither settled nor already waiting, and start
    /// the dispatch loop if none is running and the session is not paused.
    /// Returns the number of locators appended; never waits for processing.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn enqueue(&self, locators: impl IntoIterator<Item = Locator>) -> usize {
        let (added, start, frame) = {
            let mut s = self.inner.lock();
            let mut added = 0usize;
            for loc in locators {
                if s.results.is_settled(loc.id()) || !s.undispatched.insert(loc.id().to_string())
                {
                    continue;
                }
                s.pending.push(loc);
                added += 1;
            }

            let start = s.has_work() && !s.looping && s.state != PipelineState::Paused;
            if start {
                s.looping = true;
                self.inner.transition(&mut s, PipelineState::Running);
            } else if added > 0 && s.state == PipelineState::Draining {
                self.inner.transition(&mut s, PipelineState::Running);
            }
            gauge!("enrich_pending").set((s.pending.len() - s.cursor) as f64);
            self.inner.publish(&s);
            (added, start, s.snapshot())
        };

        counter!("enrich_enqueued_total").increment(added as u64);
        tracing::info!(
            target: "enrich",
            added,
            total = frame.progress.total,
            started = start,
            "enqueued locators"
        );
        self.inner.sink.render(&frame);
        if start {
            self.spawn_loop();
        }
        added
    }

    /// Stop dispatching after the current locator. Returns false if nothing was running.
    pub fn pause(&self) -> bool {
        let frame = {
            let mut s = self.inner.lock();
            if !s.state.dispatching() {
                return false;
            }
            self.inner.transition(&mut s, PipelineState::Paused);
            s.snapshot()
        };
        tracing::info!(target: "enrich", done = frame.progress.done, total = frame.progress.total, "processing paused");
        self.inner.sink.render(&frame);
        true
    }

    /// Continue from the cursor. Returns false if the session was not paused.
    pub fn resume(&self) -> bool {
        let (start, frame) = {
            let mut s = self.inner.lock();
            if s.state != PipelineState::Paused {
                return false;
            }
            let start = !s.looping && s.has_work();
            if start {
                s.looping = true;
            }
            // A loop still finishing its in-flight locator simply carries on.
            let next = if s.looping {
                PipelineState::Running
            } else {
                PipelineState::Done
            };
            self.inner.transition(&mut s, next);
            (start, s.snapshot())
        };
        tracing::info!(target: "enrich", restarted = start, "processing resumed");
        self.inner.sink.render(&frame);
        if start {
            self.spawn_loop();
        }
        true
    }

    /// Pause when dispatching, resume when paused, otherwise nothing.
    pub fn toggle(&self) -> bool {
        match self.state() {
            PipelineState::Running | PipelineState::Draining => self.pause(),
            PipelineState::Paused => self.resume(),
            PipelineState::Idle | PipelineState::Done => false,
        }
    }

    pub fn apply(&self, cmd: ControlCommand) -> bool {
        match cmd {
            ControlCommand::Toggle => self.toggle(),
            ControlCommand::Pause => self.pause(),
            ControlCommand::Resume => self.resume(),
        }
    }

    pub fn state(&self) -> PipelineState {
        self.inner.lock().state
    }

    pub fn progress(&self) -> Progress {
        self.inner.lock().progress()
    }

    pub fn records(&self) -> Vec<EnrichedRecord> {
        self.inner.lock().results.records().to_vec()
    }

    pub fn snapshot(&self) -> RenderSnapshot {
        self.inner.lock().snapshot()
    }

    /// Resolves once no dispatch loop is active (finished or stopped by a pause).
    pub async fn wait_idle(&self) {
        let mut rx = self.inner.activity.subscribe();
        let _ = rx.wait_for(|a| !a.looping).await;
    }

    /// Resolves once every pending locator has been handled, including the
    /// trivial case of an enqueue that added nothing.
    pub async fn wait_done(&self) {
        let mut rx = self.inner.activity.subscribe();
        let _ = rx.wait_for(|a| a.drained && !a.looping).await;
    }

    /// Pause, let an in-flight fetch land, and return the records as they stand.
    pub async fn halt(&self) -> Vec<EnrichedRecord> {
        self.pause();
        self.wait_idle().await;
        self.records()
    }

    fn spawn_loop(&self) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(run_loop(inner));
    }
}

async fn run_loop(inner: Arc<Inner>) {
    tracing::debug!(target: "enrich", fetcher = inner.fetcher.name(), "dispatch loop started");
    loop {
        let step = {
            let mut s = inner.lock();
            if !s.state.dispatching() {
                s.looping = false;
                inner.publish(&s);
                Step::Stop(s.snapshot())
            } else if inner.settle_if_drained(&mut s) {
                Step::Stop(s.snapshot())
            } else {
                let loc = s.pending[s.cursor].clone();
                if s.results.is_settled(loc.id()) {
                    s.advance();
                    inner.settle_if_drained(&mut s);
                    Step::Skipped(s.snapshot())
                } else {
                    let next = if s.cursor + 1 == s.pending.len() {
                        PipelineState::Draining
                    } else {
                        PipelineState::Running
                    };
                    inner.transition(&mut s, next);
                    tracing::info!(
                        target: "enrich",
                        id = loc.id(),
                        n = s.cursor + 1,
                        total = s.pending.len(),
                        "processing locator"
                    );
                    Step::Dispatch(loc)
                }
            }
        };

        let loc = match step {
            Step::Dispatch(loc) => loc,
            Step::Skipped(frame) => {
                inner.sink.render(&frame);
                if frame.status == Status::Done {
                    break;
                }
                continue;
            }
            Step::Stop(frame) => {
                inner.sink.render(&frame);
                break;
            }
        };

        let outcome = inner.fetcher.fetch(loc.id(), &inner.pause).await;

        let (frame, finished) = {
            let mut s = inner.lock();
            match outcome {
                Ok(FetchOutcome::Deferred) => {
                    // Nothing was sent; the cursor stays so resume dispatches it again.
                    counter!("enrich_deferred_total").increment(1);
                    continue;
                }
                Ok(FetchOutcome::Found(candidate)) => {
                    if s.results.merge(candidate, &loc) {
                        counter!("enrich_records_total").increment(1);
                    }
                }
                Ok(FetchOutcome::NotFound) => {
                    s.results.mark_absent(loc.id());
                    counter!("enrich_not_found_total").increment(1);
                }
                Err(e) => {
                    tracing::warn!(target: "enrich", error = ?e, id = loc.id(), "fetch failed");
                    counter!("enrich_fetch_errors_total").increment(1);
                }
            }
            s.advance();
            let finished = inner.settle_if_drained(&mut s);
            (s.snapshot(), finished)
        };
        inner.sink.render(&frame);
        if finished {
            break;
        }
    }
    tracing::debug!(target: "enrich", "dispatch loop exited");
}

/// Feed control commands from a renderer into the pipeline until the sender is dropped.
pub fn spawn_control(pipeline: Pipeline, mut rx: mpsc::Receiver<ControlCommand>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(cmd) = rx.recv().await {
            let changed = pipeline.apply(cmd);
            tracing::debug!(target: "enrich", ?cmd, changed, "control command");
        }
    })
}
