// tests/pipeline_scenarios.rs
mod common;

use common::{loc, loc_with_price, ScriptedFetcher};
use rand::seq::SliceRandom;
use ratings_enricher::sink::RecordingSink;
use ratings_enricher::{
    spawn_control, ControlCommand, Locator, Pipeline, PipelineState, Progress, Status,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

fn ids(p: &Pipeline) -> Vec<String> {
    p.records().into_iter().map(|r| r.id).collect()
}

#[tokio::test]
async fn two_found_one_missing_ends_done() {
    let fetcher = Arc::new(ScriptedFetcher::new(&[
        ("A", Some(4.6)),
        ("B", Some(4.1)),
        ("C", None),
    ]));
    let sink = Arc::new(RecordingSink::new());
    let p = Pipeline::new(fetcher.clone(), sink.clone());

    assert_eq!(p.enqueue(vec![loc("A"), loc("B"), loc("C")]), 3);
    p.wait_done().await;

    assert_eq!(ids(&p), vec!["A", "B"]);
    let last = sink.last().expect("frames rendered");
    assert_eq!(last.status, Status::Done);
    assert_eq!(last.progress, Progress { done: 3, total: 3 });
    assert_eq!(fetcher.calls(), vec!["A", "B", "C"]);
}

#[tokio::test]
async fn pause_before_dispatch_sends_nothing_until_resume() {
    let fetcher = Arc::new(ScriptedFetcher::new(&[("A", Some(4.0))]));
    let sink = Arc::new(RecordingSink::new());
    let p = Pipeline::new(fetcher.clone(), sink.clone());

    p.enqueue(vec![loc("A")]);
    assert!(p.pause());
    p.wait_idle().await;

    assert!(fetcher.calls().is_empty());
    let last = sink.last().unwrap();
    assert_eq!(last.status, Status::Paused);
    assert_eq!(last.progress, Progress { done: 0, total: 1 });

    assert!(p.resume());
    p.wait_done().await;
    assert_eq!(fetcher.calls(), vec!["A"]);
    assert_eq!(ids(&p), vec!["A"]);
}

#[tokio::test]
async fn in_flight_fetch_completes_after_pause() {
    let (fetcher, mut gate) =
        ScriptedFetcher::new(&[("A", Some(4.0)), ("B", Some(4.5)), ("C", Some(3.0))]).gated();
    let fetcher = Arc::new(fetcher);
    let sink = Arc::new(RecordingSink::new());
    let p = Pipeline::new(fetcher.clone(), sink.clone());

    p.enqueue(vec![loc("A"), loc("B"), loc("C")]);
    assert_eq!(gate.next_started().await, "A");

    // A is on the wire; pausing must not drop it.
    assert!(p.pause());
    gate.release(1);
    p.wait_idle().await;

    assert_eq!(fetcher.calls(), vec!["A"]);
    assert_eq!(ids(&p), vec!["A"]);
    assert_eq!(p.state(), PipelineState::Paused);
    assert_eq!(p.progress(), Progress { done: 1, total: 3 });

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(fetcher.calls(), vec!["A"], "no requests while paused");

    assert!(p.resume());
    gate.release(2);
    p.wait_done().await;
    assert_eq!(fetcher.calls(), vec!["A", "B", "C"]);
    assert_eq!(ids(&p), vec!["B", "A", "C"]);
}

#[tokio::test(start_paused = true)]
async fn pause_during_pacing_delay_defers_the_request() {
    let fetcher = Arc::new(ScriptedFetcher::new(&[("A", Some(4.0)), ("B", Some(4.2))]).with_delay_ms(200));
    let sink = Arc::new(RecordingSink::new());
    let p = Pipeline::new(fetcher.clone(), sink.clone());

    p.enqueue(vec![loc("A"), loc("B")]);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(p.pause());
    p.wait_idle().await;

    assert!(fetcher.calls().is_empty());
    assert_eq!(p.progress(), Progress { done: 0, total: 2 });
    assert_eq!(sink.last().unwrap().status, Status::Paused);

    assert!(p.resume());
    p.wait_done().await;
    assert_eq!(fetcher.calls(), vec!["A", "B"]);
    assert_eq!(ids(&p), vec!["B", "A"]);
}

#[tokio::test]
async fn repeated_ids_across_batches_merge_once() {
    let script: Vec<(&str, Option<f32>)> = vec![
        ("A", Some(3.9)),
        ("B", Some(4.4)),
        ("C", None),
        ("D", Some(4.4)),
        ("E", Some(4.0)),
    ];
    let fetcher = Arc::new(ScriptedFetcher::new(&script));
    let sink = Arc::new(RecordingSink::new());
    let p = Pipeline::new(fetcher.clone(), sink.clone());

    let mut all: Vec<Locator> = script.iter().cycle().take(20).map(|(id, _)| loc(id)).collect();
    all.shuffle(&mut rand::rng());
    for chunk in all.chunks(4) {
        p.enqueue(chunk.to_vec());
    }
    p.wait_done().await;

    let calls = fetcher.calls();
    let unique: HashSet<&String> = calls.iter().collect();
    assert_eq!(calls.len(), unique.len(), "each id requested once: {calls:?}");
    assert_eq!(calls.len(), 5);

    let got = ids(&p);
    let unique: HashSet<&String> = got.iter().collect();
    assert_eq!(got.len(), unique.len());
    assert_eq!(got.len(), 4);

    // Settled ids (found or confirmed absent) are refused afterwards.
    assert_eq!(p.enqueue(vec![loc("A"), loc("C")]), 0);
    assert_eq!(p.state(), PipelineState::Done);
}

#[tokio::test]
async fn every_frame_is_sorted_and_progress_is_monotonic() {
    let fetcher = Arc::new(ScriptedFetcher::new(&[
        ("A", Some(4.1)),
        ("B", Some(4.5)),
        ("C", Some(4.1)),
        ("D", None),
        ("E", Some(4.1)),
        ("F", Some(2.5)),
    ]));
    let sink = Arc::new(RecordingSink::new());
    let p = Pipeline::new(fetcher.clone(), sink.clone());

    p.enqueue(vec![loc("A"), loc("B"), loc("C")]);
    p.enqueue(vec![loc("D"), loc("E"), loc("F")]);
    p.wait_done().await;

    let frames = sink.frames.lock().unwrap().clone();
    assert!(frames.len() >= 6);
    let mut last_done = 0;
    for f in &frames {
        assert!(f
            .records
            .windows(2)
            .all(|w| w[0].rating >= w[1].rating));
        assert!(f.progress.done >= last_done);
        assert!(f.progress.done <= f.progress.total);
        if f.progress.done == f.progress.total && f.progress.total > 0 {
            assert_eq!(f.status, Status::Done);
        }
        last_done = f.progress.done;
    }
    // ties keep arrival order
    assert_eq!(ids(&p), vec!["B", "A", "C", "E", "F"]);
}

#[tokio::test]
async fn network_failure_skips_one_locator_only() {
    let fetcher = Arc::new(
        ScriptedFetcher::new(&[("A", Some(4.0)), ("B", Some(4.9)), ("C", Some(3.5))])
            .failing("B"),
    );
    let sink = Arc::new(RecordingSink::new());
    let p = Pipeline::new(fetcher.clone(), sink.clone());

    p.enqueue(vec![loc("A"), loc("B"), loc("C")]);
    p.wait_done().await;
    assert_eq!(ids(&p), vec!["A", "C"]);
    assert_eq!(p.progress(), Progress { done: 3, total: 3 });

    // A failed id is not settled, so rediscovering it tries again.
    assert_eq!(p.enqueue(vec![loc("B")]), 1);
    p.wait_done().await;
    let b_calls = fetcher.calls().iter().filter(|c| c.as_str() == "B").count();
    assert_eq!(b_calls, 2);
    assert_eq!(p.progress(), Progress { done: 4, total: 4 });
}

#[tokio::test]
async fn enqueue_while_paused_only_appends() {
    let (fetcher, mut gate) =
        ScriptedFetcher::new(&[("A", Some(4.0)), ("B", Some(4.2)), ("C", Some(4.4))]).gated();
    let fetcher = Arc::new(fetcher);
    let p = Pipeline::new(fetcher.clone(), Arc::new(RecordingSink::new()));

    p.enqueue(vec![loc("A"), loc("B")]);
    assert_eq!(gate.next_started().await, "A");
    p.pause();
    gate.release(1);
    p.wait_idle().await;

    assert_eq!(p.enqueue(vec![loc("B"), loc("C")]), 1);
    assert_eq!(p.state(), PipelineState::Paused);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(fetcher.calls(), vec!["A"]);

    p.resume();
    gate.release(2);
    p.wait_done().await;
    assert_eq!(fetcher.calls(), vec!["A", "B", "C"]);
}

#[tokio::test]
async fn done_session_reopens_on_new_locators() {
    let fetcher = Arc::new(ScriptedFetcher::new(&[("A", Some(4.0)), ("B", Some(4.8))]));
    let sink = Arc::new(RecordingSink::new());
    let p = Pipeline::new(fetcher.clone(), sink.clone());

    p.enqueue(vec![loc("A")]);
    p.wait_done().await;
    assert_eq!(p.state(), PipelineState::Done);
    assert!(!p.pause(), "nothing to pause once done");

    p.enqueue(vec![loc_with_price("B", "Kindle Price: $1.99")]);
    p.wait_done().await;
    let records = p.records();
    assert_eq!(records[0].id, "B");
    assert_eq!(records[0].price, "$1.99");
    assert_eq!(records[1].price, "N/A");
    assert_eq!(sink.last().unwrap().progress, Progress { done: 2, total: 2 });
}

#[tokio::test]
async fn toggle_commands_flow_back_through_the_channel() {
    let (fetcher, mut gate) = ScriptedFetcher::new(&[("A", Some(4.0)), ("B", Some(4.2))]).gated();
    let fetcher = Arc::new(fetcher);
    let p = Pipeline::new(fetcher.clone(), Arc::new(RecordingSink::new()));
    let (tx, rx) = mpsc::channel(4);
    let control = spawn_control(p.clone(), rx);

    p.enqueue(vec![loc("A"), loc("B")]);
    assert_eq!(gate.next_started().await, "A");

    tx.send(ControlCommand::Toggle).await.unwrap();
    tokio::time::timeout(Duration::from_secs(2), async {
        while p.state() != PipelineState::Paused {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("toggle should pause");
    gate.release(1);
    p.wait_idle().await;
    assert_eq!(fetcher.calls(), vec!["A"]);

    tx.send(ControlCommand::Toggle).await.unwrap();
    gate.release(1);
    p.wait_done().await;
    assert_eq!(fetcher.calls(), vec!["A", "B"]);

    drop(tx);
    control.await.unwrap();
}

#[tokio::test]
async fn idle_pipeline_ignores_pause_and_resume() {
    let fetcher = Arc::new(ScriptedFetcher::new(&[]));
    let p = Pipeline::new(fetcher, Arc::new(RecordingSink::new()));
    assert_eq!(p.state(), PipelineState::Idle);
    assert!(!p.pause());
    assert!(!p.resume());
    assert!(!p.toggle());
    assert_eq!(p.snapshot().status, Status::Idle);
}

#[tokio::test]
async fn empty_enqueue_counts_as_done() {
    let fetcher = Arc::new(ScriptedFetcher::new(&[("A", Some(4.0))]));
    let p = Pipeline::new(fetcher.clone(), Arc::new(RecordingSink::new()));

    assert_eq!(p.enqueue(Vec::<Locator>::new()), 0);
    tokio::time::timeout(Duration::from_secs(2), p.wait_done())
        .await
        .expect("nothing pending resolves at once");

    p.enqueue(vec![loc("A")]);
    p.wait_done().await;
    // only settled ids: nothing appended, still resolves
    assert_eq!(p.enqueue(vec![loc("A")]), 0);
    tokio::time::timeout(Duration::from_secs(2), p.wait_done())
        .await
        .expect("settled-only batch resolves at once");
    assert_eq!(fetcher.calls(), vec!["A"]);
}

#[tokio::test]
async fn enqueue_while_draining_reopens_the_running_loop() {
    let (fetcher, mut gate) = ScriptedFetcher::new(&[("A", Some(4.0)), ("B", Some(4.6))]).gated();
    let fetcher = Arc::new(fetcher);
    let p = Pipeline::new(fetcher.clone(), Arc::new(RecordingSink::new()));

    p.enqueue(vec![loc("A")]);
    assert_eq!(gate.next_started().await, "A");
    assert_eq!(p.state(), PipelineState::Draining);

    // A is still in flight and waiting, so it is not added again.
    assert_eq!(p.enqueue(vec![loc("B"), loc("A")]), 1);
    assert_eq!(p.state(), PipelineState::Running);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(fetcher.calls(), vec!["A"], "one dispatch at a time");

    gate.release(1);
    assert_eq!(gate.next_started().await, "B");
    assert_eq!(p.state(), PipelineState::Draining);
    gate.release(1);
    p.wait_done().await;

    assert_eq!(fetcher.calls(), vec!["A", "B"]);
    assert_eq!(ids(&p), vec!["B", "A"]);
    assert_eq!(p.progress(), Progress { done: 2, total: 2 });
}

#[tokio::test]
async fn halt_keeps_the_in_flight_record() {
    let (fetcher, mut gate) =
        ScriptedFetcher::new(&[("A", Some(4.0)), ("B", Some(4.6))]).gated();
    let fetcher = Arc::new(fetcher);
    let p = Pipeline::new(fetcher.clone(), Arc::new(RecordingSink::new()));

    p.enqueue(vec![loc("A"), loc("B")]);
    assert_eq!(gate.next_started().await, "A");

    let halting = tokio::spawn({
        let p = p.clone();
        async move { p.halt().await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!halting.is_finished(), "halt waits for the fetch on the wire");

    gate.release(1);
    let records = halting.await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, "A");
    assert_eq!(p.state(), PipelineState::Paused);
    assert_eq!(fetcher.calls(), vec!["A"]);
}
