use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use gridview_core::config::SyncTuning;
use gridview_core::model::{GridDiff, GridSnapshot};
use gridview_core::pane::Pane;
use gridview_core::remote::SessionEvent;
use gridview_core::remote::mock::{RemoteCall, ScriptedConnect, ScriptedRemote, ScriptedSource};
use gridview_core::stream::{Backoff, OutputListener, OutputStreamClient, StreamExit};
use gridview_core::view::RecordingSink;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct CountingListener {
    outputs: AtomicUsize,
    diffs: AtomicUsize,
}

impl OutputListener for CountingListener {
    fn output_available(&self) {
        self.outputs.fetch_add(1, Ordering::SeqCst);
    }

    fn grid_diff(&self, _diff: GridDiff) {
        self.diffs.fetch_add(1, Ordering::SeqCst);
    }
}

fn client(
    source: Arc<ScriptedSource>,
    listener: Arc<CountingListener>,
    cancel: CancellationToken,
) -> OutputStreamClient {
    OutputStreamClient::new(
        "session-1",
        source,
        listener,
        Backoff::new(Duration::from_millis(1_000), Duration::from_millis(10_000)),
        cancel,
    )
}

fn gaps_ms(source: &ScriptedSource) -> Vec<u64> {
    source
        .attempts()
        .windows(2)
        .map(|pair| (pair[1] - pair[0]).as_millis() as u64)
        .collect()
}

#[test_timeout::tokio_timeout_test(start_paused)]
async fn failures_back_off_exponentially_and_reset_after_events() {
    let source = ScriptedSource::new([
        ScriptedConnect::Fail,
        ScriptedConnect::Fail,
        ScriptedConnect::Fail,
        ScriptedConnect::Events(vec![SessionEvent::OutputAvailable]),
    ]);
    let listener = Arc::new(CountingListener::default());
    let cancel = CancellationToken::new();
    let task = tokio::spawn(client(source.clone(), listener.clone(), cancel.clone()).run());

    tokio::time::sleep(Duration::from_millis(8_500)).await;
    cancel.cancel();
    assert_eq!(task.await.expect("join"), StreamExit::Cancelled);

    assert_eq!(gaps_ms(&source), vec![1_000, 2_000, 4_000, 1_000]);
    assert_eq!(listener.outputs.load(Ordering::SeqCst), 1);
}

#[test_timeout::tokio_timeout_test(start_paused)]
async fn delay_is_capped() {
    let source = ScriptedSource::new([]);
    let listener = Arc::new(CountingListener::default());
    let cancel = CancellationToken::new();
    let task = tokio::spawn(client(source.clone(), listener, cancel.clone()).run());

    tokio::time::sleep(Duration::from_millis(40_000)).await;
    cancel.cancel();
    task.await.expect("join");

    assert_eq!(gaps_ms(&source), vec![1_000, 2_000, 4_000, 8_000, 10_000, 10_000]);
}

#[test_timeout::tokio_timeout_test(start_paused)]
async fn session_end_stops_retrying() {
    let source = ScriptedSource::new([ScriptedConnect::Events(vec![
        SessionEvent::OutputAvailable,
        SessionEvent::GridDiff(GridDiff::default()),
        SessionEvent::SessionEnded,
    ])]);
    let listener = Arc::new(CountingListener::default());
    let exit = client(source.clone(), listener.clone(), CancellationToken::new())
        .run()
        .await;

    assert_eq!(exit, StreamExit::SessionEnded);
    assert_eq!(source.attempts().len(), 1);
    assert_eq!(listener.outputs.load(Ordering::SeqCst), 1);
    assert_eq!(listener.diffs.load(Ordering::SeqCst), 1);
}

#[test_timeout::tokio_timeout_test(120, start_paused)]
async fn cancel_unblocks_an_idle_read() {
    let source = ScriptedSource::new([ScriptedConnect::EventsThenHold(vec![])]);
    let listener = Arc::new(CountingListener::default());
    let cancel = CancellationToken::new();
    let task = tokio::spawn(client(source.clone(), listener, cancel.clone()).run());

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(!task.is_finished());
    cancel.cancel();
    assert_eq!(task.await.expect("join"), StreamExit::Cancelled);
    assert_eq!(source.attempts().len(), 1);
}

#[test_timeout::tokio_timeout_test(start_paused)]
async fn cancel_interrupts_backoff_wait() {
    let source = ScriptedSource::new([ScriptedConnect::Fail]);
    let listener = Arc::new(CountingListener::default());
    let cancel = CancellationToken::new();
    let task = tokio::spawn(client(source.clone(), listener, cancel.clone()).run());

    tokio::time::sleep(Duration::from_millis(500)).await;
    cancel.cancel();
    assert_eq!(task.await.expect("join"), StreamExit::Cancelled);
    assert_eq!(source.attempts().len(), 1);
}

#[test_timeout::tokio_timeout_test(start_paused)]
async fn pane_routes_stream_events_into_engine() {
    let base = GridSnapshot::from_lines(&["$ "], 20);
    let remote = ScriptedRemote::new(base.clone());
    let source = ScriptedSource::new([]);
    let events = source.live();
    let sink = Arc::new(RecordingSink::new());
    let pane = Pane::mount(
        "session-1",
        remote.clone(),
        Some(source.clone()),
        sink.clone(),
        SyncTuning::default(),
    );
    tokio::time::sleep(Duration::from_millis(100)).await;
    remote.clear_calls();

    events.send(SessionEvent::OutputAvailable).expect("send output");
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(remote.calls(), vec![RemoteCall::Diff]);

    events
        .send(SessionEvent::GridDiff(GridDiff::single_row(&base, 0, "$ echo")))
        .expect("send diff");
    tokio::time::sleep(Duration::from_millis(100)).await;
    let state = pane.handle().inspect().await.expect("engine running");
    assert_eq!(state.row_text(0).as_deref(), Some("$ echo"));
    assert_eq!(state.diff_seq, 1);
    assert_eq!(
        sink.last_snapshot().and_then(|s| s.row_text(0)).as_deref(),
        Some("$ echo")
    );

    assert_eq!(pane.destroy().await, Some(StreamExit::Cancelled));
    assert_eq!(source.attempts().len(), 1);
}

#[test_timeout::tokio_timeout_test(start_paused)]
async fn dropped_pane_stops_reconnecting() {
    let remote = ScriptedRemote::new(GridSnapshot::from_lines(&["x"], 20));
    let source = ScriptedSource::new([]);
    let pane = Pane::mount(
        "session-1",
        remote,
        Some(source.clone()),
        Arc::new(RecordingSink::new()),
        SyncTuning::default(),
    );
    tokio::time::sleep(Duration::from_millis(2_500)).await;
    let before = source.attempts().len();
    assert_eq!(before, 2);

    drop(pane);
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(source.attempts().len(), before);
}
