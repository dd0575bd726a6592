//! In-process stand-ins for the daemon, used by the engine and stream tests.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::{Semaphore, mpsc};
use tokio::time::Instant;

use super::{EventStream, OutputSource, RemoteError, RemoteGrid, SessionEvent};
use crate::model::{CellRange, GridDiff, GridSnapshot};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    Snapshot,
    Diff,
    SetScrollback(usize),
    Resize { rows: u16, cols: u16 },
    WriteInput(Vec<u8>),
    ReadText(CellRange),
}

#[derive(Default)]
struct ScriptState {
    snapshot: GridSnapshot,
    diffs: VecDeque<GridDiff>,
    diff_unsupported: bool,
    fail_snapshots: bool,
    fail_scrollback: bool,
    fail_resize: bool,
    calls: Vec<RemoteCall>,
}

/// Scripted [`RemoteGrid`].
///
/// Every call is recorded and its answer decided when the call starts. While
/// the remote is held, calls then park until [`ScriptedRemote::release`]
/// hands out permits, which lets tests interleave completions deliberately.
pub struct ScriptedRemote {
    state: Mutex<ScriptState>,
    held: AtomicBool,
    gate: Semaphore,
}

impl ScriptedRemote {
    pub fn new(snapshot: GridSnapshot) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ScriptState {
                snapshot,
                ..ScriptState::default()
            }),
            held: AtomicBool::new(false),
            gate: Semaphore::new(0),
        })
    }

    pub fn set_snapshot(&self, snapshot: GridSnapshot) {
        self.state.lock().snapshot = snapshot;
    }

    /// Queues the answer for the next diff read. An empty queue answers with
    /// a diff that restates the current snapshot.
    pub fn push_diff(&self, diff: GridDiff) {
        self.state.lock().diffs.push_back(diff);
    }

    pub fn set_diff_supported(&self, supported: bool) {
        self.state.lock().diff_unsupported = !supported;
    }

    pub fn fail_snapshots(&self, fail: bool) {
        self.state.lock().fail_snapshots = fail;
    }

    pub fn fail_scrollback(&self, fail: bool) {
        self.state.lock().fail_scrollback = fail;
    }

    pub fn fail_resize(&self, fail: bool) {
        self.state.lock().fail_resize = fail;
    }

    pub fn hold(&self) {
        self.held.store(true, Ordering::SeqCst);
    }

    /// Lets `permits` parked (or future held) calls proceed.
    pub fn release(&self, permits: usize) {
        self.gate.add_permits(permits);
    }

    /// Stops holding new calls and unblocks everything parked so far.
    pub fn resume(&self) {
        if self.held.swap(false, Ordering::SeqCst) {
            self.gate.add_permits(Semaphore::MAX_PERMITS / 2);
        }
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.state.lock().calls.clone()
    }

    pub fn count(&self, predicate: impl Fn(&RemoteCall) -> bool) -> usize {
        self.state.lock().calls.iter().filter(|call| predicate(call)).count()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    async fn gate(&self) {
        if self.held.load(Ordering::SeqCst) {
            if let Ok(permit) = self.gate.acquire().await {
                permit.forget();
            }
        }
    }

    fn record<T>(&self, call: RemoteCall, answer: impl FnOnce(&mut ScriptState) -> T) -> T {
        let mut state = self.state.lock();
        state.calls.push(call);
        answer(&mut state)
    }
}

fn failure(op: &str) -> RemoteError {
    RemoteError::Daemon(format!("scripted {op} failure"))
}

#[async_trait]
impl RemoteGrid for ScriptedRemote {
    async fn grid_snapshot(&self, _session_id: &str) -> Result<GridSnapshot, RemoteError> {
        let answer = self.record(RemoteCall::Snapshot, |state| {
            if state.fail_snapshots {
                Err(failure("snapshot"))
            } else {
                Ok(state.snapshot.clone())
            }
        });
        self.gate().await;
        answer
    }

    async fn grid_snapshot_diff(&self, _session_id: &str) -> Result<GridDiff, RemoteError> {
        let answer = self.record(RemoteCall::Diff, |state| {
            if state.diff_unsupported {
                return Err(RemoteError::Daemon("unknown request type".into()));
            }
            Ok(state
                .diffs
                .pop_front()
                .unwrap_or_else(|| GridDiff::unchanged(&state.snapshot)))
        });
        self.gate().await;
        answer
    }

    async fn set_scrollback(&self, _session_id: &str, offset: usize) -> Result<(), RemoteError> {
        let answer = self.record(RemoteCall::SetScrollback(offset), |state| {
            if state.fail_scrollback {
                Err(failure("scrollback"))
            } else {
                state.snapshot.scrollback_offset = offset;
                Ok(())
            }
        });
        self.gate().await;
        answer
    }

    async fn resize_grid(
        &self,
        _session_id: &str,
        rows: u16,
        cols: u16,
    ) -> Result<(), RemoteError> {
        let answer = self.record(RemoteCall::Resize { rows, cols }, |state| {
            if state.fail_resize {
                Err(failure("resize"))
            } else {
                Ok(())
            }
        });
        self.gate().await;
        answer
    }

    async fn write_input(&self, _session_id: &str, bytes: &[u8]) -> Result<(), RemoteError> {
        let answer = self.record(RemoteCall::WriteInput(bytes.to_vec()), |_| Ok(()));
        self.gate().await;
        answer
    }

    async fn read_grid_text(
        &self,
        _session_id: &str,
        range: CellRange,
    ) -> Result<String, RemoteError> {
        let answer = self.record(RemoteCall::ReadText(range), |state| {
            Ok(state.snapshot.text_in(range))
        });
        self.gate().await;
        answer
    }
}

/// Outcome of one [`ScriptedSource::subscribe`] attempt.
pub enum ScriptedConnect {
    Fail,
    /// Yields the events, then the stream ends as if the connection dropped.
    Events(Vec<SessionEvent>),
    /// Yields the events, then stays open without further traffic.
    EventsThenHold(Vec<SessionEvent>),
    /// Forwards whatever the test sends until the sender is dropped.
    Live(mpsc::UnboundedReceiver<SessionEvent>),
}

/// Scripted [`OutputSource`]. Attempts beyond the script fail.
#[derive(Default)]
pub struct ScriptedSource {
    script: Mutex<VecDeque<ScriptedConnect>>,
    attempts: Mutex<Vec<Instant>>,
}

impl ScriptedSource {
    pub fn new(script: impl IntoIterator<Item = ScriptedConnect>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
            attempts: Mutex::new(Vec::new()),
        })
    }

    pub fn push(&self, outcome: ScriptedConnect) {
        self.script.lock().push_back(outcome);
    }

    /// Queues a live connection and returns its sending side.
    pub fn live(&self) -> mpsc::UnboundedSender<SessionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.push(ScriptedConnect::Live(rx));
        tx
    }

    pub fn attempts(&self) -> Vec<Instant> {
        self.attempts.lock().clone()
    }
}

#[async_trait]
impl OutputSource for ScriptedSource {
    async fn subscribe(&self, _session_id: &str) -> Result<EventStream, RemoteError> {
        self.attempts.lock().push(Instant::now());
        let outcome = self.script.lock().pop_front();
        match outcome {
            None | Some(ScriptedConnect::Fail) => Err(RemoteError::Disconnected),
            Some(ScriptedConnect::Events(events)) => {
                Ok(futures::stream::iter(events.into_iter().map(Ok)).boxed())
            }
            Some(ScriptedConnect::EventsThenHold(events)) => Ok(futures::stream::iter(
                events.into_iter().map(Ok),
            )
            .chain(futures::stream::pending())
            .boxed()),
            Some(ScriptedConnect::Live(mut rx)) => Ok(futures::stream::poll_fn(move |cx| {
                rx.poll_recv(cx).map(|event| event.map(Ok))
            })
            .boxed()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test_timeout::tokio_timeout_test]
    async fn held_calls_wait_for_release() {
        let remote = ScriptedRemote::new(GridSnapshot::from_lines(&["a"], 4));
        remote.hold();
        let pending = {
            let remote = remote.clone();
            tokio::spawn(async move { remote.grid_snapshot("s").await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!pending.is_finished());
        assert_eq!(remote.calls(), vec![RemoteCall::Snapshot]);

        remote.set_snapshot(GridSnapshot::from_lines(&["b"], 4));
        remote.release(1);
        let snapshot = pending.await.expect("join").expect("snapshot");
        assert_eq!(snapshot.row_text(0).as_deref(), Some("a"));
    }

    #[test_timeout::tokio_timeout_test]
    async fn unsupported_diff_reads_fail() {
        let remote = ScriptedRemote::new(GridSnapshot::from_lines(&["a"], 4));
        assert!(remote.grid_snapshot_diff("s").await.expect("diff").is_empty());
        remote.set_diff_supported(false);
        assert!(remote.grid_snapshot_diff("s").await.is_err());
        assert_eq!(remote.count(|call| *call == RemoteCall::Diff), 2);
    }

    #[test_timeout::tokio_timeout_test]
    async fn source_replays_script_then_fails() {
        let source = ScriptedSource::new([ScriptedConnect::Events(vec![
            SessionEvent::OutputAvailable,
        ])]);
        let events: Vec<_> = source
            .subscribe("s")
            .await
            .expect("first attempt")
            .collect()
            .await;
        assert_eq!(events.len(), 1);
        assert!(source.subscribe("s").await.is_err());
        assert_eq!(source.attempts().len(), 2);
    }
}
