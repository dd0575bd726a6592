use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::{Instant, Interval, MissedTickBehavior, Sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::autoscroll::{SelectionAutoScroller, SelectionPoint, TickerChange};
use super::fetch::{FetchOrigin, FetchResponse, FetchTicket, PushOutcome, run_fetch};
use super::resize::{CellMetrics, ContainerSize, FitDecision};
use super::scroll::{ScrollIntent, ScrollTicket};
use super::state::{DiffMode, Seq, SyncState, SyncStats};
use crate::config::SyncTuning;
use crate::model::{CellRange, GridDiff, GridDimensions, GridSnapshot};
use crate::remote::{RemoteError, RemoteGrid};
use crate::telemetry;
use crate::view::ViewSink;

/// Point-in-time copy of the engine state.
#[derive(Clone, Debug)]
pub struct ViewState {
    pub snapshot: Option<GridSnapshot>,
    pub diff_seq: Seq,
    pub scroll_seq: Seq,
    pub scrollback_offset: usize,
    pub total_scrollback: usize,
    pub user_scrolled: bool,
    pub snapshot_pending: bool,
    pub debounce_armed: bool,
    pub diff_mode: DiffMode,
    pub fitted: Option<GridDimensions>,
    pub stats: SyncStats,
    pub auto_scroll_rate: Option<i64>,
    pub selection_anchor: Option<SelectionPoint>,
    pub in_flight: usize,
}

impl ViewState {
    pub fn row_text(&self, row: usize) -> Option<String> {
        self.snapshot.as_ref()?.row_text(row)
    }
}

enum Command {
    NotifyOutput,
    PushDiff(GridDiff),
    Scroll(ScrollIntent),
    SendInput(Vec<u8>),
    Fit {
        container: ContainerSize,
        metrics: CellMetrics,
    },
    Activate,
    BeginSelection(SelectionPoint),
    PointerMoved {
        row: f64,
        col: u16,
    },
    EndSelection(oneshot::Sender<Option<CellRange>>),
    ReadText {
        range: CellRange,
        reply: oneshot::Sender<Result<String, RemoteError>>,
    },
    Inspect(oneshot::Sender<ViewState>),
}

enum Completion {
    Fetch {
        ticket: FetchTicket,
        response: FetchResponse,
    },
    Scrollback {
        ticket: ScrollTicket,
        result: Result<(), RemoteError>,
    },
    Resize {
        rows: u16,
        cols: u16,
        invalidated: bool,
        result: Result<(), RemoteError>,
    },
    Input(Result<(), RemoteError>),
    /// The result already went to the caller.
    Replied,
}

/// Cloneable front end of a running [`GridSync`].
#[derive(Clone)]
pub struct GridSyncHandle {
    commands: mpsc::UnboundedSender<Command>,
    cancel: CancellationToken,
}

impl GridSyncHandle {
    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            trace!(target = "gridview::sync", "engine stopped; dropping command");
        }
    }

    /// Output is available on the remote; schedules a debounced fetch.
    pub fn notify_output(&self) {
        self.send(Command::NotifyOutput);
    }

    pub fn apply_pushed_diff(&self, diff: GridDiff) {
        self.send(Command::PushDiff(diff));
    }

    pub fn scroll(&self, intent: ScrollIntent) {
        self.send(Command::Scroll(intent));
    }

    pub fn snap_to_bottom(&self) {
        self.send(Command::Scroll(ScrollIntent::Bottom));
    }

    /// Forwards input to the session, returning to the live view first.
    pub fn send_input(&self, bytes: impl Into<Vec<u8>>) {
        self.send(Command::SendInput(bytes.into()));
    }

    pub fn fit(&self, container: ContainerSize, metrics: CellMetrics) {
        self.send(Command::Fit { container, metrics });
    }

    /// The pane became the visible one.
    pub fn activate(&self) {
        self.send(Command::Activate);
    }

    pub fn begin_selection(&self, anchor: SelectionPoint) {
        self.send(Command::BeginSelection(anchor));
    }

    /// Drag pointer moved; `row` is viewport-relative and may lie outside it.
    pub fn pointer_moved(&self, row: f64, col: u16) {
        self.send(Command::PointerMoved { row, col });
    }

    /// Ends the drag and returns the selected cells. `None` when no drag was
    /// in progress or the engine has stopped.
    pub async fn end_selection(&self) -> Option<CellRange> {
        let (tx, rx) = oneshot::channel();
        self.commands.send(Command::EndSelection(tx)).ok()?;
        rx.await.ok().flatten()
    }

    /// Reads the text under `range`, e.g. the result of [`Self::end_selection`].
    pub async fn read_text(&self, range: CellRange) -> Result<String, RemoteError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::ReadText { range, reply: tx })
            .map_err(|_| RemoteError::Disconnected)?;
        rx.await.map_err(|_| RemoteError::Disconnected)?
    }

    /// Returns `None` once the engine has stopped.
    pub async fn inspect(&self) -> Option<ViewState> {
        let (tx, rx) = oneshot::channel();
        self.commands.send(Command::Inspect(tx)).ok()?;
        rx.await.ok()
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}

/// The grid synchronization engine for one pane.
///
/// A single task owns [`SyncState`]. Remote calls run in a [`JoinSet`] and
/// report back through the same loop that handles commands, the debounce
/// timer and the auto-scroll ticker, so state is never shared across tasks.
pub struct GridSync {
    session_id: String,
    remote: Arc<dyn RemoteGrid>,
    sink: Arc<dyn ViewSink>,
    tuning: SyncTuning,
    state: SyncState,
    selection: SelectionAutoScroller,
    debounce: Option<Pin<Box<Sleep>>>,
    ticker: Option<Interval>,
    tasks: JoinSet<Completion>,
    commands: mpsc::UnboundedReceiver<Command>,
    cancel: CancellationToken,
}

impl GridSync {
    pub fn spawn(
        session_id: impl Into<String>,
        remote: Arc<dyn RemoteGrid>,
        sink: Arc<dyn ViewSink>,
        tuning: SyncTuning,
        cancel: CancellationToken,
    ) -> (GridSyncHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let engine = GridSync {
            session_id: session_id.into(),
            remote,
            sink,
            tuning,
            state: SyncState::new(),
            selection: SelectionAutoScroller::default(),
            debounce: None,
            ticker: None,
            tasks: JoinSet::new(),
            commands: rx,
            cancel: cancel.clone(),
        };
        let handle = GridSyncHandle {
            commands: tx,
            cancel,
        };
        (handle, tokio::spawn(engine.run()))
    }

    async fn run(mut self) {
        debug!(target = "gridview::sync", session_id = %self.session_id, "grid sync started");
        if self.state.request_fetch() {
            self.launch_scheduled_fetch();
        }

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => {
                    self.handle_joined(joined);
                }
                _ = wait_debounce(&mut self.debounce), if self.debounce.is_some() => {
                    self.debounce = None;
                    self.launch_scheduled_fetch();
                }
                _ = wait_tick(&mut self.ticker), if self.ticker.is_some() => {
                    self.auto_scroll_tick();
                }
            }
        }

        self.debounce = None;
        self.ticker = None;
        self.tasks.shutdown().await;
        debug!(
            target = "gridview::sync",
            session_id = %self.session_id,
            stats = ?self.state.stats(),
            "grid sync stopped"
        );
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::NotifyOutput => self.schedule_fetch(),
            Command::PushDiff(diff) => {
                self.debounce = None;
                match self.state.apply_pushed_diff(diff) {
                    PushOutcome::Merged => self.publish(),
                    PushOutcome::NeedsSnapshot => self.refill(),
                }
            }
            Command::Scroll(intent) => {
                self.scroll(intent);
            }
            Command::SendInput(bytes) => self.send_input(bytes),
            Command::Fit { container, metrics } => self.fit(container, metrics),
            Command::Activate => {
                if !self.scroll(ScrollIntent::Bottom) && self.state.cached().is_none() {
                    self.schedule_fetch();
                }
            }
            Command::BeginSelection(anchor) => self.selection.begin(anchor),
            Command::PointerMoved { row, col } => {
                let rows = self.state.viewport_rows();
                match self.selection.pointer_moved(row, col, rows) {
                    TickerChange::Start => self.start_ticker(),
                    TickerChange::Stop => self.ticker = None,
                    TickerChange::Keep => {}
                }
            }
            Command::EndSelection(reply) => {
                self.ticker = None;
                let _ = reply.send(self.selection.end());
            }
            Command::ReadText { range, reply } => {
                let remote = self.remote.clone();
                let session_id = self.session_id.clone();
                self.tasks.spawn(async move {
                    let _ = reply.send(remote.read_grid_text(&session_id, range).await);
                    Completion::Replied
                });
            }
            Command::Inspect(reply) => {
                let _ = reply.send(self.view_state());
            }
        }
    }

    fn handle_joined(&mut self, joined: Result<Completion, JoinError>) {
        match joined {
            Ok(completion) => self.handle_completion(completion),
            Err(err) if err.is_cancelled() => {}
            Err(err) => warn!(target = "gridview::sync", error = %err, "remote call task failed"),
        }
    }

    fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Fetch { ticket, response } => {
                let outcome = self.state.complete_fetch(ticket, response);
                trace!(target = "gridview::sync", ?outcome, kind = ?ticket.kind, "fetch settled");
                if outcome.updated_view() {
                    self.publish();
                }
            }
            Completion::Scrollback { ticket, result } => match result {
                Ok(()) if self.state.is_current_scroll(&ticket) => {
                    let fetch = self.state.begin_fetch(FetchOrigin::Scroll(ticket.scroll_seq));
                    self.spawn_fetch(fetch);
                }
                Ok(()) => {
                    trace!(target = "gridview::sync", offset = ticket.offset, "scroll superseded");
                }
                Err(err) if self.state.is_current_scroll(&ticket) => {
                    debug!(
                        target = "gridview::sync",
                        offset = ticket.offset,
                        error = %err,
                        "set scrollback failed; following remote offset"
                    );
                    self.state.scroll_rejected();
                    self.refill();
                }
                Err(err) => {
                    trace!(
                        target = "gridview::sync",
                        offset = ticket.offset,
                        error = %err,
                        "superseded scroll failed"
                    );
                }
            },
            Completion::Resize {
                rows,
                cols,
                invalidated,
                result,
            } => match result {
                Ok(()) if invalidated => self.schedule_fetch(),
                Ok(()) => {}
                Err(err) => {
                    debug!(target = "gridview::sync", rows, cols, error = %err, "resize failed");
                    if self.state.cached().is_none() {
                        self.refill();
                    }
                }
            },
            Completion::Input(result) => {
                if let Err(err) = result {
                    debug!(target = "gridview::sync", error = %err, "input write failed");
                }
            }
            Completion::Replied => {}
        }
    }

    fn schedule_fetch(&mut self) {
        if self.state.request_fetch() {
            self.debounce = Some(Box::pin(tokio::time::sleep(self.tuning.fetch_debounce)));
        }
    }

    fn launch_scheduled_fetch(&mut self) {
        let ticket = self.state.begin_fetch(FetchOrigin::Scheduled);
        self.spawn_fetch(ticket);
    }

    /// Rebuilds an absent cache from a full snapshot right away.
    fn refill(&mut self) {
        let ticket = self.state.begin_fetch(FetchOrigin::Refill);
        self.spawn_fetch(ticket);
    }

    fn spawn_fetch(&mut self, ticket: FetchTicket) {
        let remote = self.remote.clone();
        let session_id = self.session_id.clone();
        self.tasks.spawn(async move {
            let response = run_fetch(remote, session_id, ticket.kind).await;
            Completion::Fetch { ticket, response }
        });
    }

    /// Returns whether the offset changed.
    fn scroll(&mut self, intent: ScrollIntent) -> bool {
        let Some(ticket) = self.state.scroll(intent) else {
            return false;
        };
        let remote = self.remote.clone();
        let session_id = self.session_id.clone();
        self.tasks.spawn(async move {
            let result = remote.set_scrollback(&session_id, ticket.offset).await;
            Completion::Scrollback { ticket, result }
        });
        true
    }

    fn send_input(&mut self, bytes: Vec<u8>) {
        if self.state.scrollback_offset() > 0 {
            self.scroll(ScrollIntent::Bottom);
        }
        let remote = self.remote.clone();
        let session_id = self.session_id.clone();
        self.tasks.spawn(async move {
            Completion::Input(remote.write_input(&session_id, &bytes).await)
        });
    }

    fn fit(&mut self, container: ContainerSize, metrics: CellMetrics) {
        match self.state.plan_fit(container, metrics) {
            FitDecision::Hidden => {
                trace!(target = "gridview::sync", "container hidden; resize suppressed");
            }
            FitDecision::Degenerate => {
                debug!(
                    target = "gridview::sync",
                    ?metrics,
                    "unusable cell metrics; resize skipped"
                );
            }
            FitDecision::Resize {
                rows,
                cols,
                invalidated,
            } => {
                let remote = self.remote.clone();
                let session_id = self.session_id.clone();
                self.tasks.spawn(async move {
                    let result = remote.resize_grid(&session_id, rows, cols).await;
                    Completion::Resize {
                        rows,
                        cols,
                        invalidated,
                        result,
                    }
                });
            }
        }
    }

    fn start_ticker(&mut self) {
        let period = self.tuning.autoscroll_interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.ticker = Some(ticker);
    }

    fn auto_scroll_tick(&mut self) {
        let Some(rate) = self.selection.rate() else {
            self.ticker = None;
            return;
        };
        let before = self.state.scrollback_offset() as i64;
        self.scroll(ScrollIntent::Lines(rate));
        let applied = self.state.scrollback_offset() as i64 - before;
        self.selection.shift_anchor(applied, self.state.viewport_rows());
    }

    fn publish(&mut self) {
        if let Some(snapshot) = self.state.cached() {
            telemetry::record_gauge("sync_cached_rows", snapshot.rows.len() as u64);
            self.sink.snapshot_ready(snapshot);
        }
        if let Some(title) = self.state.take_title_change() {
            self.sink.title_changed(&title);
        }
    }

    fn view_state(&self) -> ViewState {
        ViewState {
            snapshot: self.state.cached().cloned(),
            diff_seq: self.state.diff_seq(),
            scroll_seq: self.state.scroll_seq(),
            scrollback_offset: self.state.scrollback_offset(),
            total_scrollback: self.state.total_scrollback(),
            user_scrolled: self.state.is_user_scrolled(),
            snapshot_pending: self.state.snapshot_pending(),
            debounce_armed: self.debounce.is_some(),
            diff_mode: self.state.diff_mode(),
            fitted: self.state.fitted(),
            stats: self.state.stats().clone(),
            auto_scroll_rate: self.selection.rate(),
            selection_anchor: self.selection.anchor(),
            in_flight: self.tasks.len(),
        }
    }
}

async fn wait_debounce(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer.as_mut() {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}

async fn wait_tick(ticker: &mut Option<Interval>) {
    match ticker.as_mut() {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}
