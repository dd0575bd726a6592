//! Pull path: debounced scheduling, diff-or-snapshot reads and the staleness
//! guards applied when a read completes.

use std::sync::Arc;

use tracing::{debug, info};

use super::state::{DiffMode, Seq, SyncState};
use crate::model::{GridDiff, GridSnapshot};
use crate::remote::{RemoteError, RemoteGrid};
use crate::telemetry::PerfGuard;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FetchId(u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchOrigin {
    /// Started by the fetch scheduler; owns `snapshot_pending`.
    Scheduled,
    /// Follow-up to an acknowledged scroll, carrying its `scroll_seq`.
    Scroll(Seq),
    /// Full read to rebuild an absent cache, superseded by any later scroll.
    Refill,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchKind {
    Diff,
    Full,
}

/// Counters captured before any remote call of one fetch is issued.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FetchTicket {
    pub id: FetchId,
    pub diff_seq: Seq,
    pub scroll_seq: Seq,
    pub scroll_token: Option<Seq>,
    pub kind: FetchKind,
}

#[derive(Debug)]
pub enum FetchResponse {
    Diff(GridDiff),
    Snapshot {
        snapshot: GridSnapshot,
        /// The diff read failed first and the snapshot came from the fallback.
        diff_failed: bool,
    },
    Failed {
        diff_failed: bool,
        error: RemoteError,
    },
}

impl FetchResponse {
    fn diff_failed(&self) -> bool {
        match self {
            FetchResponse::Diff(_) => false,
            FetchResponse::Snapshot { diff_failed, .. }
            | FetchResponse::Failed { diff_failed, .. } => *diff_failed,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiscardReason {
    /// A push diff was applied while the read was in flight.
    PushedDiff,
    /// The user scrolled after the read started.
    Scrolled,
    /// A resize dropped the cache the diff would have merged into.
    Invalidated,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchOutcome {
    Merged,
    Replaced,
    Discarded(DiscardReason),
    Failed,
}

impl FetchOutcome {
    pub fn updated_view(self) -> bool {
        matches!(self, FetchOutcome::Merged | FetchOutcome::Replaced)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PushOutcome {
    Merged,
    /// The cache was absent and the diff was sparse; nothing was cached and
    /// the grid must be rebuilt from a full snapshot.
    NeedsSnapshot,
}

impl SyncState {
    /// Registers one output notification. Returns `true` when the caller must
    /// arm the debounce timer; `false` means a fetch is already pending and
    /// the notification coalesces into it.
    pub fn request_fetch(&mut self) -> bool {
        if self.snapshot_pending {
            return false;
        }
        self.snapshot_pending = true;
        true
    }

    pub fn begin_fetch(&mut self, origin: FetchOrigin) -> FetchTicket {
        self.next_fetch_id += 1;
        let id = FetchId(self.next_fetch_id);
        let (kind, scroll_token) = match origin {
            FetchOrigin::Scheduled => {
                self.snapshot_pending = true;
                self.scheduled_fetch = Some(id);
                let kind = if self.cached.is_some() && self.diff_mode == DiffMode::Supported {
                    FetchKind::Diff
                } else {
                    FetchKind::Full
                };
                (kind, None)
            }
            FetchOrigin::Scroll(token) => (FetchKind::Full, Some(token)),
            FetchOrigin::Refill => (FetchKind::Full, Some(self.scroll_seq)),
        };
        FetchTicket {
            id,
            diff_seq: self.diff_seq,
            scroll_seq: self.scroll_seq,
            scroll_token,
            kind,
        }
    }

    pub fn complete_fetch(&mut self, ticket: FetchTicket, response: FetchResponse) -> FetchOutcome {
        if self.scheduled_fetch == Some(ticket.id) {
            self.scheduled_fetch = None;
            self.snapshot_pending = false;
        }

        if response.diff_failed() && self.diff_mode == DiffMode::Supported {
            self.diff_mode = DiffMode::Unsupported;
            info!(
                target = "gridview::sync",
                "diff reads unsupported by remote; using full snapshots from now on"
            );
        }

        if let FetchResponse::Failed { error, .. } = &response {
            self.stats.fetch_failures += 1;
            debug!(
                target = "gridview::sync",
                error = %error,
                kind = ?ticket.kind,
                "grid fetch failed"
            );
            return FetchOutcome::Failed;
        }

        if self.diff_seq != ticket.diff_seq {
            self.stats.stale_discards += 1;
            debug!(
                target = "gridview::sync",
                captured = ticket.diff_seq,
                current = self.diff_seq,
                "discarding fetch older than a pushed diff"
            );
            return FetchOutcome::Discarded(DiscardReason::PushedDiff);
        }

        match response {
            FetchResponse::Diff(diff) => {
                if self.scroll_seq != ticket.scroll_seq {
                    self.stats.scroll_discards += 1;
                    debug!(target = "gridview::sync", "discarding diff read from before a scroll");
                    return FetchOutcome::Discarded(DiscardReason::Scrolled);
                }
                let Some(cached) = self.cached.as_mut() else {
                    self.stats.invalidated_discards += 1;
                    debug!(target = "gridview::sync", "discarding diff for an invalidated grid");
                    return FetchOutcome::Discarded(DiscardReason::Invalidated);
                };
                let _guard = PerfGuard::new("sync_merge_diff");
                cached.apply_diff(diff);
                self.stats.merged_diffs += 1;
                self.adopt_offsets();
                FetchOutcome::Merged
            }
            FetchResponse::Snapshot { snapshot, .. } => {
                if ticket.scroll_token.is_some_and(|token| token != self.scroll_seq) {
                    self.stats.scroll_discards += 1;
                    debug!(
                        target = "gridview::sync",
                        "discarding snapshot for a superseded scroll"
                    );
                    return FetchOutcome::Discarded(DiscardReason::Scrolled);
                }
                self.cached = Some(snapshot.normalized());
                self.stats.replaced_snapshots += 1;
                self.adopt_offsets();
                FetchOutcome::Replaced
            }
            FetchResponse::Failed { .. } => FetchOutcome::Failed,
        }
    }

    /// Merges a diff pushed by the remote. Push diffs always supersede pulls
    /// in flight and any scheduled pull.
    ///
    /// A sparse diff cannot stand in for an invalidated cache: the cache stays
    /// absent and the caller must start a [`FetchOrigin::Refill`].
    pub fn apply_pushed_diff(&mut self, diff: GridDiff) -> PushOutcome {
        self.diff_seq += 1;
        self.stats.pushed_diffs += 1;
        self.snapshot_pending = false;
        self.scheduled_fetch = None;
        let _guard = PerfGuard::new("sync_push_diff");
        match self.cached.as_mut() {
            Some(cached) => cached.apply_diff(diff),
            None if diff.full_repaint => self.cached = Some(GridSnapshot::from_diff(diff)),
            None => {
                debug!(
                    target = "gridview::sync",
                    dirty = diff.dirty_rows.len(),
                    "sparse push diff without a cached grid; full snapshot needed"
                );
                return PushOutcome::NeedsSnapshot;
            }
        }
        self.adopt_offsets();
        PushOutcome::Merged
    }
}

/// Performs the remote reads for one fetch. A failed diff read falls through
/// to a full snapshot within the same fetch.
pub async fn run_fetch(
    remote: Arc<dyn RemoteGrid>,
    session_id: String,
    kind: FetchKind,
) -> FetchResponse {
    let mut diff_failed = false;
    if kind == FetchKind::Diff {
        match remote.grid_snapshot_diff(&session_id).await {
            Ok(diff) => return FetchResponse::Diff(diff),
            Err(err) => {
                debug!(
                    target = "gridview::sync",
                    error = %err,
                    "diff read failed; falling back to snapshot"
                );
                diff_failed = true;
            }
        }
    }
    match remote.grid_snapshot(&session_id).await {
        Ok(snapshot) => FetchResponse::Snapshot {
            snapshot,
            diff_failed,
        },
        Err(error) => FetchResponse::Failed { diff_failed, error },
    }
}
