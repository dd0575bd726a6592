use crate::model::{GridDimensions, GridSnapshot};

use super::fetch::FetchId;

/// Monotonic staleness counter.
pub type Seq = u64;

/// Viewport height assumed before the first snapshot or fit.
pub const DEFAULT_VIEWPORT_ROWS: u16 = 24;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DiffMode {
    #[default]
    Supported,
    /// Set after the first failed diff read; never reverts for this pane.
    Unsupported,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub pushed_diffs: u64,
    pub merged_diffs: u64,
    pub replaced_snapshots: u64,
    /// Pull responses dropped because a push diff landed while they were in flight.
    pub stale_discards: u64,
    pub scroll_discards: u64,
    pub invalidated_discards: u64,
    pub fetch_failures: u64,
    pub suppressed_resizes: u64,
}

/// Client-side view of one remote session's grid.
///
/// Owned by a single task; every mutation goes through the fetch, scroll and
/// resize operations on this type. In-flight remote work carries the
/// `diff_seq`/`scroll_seq` values it captured and is re-validated against the
/// current counters before it may write.
#[derive(Debug, Default)]
pub struct SyncState {
    pub(super) cached: Option<GridSnapshot>,
    pub(super) diff_seq: Seq,
    pub(super) scroll_seq: Seq,
    pub(super) scrollback_offset: usize,
    pub(super) total_scrollback: usize,
    pub(super) user_scrolled: bool,
    pub(super) snapshot_pending: bool,
    pub(super) scheduled_fetch: Option<FetchId>,
    pub(super) next_fetch_id: u64,
    pub(super) diff_mode: DiffMode,
    pub(super) fitted: Option<GridDimensions>,
    pub(super) announced_title: Option<String>,
    pub(super) stats: SyncStats,
}

impl SyncState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cached(&self) -> Option<&GridSnapshot> {
        self.cached.as_ref()
    }

    pub fn diff_seq(&self) -> Seq {
        self.diff_seq
    }

    pub fn scroll_seq(&self) -> Seq {
        self.scroll_seq
    }

    pub fn scrollback_offset(&self) -> usize {
        self.scrollback_offset
    }

    pub fn total_scrollback(&self) -> usize {
        self.total_scrollback
    }

    pub fn is_user_scrolled(&self) -> bool {
        self.user_scrolled
    }

    pub fn snapshot_pending(&self) -> bool {
        self.snapshot_pending
    }

    pub fn diff_mode(&self) -> DiffMode {
        self.diff_mode
    }

    pub fn fitted(&self) -> Option<GridDimensions> {
        self.fitted
    }

    pub fn stats(&self) -> &SyncStats {
        &self.stats
    }

    /// Height used to size page scrolls and clamp selection anchors.
    pub fn viewport_rows(&self) -> u16 {
        self.cached
            .as_ref()
            .map(|snapshot| snapshot.dimensions.rows)
            .or(self.fitted.map(|dims| dims.rows))
            .filter(|rows| *rows > 0)
            .unwrap_or(DEFAULT_VIEWPORT_ROWS)
    }

    /// Returns the cached title once each time it changes.
    pub fn take_title_change(&mut self) -> Option<String> {
        let title = self.cached.as_ref()?.title.as_ref()?;
        if self.announced_title.as_ref() == Some(title) {
            return None;
        }
        self.announced_title = Some(title.clone());
        Some(title.clone())
    }

    /// Drops the cached grid so the next fetch is a full snapshot.
    pub fn invalidate(&mut self) {
        self.cached = None;
    }

    /// Takes scrollback totals from the freshly merged cache.
    ///
    /// The remote offset is adopted only while the user sits at the live view;
    /// otherwise the local offset stays authoritative and is clamped to the
    /// new total.
    pub(super) fn adopt_offsets(&mut self) {
        let Some(snapshot) = self.cached.as_ref() else {
            return;
        };
        self.total_scrollback = snapshot.total_scrollback;
        if self.user_scrolled {
            self.scrollback_offset = self.scrollback_offset.min(self.total_scrollback);
            self.user_scrolled = self.scrollback_offset > 0;
        } else {
            self.scrollback_offset = snapshot.scrollback_offset.min(self.total_scrollback);
        }
    }
}
