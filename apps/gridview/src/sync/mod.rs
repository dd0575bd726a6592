//! Grid synchronization: keeps a local copy of a remote session's grid
//! current through pulled diffs/snapshots and pushed diffs, and drives
//! scrolling, selection auto-scroll and resizes against the remote.

pub mod autoscroll;
pub mod engine;
pub mod fetch;
pub mod resize;
pub mod scroll;
pub mod state;

pub use autoscroll::{SelectionAutoScroller, SelectionPoint, TickerChange, auto_scroll_rate};
pub use engine::{GridSync, GridSyncHandle, ViewState};
pub use fetch::{
    DiscardReason, FetchKind, FetchOrigin, FetchOutcome, FetchResponse, FetchTicket, PushOutcome,
    run_fetch,
};
pub use resize::{CellMetrics, ContainerSize, FitDecision, grid_size_for};
pub use scroll::{ScrollIntent, ScrollTicket};
pub use state::{DiffMode, Seq, SyncState, SyncStats};
