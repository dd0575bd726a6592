//! Interfaces to the process that owns the authoritative grid.
//!
//! [`RemoteGrid`] covers the request/response calls the engine issues and
//! [`OutputSource`] the long-lived per-session event subscription. Both may
//! fail with a [`RemoteError`]; callers treat every failure as transient.

pub mod daemon;
pub mod mock;

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

use crate::model::{CellRange, GridDiff, GridSnapshot};
use crate::protocol::FrameError;

pub use daemon::DaemonClient;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),
    #[error("daemon error: {0}")]
    Daemon(String),
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
    #[error("connection closed")]
    Disconnected,
    #[error("request timed out")]
    Timeout,
}

#[async_trait]
pub trait RemoteGrid: Send + Sync {
    async fn grid_snapshot(&self, session_id: &str) -> Result<GridSnapshot, RemoteError>;

    /// Rows changed since the previous read. Daemons without diff support fail this call.
    async fn grid_snapshot_diff(&self, session_id: &str) -> Result<GridDiff, RemoteError>;

    async fn set_scrollback(&self, session_id: &str, offset: usize) -> Result<(), RemoteError>;

    async fn resize_grid(&self, session_id: &str, rows: u16, cols: u16)
    -> Result<(), RemoteError>;

    async fn write_input(&self, session_id: &str, bytes: &[u8]) -> Result<(), RemoteError>;

    /// Text of `range` at the remote's current scrollback position.
    async fn read_grid_text(&self, session_id: &str, range: CellRange)
    -> Result<String, RemoteError>;
}

/// Notification pushed by the remote process for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// New output was parsed; the data itself is pulled separately.
    OutputAvailable,
    GridDiff(GridDiff),
    SessionEnded,
}

pub type EventStream = BoxStream<'static, Result<SessionEvent, RemoteError>>;

#[async_trait]
pub trait OutputSource: Send + Sync {
    /// Opens a live subscription. The stream ends (or yields an error) when the
    /// connection drops; dropping it closes the subscription.
    async fn subscribe(&self, session_id: &str) -> Result<EventStream, RemoteError>;
}
