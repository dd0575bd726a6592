use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, trace};

use super::{EventStream, OutputSource, RemoteError, RemoteGrid, SessionEvent};
use crate::model::{CellRange, GridDiff, GridSnapshot};
use crate::protocol::{DaemonMessage, Event, Request, Response, read_frame, write_frame};

struct Connection {
    reader: OwnedReadHalf,
    writer: OwnedWriteHalf,
}

impl Connection {
    async fn open(addr: &str) -> Result<Self, RemoteError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let (reader, writer) = stream.into_split();
        Ok(Self { reader, writer })
    }

    async fn roundtrip(&mut self, request: &Request) -> Result<Response, RemoteError> {
        write_frame(&mut self.writer, request).await?;
        loop {
            match read_frame::<_, DaemonMessage>(&mut self.reader).await? {
                Some(DaemonMessage::Response(response)) => return Ok(response),
                Some(DaemonMessage::Event(event)) => {
                    trace!(
                        target = "gridview::daemon",
                        session_id = event.session_id(),
                        "skipping event on request connection"
                    );
                }
                None => return Err(RemoteError::Disconnected),
            }
        }
    }
}

/// Client for the terminal daemon's TCP endpoint.
///
/// Requests are serialized over one lazily opened connection; a transport
/// failure drops it so the following request reconnects. Each subscription
/// gets a dedicated connection.
pub struct DaemonClient {
    addr: String,
    request_timeout: Duration,
    conn: AsyncMutex<Option<Connection>>,
}

impl DaemonClient {
    pub fn new(addr: impl Into<String>, request_timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            request_timeout,
            conn: AsyncMutex::new(None),
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Sends one request. Connecting counts against the same deadline as the
    /// roundtrip.
    async fn request(&self, request: Request) -> Result<Response, RemoteError> {
        let mut guard = self.conn.lock().await;
        let exchange = async {
            if guard.is_none() {
                debug!(
                    target = "gridview::daemon",
                    addr = %self.addr,
                    "opening request connection"
                );
                match Connection::open(&self.addr).await {
                    Ok(conn) => *guard = Some(conn),
                    Err(err) => return Err(err),
                }
            }
            match guard.as_mut() {
                Some(conn) => conn.roundtrip(&request).await,
                None => Err(RemoteError::Disconnected),
            }
        };
        let outcome = tokio::time::timeout(self.request_timeout, exchange).await;
        let result = match outcome {
            Ok(result) => result,
            Err(_) => Err(RemoteError::Timeout),
        };
        if let Err(err) = &result {
            debug!(
                target = "gridview::daemon",
                request = request.name(),
                error = %err,
                "dropping request connection"
            );
            *guard = None;
        }
        match result? {
            Response::Error { message } => Err(RemoteError::Daemon(message)),
            response => Ok(response),
        }
    }

    async fn expect_ok(&self, request: Request) -> Result<(), RemoteError> {
        match self.request(request).await? {
            Response::Ok => Ok(()),
            other => Err(unexpected(&other)),
        }
    }
}

fn unexpected(response: &Response) -> RemoteError {
    RemoteError::UnexpectedResponse(format!("{response:?}"))
}

#[async_trait]
impl RemoteGrid for DaemonClient {
    async fn grid_snapshot(&self, session_id: &str) -> Result<GridSnapshot, RemoteError> {
        let request = Request::ReadRichGrid {
            session_id: session_id.to_string(),
        };
        match self.request(request).await? {
            Response::RichGrid { grid } => Ok(grid),
            other => Err(unexpected(&other)),
        }
    }

    async fn grid_snapshot_diff(&self, session_id: &str) -> Result<GridDiff, RemoteError> {
        let request = Request::ReadRichGridDiff {
            session_id: session_id.to_string(),
        };
        match self.request(request).await? {
            Response::RichGridDiff { diff } => Ok(diff),
            other => Err(unexpected(&other)),
        }
    }

    async fn set_scrollback(&self, session_id: &str, offset: usize) -> Result<(), RemoteError> {
        self.expect_ok(Request::SetScrollback {
            session_id: session_id.to_string(),
            offset,
        })
        .await
    }

    async fn resize_grid(
        &self,
        session_id: &str,
        rows: u16,
        cols: u16,
    ) -> Result<(), RemoteError> {
        self.expect_ok(Request::Resize {
            session_id: session_id.to_string(),
            rows,
            cols,
        })
        .await
    }

    async fn write_input(&self, session_id: &str, bytes: &[u8]) -> Result<(), RemoteError> {
        self.expect_ok(Request::Write {
            session_id: session_id.to_string(),
            data: bytes.to_vec(),
        })
        .await
    }

    async fn read_grid_text(
        &self,
        session_id: &str,
        range: CellRange,
    ) -> Result<String, RemoteError> {
        let request = Request::ReadGridText {
            session_id: session_id.to_string(),
            start_row: range.start.row,
            start_col: range.start.col,
            end_row: range.end.row,
            end_col: range.end.col,
        };
        match self.request(request).await? {
            Response::GridText { text } => Ok(text),
            other => Err(unexpected(&other)),
        }
    }
}

fn session_event(event: Event, session_id: &str) -> Option<SessionEvent> {
    if event.session_id() != session_id {
        return None;
    }
    Some(match event {
        Event::Output { .. } => SessionEvent::OutputAvailable,
        Event::GridDiff { diff, .. } => SessionEvent::GridDiff(diff),
        Event::SessionClosed { .. } => SessionEvent::SessionEnded,
    })
}

struct Subscription {
    reader: OwnedReadHalf,
    // Held so the daemon keeps the attachment open; dropping it half-closes the socket.
    _writer: OwnedWriteHalf,
    session_id: String,
}

#[async_trait]
impl OutputSource for DaemonClient {
    async fn subscribe(&self, session_id: &str) -> Result<EventStream, RemoteError> {
        let attach = Request::Attach {
            session_id: session_id.to_string(),
        };
        let (conn, response) = tokio::time::timeout(self.request_timeout, async {
            let mut conn = Connection::open(&self.addr).await?;
            let response = conn.roundtrip(&attach).await?;
            Ok::<_, RemoteError>((conn, response))
        })
        .await
        .map_err(|_| RemoteError::Timeout)??;
        match response {
            Response::Ok => {}
            Response::Error { message } => return Err(RemoteError::Daemon(message)),
            other => return Err(unexpected(&other)),
        }
        debug!(target = "gridview::daemon", session_id, "attached output subscription");

        let state = Subscription {
            reader: conn.reader,
            _writer: conn.writer,
            session_id: session_id.to_string(),
        };
        let stream = futures::stream::unfold(Some(state), |state| async move {
            let mut state = state?;
            loop {
                match read_frame::<_, DaemonMessage>(&mut state.reader).await {
                    Ok(Some(DaemonMessage::Event(event))) => {
                        if let Some(event) = session_event(event, &state.session_id) {
                            return Some((Ok(event), Some(state)));
                        }
                    }
                    Ok(Some(DaemonMessage::Response(_))) => continue,
                    Ok(None) => return None,
                    Err(err) => return Some((Err(RemoteError::from(err)), None)),
                }
            }
        });
        Ok(stream.boxed())
    }
}
