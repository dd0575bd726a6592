use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::SyncTuning;
use crate::remote::{OutputSource, RemoteGrid};
use crate::stream::{Backoff, OutputStreamClient, StreamExit};
use crate::sync::{GridSync, GridSyncHandle};
use crate::view::ViewSink;

/// A mounted terminal pane: the sync engine plus, when a source is given,
/// the output stream feeding it. Both stop on one cancellation token, which
/// is also fired when the pane is dropped.
pub struct Pane {
    session_id: String,
    handle: GridSyncHandle,
    cancel: CancellationToken,
    engine: Option<JoinHandle<()>>,
    stream: Option<JoinHandle<StreamExit>>,
}

impl Pane {
    pub fn mount(
        session_id: impl Into<String>,
        remote: Arc<dyn RemoteGrid>,
        source: Option<Arc<dyn OutputSource>>,
        sink: Arc<dyn ViewSink>,
        tuning: SyncTuning,
    ) -> Self {
        let session_id = session_id.into();
        let cancel = CancellationToken::new();
        let (handle, engine) =
            GridSync::spawn(session_id.clone(), remote, sink, tuning, cancel.child_token());
        let stream = source.map(|source| {
            let client = OutputStreamClient::new(
                session_id.clone(),
                source,
                Arc::new(handle.clone()),
                Backoff::from_tuning(&tuning),
                cancel.child_token(),
            );
            tokio::spawn(client.run())
        });
        debug!(
            target = "gridview::pane",
            session_id = %session_id,
            streaming = stream.is_some(),
            "pane mounted"
        );
        Self {
            session_id,
            handle,
            cancel,
            engine: Some(engine),
            stream,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn handle(&self) -> &GridSyncHandle {
        &self.handle
    }

    /// Resolves when the stream client stops on its own, i.e. the session
    /// ended. Returns `None` immediately for panes mounted without a source.
    pub async fn session_ended(&mut self) -> Option<StreamExit> {
        let stream = self.stream.as_mut()?;
        let exit = stream.await.ok();
        self.stream = None;
        exit
    }

    /// Cancels the engine and stream and waits for both to stop. Returns how
    /// the stream client exited, if one was running.
    pub async fn destroy(mut self) -> Option<StreamExit> {
        self.cancel.cancel();
        if let Some(engine) = self.engine.take() {
            let _ = engine.await;
        }
        let exit = match self.stream.take() {
            Some(stream) => stream.await.ok(),
            None => None,
        };
        debug!(target = "gridview::pane", session_id = %self.session_id, ?exit, "pane destroyed");
        exit
    }
}

impl Drop for Pane {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
