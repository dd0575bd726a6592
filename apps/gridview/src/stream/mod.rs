//! Long-lived per-session event subscription with reconnect.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::SyncTuning;
use crate::model::GridDiff;
use crate::remote::{OutputSource, SessionEvent};
use crate::sync::GridSyncHandle;

/// Capped exponential reconnect delay.
#[derive(Clone, Debug)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        let max = max.max(base);
        Self {
            base,
            max,
            current: base,
        }
    }

    pub fn from_tuning(tuning: &SyncTuning) -> Self {
        Self::new(tuning.reconnect_base, tuning.reconnect_max)
    }

    /// Returns the delay to wait now and doubles the following one.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.base;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::from_tuning(&SyncTuning::default())
    }
}

/// Receives the session's events from the stream client.
pub trait OutputListener: Send + Sync {
    fn output_available(&self);

    fn grid_diff(&self, diff: GridDiff);
}

impl OutputListener for GridSyncHandle {
    fn output_available(&self) {
        self.notify_output();
    }

    fn grid_diff(&self, diff: GridDiff) {
        self.apply_pushed_diff(diff);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamExit {
    Cancelled,
    SessionEnded,
}

/// Keeps an event subscription open for one session, reconnecting with
/// [`Backoff`] after every drop until the session ends or `cancel` fires.
pub struct OutputStreamClient {
    session_id: String,
    source: Arc<dyn OutputSource>,
    listener: Arc<dyn OutputListener>,
    backoff: Backoff,
    cancel: CancellationToken,
}

impl OutputStreamClient {
    pub fn new(
        session_id: impl Into<String>,
        source: Arc<dyn OutputSource>,
        listener: Arc<dyn OutputListener>,
        backoff: Backoff,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            source,
            listener,
            backoff,
            cancel,
        }
    }

    pub async fn run(mut self) -> StreamExit {
        let mut attempt: u32 = 0;
        loop {
            attempt = attempt.saturating_add(1);
            let connected = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return StreamExit::Cancelled,
                result = self.source.subscribe(&self.session_id) => result,
            };

            match connected {
                Ok(mut events) => {
                    debug!(
                        target = "gridview::stream",
                        session_id = %self.session_id,
                        attempt,
                        "output stream connected"
                    );
                    loop {
                        let next = tokio::select! {
                            biased;
                            _ = self.cancel.cancelled() => return StreamExit::Cancelled,
                            next = events.next() => next,
                        };
                        match next {
                            Some(Ok(event)) => {
                                self.backoff.reset();
                                attempt = 0;
                                match event {
                                    SessionEvent::OutputAvailable => {
                                        self.listener.output_available()
                                    }
                                    SessionEvent::GridDiff(diff) => self.listener.grid_diff(diff),
                                    SessionEvent::SessionEnded => {
                                        info!(
                                            target = "gridview::stream",
                                            session_id = %self.session_id,
                                            "session ended"
                                        );
                                        return StreamExit::SessionEnded;
                                    }
                                }
                            }
                            Some(Err(err)) => {
                                debug!(
                                    target = "gridview::stream",
                                    error = %err,
                                    "output stream errored"
                                );
                                break;
                            }
                            None => {
                                debug!(target = "gridview::stream", "output stream ended");
                                break;
                            }
                        }
                    }
                }
                Err(err) => {
                    debug!(
                        target = "gridview::stream",
                        session_id = %self.session_id,
                        attempt,
                        error = %err,
                        "output stream connect failed"
                    );
                }
            }

            let delay = self.backoff.next_delay();
            debug!(
                target = "gridview::stream",
                delay_ms = delay.as_millis() as u64,
                "reconnecting output stream"
            );
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return StreamExit::Cancelled,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_to_cap_and_resets() {
        let mut backoff = Backoff::new(Duration::from_millis(1_000), Duration::from_millis(10_000));
        let delays: Vec<u64> = (0..6).map(|_| backoff.next_delay().as_millis() as u64).collect();
        assert_eq!(delays, vec![1_000, 2_000, 4_000, 8_000, 10_000, 10_000]);
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_millis(1_000));
    }

    #[test]
    fn default_backoff_matches_tuning() {
        let mut backoff = Backoff::default();
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
        assert_eq!(backoff.next_delay(), Duration::from_secs(2));
    }
}
