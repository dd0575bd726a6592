use parking_lot::Mutex;

use crate::model::GridSnapshot;

/// Presentation collaborator notified from the engine task. Implementations
/// must not block.
pub trait ViewSink: Send + Sync {
    /// Called after every merge that changed the cached grid.
    fn snapshot_ready(&self, snapshot: &GridSnapshot);

    fn title_changed(&self, title: &str);
}

/// Keeps every notification for later inspection.
#[derive(Default)]
pub struct RecordingSink {
    snapshots: Mutex<Vec<GridSnapshot>>,
    titles: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshots(&self) -> Vec<GridSnapshot> {
        self.snapshots.lock().clone()
    }

    pub fn snapshot_count(&self) -> usize {
        self.snapshots.lock().len()
    }

    pub fn last_snapshot(&self) -> Option<GridSnapshot> {
        self.snapshots.lock().last().cloned()
    }

    pub fn titles(&self) -> Vec<String> {
        self.titles.lock().clone()
    }
}

impl ViewSink for RecordingSink {
    fn snapshot_ready(&self, snapshot: &GridSnapshot) {
        self.snapshots.lock().push(snapshot.clone());
    }

    fn title_changed(&self, title: &str) {
        self.titles.lock().push(title.to_string());
    }
}
