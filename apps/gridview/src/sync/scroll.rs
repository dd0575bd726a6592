use super::state::{Seq, SyncState};

/// A user scroll request. Positive line and page counts move into history.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScrollIntent {
    Lines(i64),
    Pages(i64),
    Top,
    Bottom,
    Offset(usize),
}

/// Issued when a scroll changed the offset; the remote `set_scrollback` call
/// and its follow-up fetch are bound to `scroll_seq`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScrollTicket {
    pub offset: usize,
    pub scroll_seq: Seq,
}

impl SyncState {
    /// Offset `intent` would move to, clamped to `[0, total_scrollback]`.
    pub fn scroll_target(&self, intent: ScrollIntent) -> usize {
        let total = self.total_scrollback;
        let relative = |delta: i64| {
            let target = (self.scrollback_offset as i64).saturating_add(delta);
            target.clamp(0, total as i64) as usize
        };
        match intent {
            ScrollIntent::Lines(delta) => relative(delta),
            ScrollIntent::Pages(pages) => {
                relative(pages.saturating_mul(i64::from(self.viewport_rows())))
            }
            ScrollIntent::Top => total,
            ScrollIntent::Bottom => 0,
            ScrollIntent::Offset(offset) => offset.min(total),
        }
    }

    /// Applies a scroll locally. Returns `None` when the clamped offset is
    /// unchanged; otherwise the cache is invalidated, since a different
    /// scroll position cannot be diffed against the rows on screen.
    pub fn scroll(&mut self, intent: ScrollIntent) -> Option<ScrollTicket> {
        let target = self.scroll_target(intent);
        if target == self.scrollback_offset {
            return None;
        }
        self.scrollback_offset = target;
        self.user_scrolled = target > 0;
        self.scroll_seq += 1;
        self.cached = None;
        Some(ScrollTicket {
            offset: target,
            scroll_seq: self.scroll_seq,
        })
    }

    pub fn snap_to_bottom(&mut self) -> Option<ScrollTicket> {
        self.scroll(ScrollIntent::Bottom)
    }

    pub fn is_current_scroll(&self, ticket: &ScrollTicket) -> bool {
        self.scroll_seq == ticket.scroll_seq
    }

    /// The remote did not take the current scroll's offset. The local offset
    /// goes back to following whatever the next snapshot reports.
    pub fn scroll_rejected(&mut self) {
        self.user_scrolled = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GridDimensions, GridSnapshot};

    fn with_history(total: usize) -> SyncState {
        let mut state = SyncState::new();
        state.total_scrollback = total;
        state.cached = Some(GridSnapshot::blank(GridDimensions::new(10, 20)));
        state.fitted = Some(GridDimensions::new(10, 20));
        state
    }

    #[test]
    fn scrolling_up_invalidates_and_marks_user_scrolled() {
        let mut state = with_history(100);
        let ticket = state.scroll(ScrollIntent::Lines(3)).expect("offset changed");
        assert_eq!(ticket, ScrollTicket { offset: 3, scroll_seq: 1 });
        assert!(state.is_user_scrolled());
        assert!(state.cached().is_none());

        let ticket = state.snap_to_bottom().expect("back to live");
        assert_eq!(ticket.offset, 0);
        assert!(!state.is_user_scrolled());
        assert_eq!(state.scroll_seq(), 2);
    }

    #[test]
    fn rejected_scroll_follows_remote_offset_again() {
        let mut state = with_history(100);
        state.scroll(ScrollIntent::Lines(6)).expect("scrolled");
        state.scroll_rejected();

        let mut snapshot = GridSnapshot::blank(GridDimensions::new(10, 20));
        snapshot.total_scrollback = 100;
        snapshot.scrollback_offset = 0;
        state.cached = Some(snapshot);
        state.adopt_offsets();
        assert_eq!(state.scrollback_offset(), 0);
        assert!(!state.is_user_scrolled());
    }

    #[test]
    fn unchanged_offset_is_a_noop() {
        let mut state = with_history(100);
        assert!(state.scroll(ScrollIntent::Lines(-5)).is_none());
        assert!(state.scroll(ScrollIntent::Bottom).is_none());
        assert_eq!(state.scroll_seq(), 0);
        assert!(state.cached().is_some());
    }

    #[test]
    fn offset_stays_within_history_for_any_sequence() {
        let mut state = with_history(37);
        let deltas = [5, 100, -3, -200, 37, 1, -1, 0, 64, -64, 12];
        for delta in deltas {
            state.scroll(ScrollIntent::Lines(delta));
            assert!(state.scrollback_offset() <= state.total_scrollback());
        }
        state.scroll(ScrollIntent::Pages(50));
        assert_eq!(state.scrollback_offset(), 37);
        state.scroll(ScrollIntent::Offset(1_000));
        assert_eq!(state.scrollback_offset(), 37);
        state.scroll(ScrollIntent::Pages(-1));
        assert_eq!(state.scrollback_offset(), 27);
    }

    #[test]
    fn pages_use_viewport_height() {
        let mut state = with_history(100);
        let ticket = state.scroll(ScrollIntent::Pages(2)).expect("scrolled");
        assert_eq!(ticket.offset, 20);
        assert!(state.scroll(ScrollIntent::Top).is_some());
        assert_eq!(state.scrollback_offset(), 100);
    }

    #[test]
    fn newer_scroll_supersedes_ticket() {
        let mut state = with_history(50);
        let first = state.scroll(ScrollIntent::Lines(1)).expect("scrolled");
        assert!(state.is_current_scroll(&first));
        state.scroll(ScrollIntent::Lines(1));
        assert!(!state.is_current_scroll(&first));
    }
}
