use crate::model::{CellRange, CursorPos};

/// Upper bound on lines scrolled per auto-scroll tick.
pub const MAX_AUTO_SCROLL_RATE: i64 = 10;

/// Lines per tick for a drag pointer at `row` (viewport-relative, unclamped).
///
/// Above the viewport scrolls into history (positive); at or below the last
/// row scrolls toward live output (negative). Inside the viewport there is no
/// auto-scroll.
pub fn auto_scroll_rate(row: f64, viewport_rows: u16) -> Option<i64> {
    if !row.is_finite() {
        return None;
    }
    let rows = f64::from(viewport_rows);
    if row < 0.0 {
        Some((row.abs().ceil() as i64).clamp(1, MAX_AUTO_SCROLL_RATE))
    } else if row >= rows {
        let overshoot = (row - rows).floor() as i64;
        Some(-(overshoot + 1).min(MAX_AUTO_SCROLL_RATE))
    } else {
        None
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SelectionPoint {
    pub row: u16,
    pub col: u16,
}

impl From<SelectionPoint> for CursorPos {
    fn from(point: SelectionPoint) -> Self {
        CursorPos {
            row: point.row,
            col: point.col,
        }
    }
}

/// What the owner of the tick timer should do after a pointer update.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickerChange {
    Start,
    Stop,
    Keep,
}

/// Drag-selection tracking for auto-scroll.
#[derive(Debug, Default)]
pub struct SelectionAutoScroller {
    anchor: Option<SelectionPoint>,
    head: Option<SelectionPoint>,
    rate: Option<i64>,
}

impl SelectionAutoScroller {
    pub fn begin(&mut self, anchor: SelectionPoint) {
        self.anchor = Some(anchor);
        self.head = Some(anchor);
        self.rate = None;
    }

    pub fn is_dragging(&self) -> bool {
        self.anchor.is_some()
    }

    pub fn anchor(&self) -> Option<SelectionPoint> {
        self.anchor
    }

    pub fn head(&self) -> Option<SelectionPoint> {
        self.head
    }

    pub fn rate(&self) -> Option<i64> {
        self.rate
    }

    pub fn pointer_moved(&mut self, row: f64, col: u16, viewport_rows: u16) -> TickerChange {
        if !self.is_dragging() {
            return TickerChange::Keep;
        }
        self.head = Some(SelectionPoint {
            row: clamp_row(row, viewport_rows),
            col,
        });
        let was_active = self.rate.is_some();
        self.rate = auto_scroll_rate(row, viewport_rows);
        match (was_active, self.rate.is_some()) {
            (false, true) => TickerChange::Start,
            (true, false) => TickerChange::Stop,
            _ => TickerChange::Keep,
        }
    }

    /// Moves the anchor with the content after a tick scrolled `applied` lines.
    pub fn shift_anchor(&mut self, applied: i64, viewport_rows: u16) {
        if let Some(anchor) = self.anchor.as_mut() {
            let max_row = i64::from(viewport_rows.saturating_sub(1));
            anchor.row = (i64::from(anchor.row) + applied).clamp(0, max_row) as u16;
        }
    }

    /// Ends the drag and returns the selected cells, or `None` without a drag.
    pub fn end(&mut self) -> Option<CellRange> {
        self.rate = None;
        let anchor = self.anchor.take()?;
        let head = self.head.take().unwrap_or(anchor);
        Some(CellRange::between(anchor.into(), head.into()))
    }
}

fn clamp_row(row: f64, viewport_rows: u16) -> u16 {
    if !row.is_finite() || row <= 0.0 {
        return 0;
    }
    (row.floor() as u64).min(u64::from(viewport_rows.saturating_sub(1))) as u16
}
