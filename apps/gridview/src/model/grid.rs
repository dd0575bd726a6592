use serde::{Deserialize, Serialize};

use super::diff::GridDiff;

fn default_color() -> String {
    "default".to_string()
}

/// One styled character cell as rendered by the daemon.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Cell {
    pub content: String,
    pub fg: String,
    pub bg: String,
    pub bold: bool,
    pub dim: bool,
    pub italic: bool,
    pub underline: bool,
    pub inverse: bool,
    pub wide: bool,
    pub wide_continuation: bool,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            content: String::new(),
            fg: default_color(),
            bg: default_color(),
            bold: false,
            dim: false,
            italic: false,
            underline: false,
            inverse: false,
            wide: false,
            wide_continuation: false,
        }
    }
}

impl Cell {
    pub fn blank() -> Self {
        Self::default()
    }

    pub fn from_char(ch: char) -> Self {
        Self {
            content: ch.to_string(),
            ..Self::default()
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    pub cells: Vec<Cell>,
    #[serde(default)]
    pub wrapped: bool,
}

impl Row {
    pub fn blank(cols: u16) -> Self {
        Self {
            cells: vec![Cell::blank(); cols as usize],
            wrapped: false,
        }
    }

    /// Builds a row holding `text`, padded with blank cells up to `cols`.
    pub fn from_text(text: &str, cols: u16) -> Self {
        let mut cells: Vec<Cell> = text.chars().map(Cell::from_char).collect();
        if cells.len() < cols as usize {
            cells.resize(cols as usize, Cell::blank());
        }
        Self {
            cells,
            wrapped: false,
        }
    }

    /// Plain text of the row with trailing blanks removed.
    pub fn text(&self) -> String {
        let mut out = String::with_capacity(self.cells.len());
        for cell in &self.cells {
            if cell.wide_continuation {
                continue;
            }
            if cell.content.is_empty() {
                out.push(' ');
            } else {
                out.push_str(&cell.content);
            }
        }
        out.trim_end().to_string()
    }

    pub fn width(&self) -> usize {
        self.cells.len()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorPos {
    pub row: u16,
    pub col: u16,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridDimensions {
    pub rows: u16,
    pub cols: u16,
}

impl GridDimensions {
    pub fn new(rows: u16, cols: u16) -> Self {
        Self { rows, cols }
    }
}

/// Inclusive span of cells in viewport coordinates, `start` first in reading order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CellRange {
    pub start: CursorPos,
    pub end: CursorPos,
}

impl CellRange {
    /// Orders two selection endpoints, whichever was dragged from.
    pub fn between(a: CursorPos, b: CursorPos) -> Self {
        if (a.row, a.col) <= (b.row, b.col) {
            Self { start: a, end: b }
        } else {
            Self { start: b, end: a }
        }
    }
}

/// Complete copy of the remote grid's visible state.
///
/// After any merge `rows.len() == dimensions.rows` holds; [`GridSnapshot::normalize`]
/// restores it for snapshots received from the wire.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridSnapshot {
    pub rows: Vec<Row>,
    pub cursor: CursorPos,
    pub dimensions: GridDimensions,
    #[serde(default)]
    pub alternate_screen: bool,
    #[serde(default)]
    pub cursor_hidden: bool,
    #[serde(default)]
    pub title: Option<String>,
    /// 0 = live view, >0 = scrolled into history.
    #[serde(default)]
    pub scrollback_offset: usize,
    #[serde(default)]
    pub total_scrollback: usize,
}

impl GridSnapshot {
    pub fn blank(dimensions: GridDimensions) -> Self {
        Self {
            rows: vec![Row::blank(dimensions.cols); dimensions.rows as usize],
            dimensions,
            ..Self::default()
        }
    }

    /// Builds a snapshot from plain text lines; the grid is `lines.len()` rows tall.
    pub fn from_lines(lines: &[&str], cols: u16) -> Self {
        let dimensions = GridDimensions::new(lines.len() as u16, cols);
        Self {
            rows: lines.iter().map(|line| Row::from_text(line, cols)).collect(),
            dimensions,
            ..Self::default()
        }
    }

    /// Merges `diff` onto a blank grid of the diff's dimensions.
    pub fn from_diff(diff: GridDiff) -> Self {
        let mut snapshot = Self::blank(diff.dimensions);
        snapshot.apply_diff(diff);
        snapshot
    }

    pub fn normalize(&mut self) {
        if self.title.as_deref() == Some("") {
            self.title = None;
        }
        let target = self.dimensions.rows as usize;
        if self.rows.len() != target {
            let cols = self.dimensions.cols;
            self.rows.resize_with(target, || Row::blank(cols));
        }
    }

    pub fn normalized(mut self) -> Self {
        self.normalize();
        self
    }

    /// Merges a sparse diff into this snapshot.
    ///
    /// The row array is resized to the diff's row count first (growing with
    /// blank rows or truncating), then every dirty row inside the new bounds
    /// is overwritten. Metadata is always taken from the diff; the title only
    /// when the diff carries a non-empty one.
    pub fn apply_diff(&mut self, diff: GridDiff) {
        let target = diff.dimensions.rows as usize;
        if diff.full_repaint || self.rows.len() != target {
            let cols = diff.dimensions.cols;
            self.rows.resize_with(target, || Row::blank(cols));
        }
        for (index, row) in diff.dirty_rows {
            if let Some(slot) = self.rows.get_mut(index as usize) {
                *slot = row;
            }
        }
        self.cursor = diff.cursor;
        self.dimensions = diff.dimensions;
        self.cursor_hidden = diff.cursor_hidden;
        self.alternate_screen = diff.alternate_screen;
        self.scrollback_offset = diff.scrollback_offset;
        self.total_scrollback = diff.total_scrollback;
        if let Some(title) = diff.title.filter(|title| !title.is_empty()) {
            self.title = Some(title);
        }
    }

    pub fn row_text(&self, index: usize) -> Option<String> {
        self.rows.get(index).map(Row::text)
    }

    pub fn text_lines(&self) -> Vec<String> {
        self.rows.iter().map(Row::text).collect()
    }

    /// Text covered by `range`, one line per row. Rows outside the grid are skipped.
    pub fn text_in(&self, range: CellRange) -> String {
        let mut lines = Vec::new();
        for index in range.start.row..=range.end.row {
            let Some(text) = self.row_text(index as usize) else {
                break;
            };
            let chars: Vec<char> = text.chars().collect();
            let from = if index == range.start.row {
                range.start.col as usize
            } else {
                0
            };
            let to = if index == range.end.row {
                (range.end.col as usize + 1).min(chars.len())
            } else {
                chars.len()
            };
            let slice = chars.get(from..to.max(from)).unwrap_or_default();
            lines.push(slice.iter().collect::<String>());
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diff_with(rows: u16, cols: u16, dirty: Vec<(u16, Row)>, full_repaint: bool) -> GridDiff {
        GridDiff {
            dirty_rows: dirty,
            dimensions: GridDimensions::new(rows, cols),
            full_repaint,
            ..GridDiff::default()
        }
    }

    #[test]
    fn full_repaint_grows_rows_and_keeps_clean_ones() {
        let lines: Vec<String> = (0..24).map(|i| format!("line {i}")).collect();
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        let mut snapshot = GridSnapshot::from_lines(&refs, 80);
        assert_eq!(snapshot.rows.len(), 24);

        let diff = diff_with(
            30,
            80,
            vec![(3, Row::from_text("dirty", 80)), (27, Row::from_text("new", 80))],
            true,
        );
        snapshot.apply_diff(diff);

        assert_eq!(snapshot.rows.len(), 30);
        assert_eq!(snapshot.dimensions.rows, 30);
        assert_eq!(snapshot.row_text(0).as_deref(), Some("line 0"));
        assert_eq!(snapshot.row_text(3).as_deref(), Some("dirty"));
        assert_eq!(snapshot.row_text(23).as_deref(), Some("line 23"));
        assert_eq!(snapshot.row_text(24).as_deref(), Some(""));
        assert_eq!(snapshot.row_text(27).as_deref(), Some("new"));
        assert_eq!(snapshot.rows[29].width(), 80);
    }

    #[test]
    fn full_repaint_truncates_and_ignores_out_of_range_rows() {
        let mut snapshot = GridSnapshot::from_lines(&["a", "b", "c", "d"], 10);
        let dirty = vec![(1, Row::from_text("B", 10)), (3, Row::from_text("x", 10))];
        let diff = diff_with(2, 10, dirty, true);
        snapshot.apply_diff(diff);
        assert_eq!(snapshot.text_lines(), vec!["a".to_string(), "B".to_string()]);
    }

    #[test]
    fn sparse_diff_only_touches_named_rows() {
        let mut snapshot = GridSnapshot::from_lines(&["one", "two", "three"], 10);
        snapshot.title = Some("shell".into());
        let mut diff = diff_with(3, 10, vec![(1, Row::from_text("TWO", 10))], false);
        diff.cursor = CursorPos { row: 1, col: 3 };
        diff.total_scrollback = 40;
        snapshot.apply_diff(diff);

        assert_eq!(snapshot.text_lines(), vec!["one", "TWO", "three"]);
        assert_eq!(snapshot.cursor, CursorPos { row: 1, col: 3 });
        assert_eq!(snapshot.total_scrollback, 40);
        assert_eq!(snapshot.title.as_deref(), Some("shell"));
    }

    #[test]
    fn from_diff_builds_a_complete_grid() {
        let diff = diff_with(4, 6, vec![(2, Row::from_text("mid", 6))], false);
        let snapshot = GridSnapshot::from_diff(diff);
        assert_eq!(snapshot.rows.len(), 4);
        assert_eq!(snapshot.text_lines(), vec!["", "", "mid", ""]);
    }

    #[test]
    fn empty_titles_never_replace_a_real_one() {
        let mut snapshot = GridSnapshot::from_lines(&["$"], 4);
        snapshot.title = Some("vim".into());
        let mut diff = diff_with(1, 4, Vec::new(), false);
        diff.title = Some(String::new());
        snapshot.apply_diff(diff);
        assert_eq!(snapshot.title.as_deref(), Some("vim"));

        let mut wire = GridSnapshot::from_lines(&["$"], 4);
        wire.title = Some(String::new());
        assert_eq!(wire.normalized().title, None);
    }

    #[test]
    fn text_in_spans_rows_in_reading_order() {
        let snapshot = GridSnapshot::from_lines(&["hello world", "second", "third line"], 12);
        let range = CellRange::between(CursorPos { row: 2, col: 4 }, CursorPos { row: 0, col: 6 });
        assert_eq!(range.start, CursorPos { row: 0, col: 6 });
        assert_eq!(snapshot.text_in(range), "world\nsecond\nthird");

        let single = CellRange::between(CursorPos { row: 1, col: 0 }, CursorPos { row: 1, col: 2 });
        assert_eq!(snapshot.text_in(single), "sec");
        let past_end =
            CellRange::between(CursorPos { row: 1, col: 9 }, CursorPos { row: 7, col: 0 });
        assert_eq!(snapshot.text_in(past_end), "\nthird line");
    }

    #[test]
    fn normalize_pads_short_wire_snapshots() {
        let mut snapshot = GridSnapshot::from_lines(&["x"], 5);
        snapshot.dimensions.rows = 3;
        let snapshot = snapshot.normalized();
        assert_eq!(snapshot.rows.len(), 3);
    }

    #[test]
    fn cell_defaults_apply_on_deserialize() {
        let row: Row = serde_json::from_str(r#"{"cells":[{"content":"a"}]}"#).expect("row json");
        assert_eq!(row.cells[0].fg, "default");
        assert!(!row.wrapped);
        assert_eq!(row.text(), "a");
    }

    #[test]
    fn wide_continuations_are_skipped_in_text() {
        let mut row = Row::from_text("ab", 2);
        row.cells[0] = Cell {
            content: "漢".into(),
            wide: true,
            ..Cell::default()
        };
        row.cells[1].wide_continuation = true;
        assert_eq!(row.text(), "漢");
    }
}
