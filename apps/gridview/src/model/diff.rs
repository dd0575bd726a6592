use serde::{Deserialize, Serialize};

use super::grid::{CursorPos, GridDimensions, GridSnapshot, Row};

/// Sparse update naming only the rows that changed since the daemon's last read.
///
/// `full_repaint` signals that the dimensions changed and the receiver must
/// resize its row array before merging; such a diff carries every row.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridDiff {
    pub dirty_rows: Vec<(u16, Row)>,
    pub cursor: CursorPos,
    pub dimensions: GridDimensions,
    #[serde(default)]
    pub alternate_screen: bool,
    #[serde(default)]
    pub cursor_hidden: bool,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub scrollback_offset: usize,
    #[serde(default)]
    pub total_scrollback: usize,
    #[serde(default)]
    pub full_repaint: bool,
}

impl GridDiff {
    /// A diff with no dirty rows that restates `snapshot`'s metadata.
    pub fn unchanged(snapshot: &GridSnapshot) -> Self {
        Self {
            dirty_rows: Vec::new(),
            cursor: snapshot.cursor,
            dimensions: snapshot.dimensions,
            alternate_screen: snapshot.alternate_screen,
            cursor_hidden: snapshot.cursor_hidden,
            title: snapshot.title.clone(),
            scrollback_offset: snapshot.scrollback_offset,
            total_scrollback: snapshot.total_scrollback,
            full_repaint: false,
        }
    }

    /// A diff rewriting a single row with `text`, keeping `base`'s metadata.
    pub fn single_row(base: &GridSnapshot, row: u16, text: &str) -> Self {
        let mut diff = Self::unchanged(base);
        diff.dirty_rows
            .push((row, Row::from_text(text, base.dimensions.cols)));
        diff
    }

    pub fn is_empty(&self) -> bool {
        self.dirty_rows.is_empty() && !self.full_repaint
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_shape_uses_index_row_pairs() {
        let base = GridSnapshot::from_lines(&["", ""], 3);
        let diff = GridDiff::single_row(&base, 1, "hi");
        let json = serde_json::to_value(&diff).expect("encode diff");
        assert_eq!(json["dirty_rows"][0][0], 1);
        assert_eq!(json["dirty_rows"][0][1]["cells"][0]["content"], "h");
        assert_eq!(json["full_repaint"], false);
    }

    #[test]
    fn missing_optional_fields_default() {
        let json = r#"{
            "dirty_rows": [],
            "cursor": {"row": 0, "col": 0},
            "dimensions": {"rows": 24, "cols": 80}
        }"#;
        let diff: GridDiff = serde_json::from_str(json).expect("decode diff");
        assert!(diff.is_empty());
        assert_eq!(diff.title, None);
        assert_eq!(diff.total_scrollback, 0);
    }
}
