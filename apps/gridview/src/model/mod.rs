pub mod diff;
pub mod grid;

pub use diff::GridDiff;
pub use grid::{Cell, CellRange, CursorPos, GridDimensions, GridSnapshot, Row};
