use crate::model::GridDimensions;

use super::state::SyncState;

/// Pixel size of the element hosting the grid.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ContainerSize {
    pub width: f64,
    pub height: f64,
}

impl ContainerSize {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Zero (or nonsensical) area, e.g. an inactive tab.
    pub fn is_hidden(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }
}

/// Pixel size of one character cell.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CellMetrics {
    pub width: f64,
    pub height: f64,
}

impl CellMetrics {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    fn is_usable(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FitDecision {
    /// Zero-area container; nothing is sent to the remote.
    Hidden,
    /// Cell metrics unusable; nothing is sent to the remote.
    Degenerate,
    Resize {
        rows: u16,
        cols: u16,
        /// The cached grid had other dimensions and was dropped.
        invalidated: bool,
    },
}

/// Grid size that fits `container`, floored at one row and one column.
/// Returns `None` for hidden containers and unusable metrics.
pub fn grid_size_for(container: ContainerSize, metrics: CellMetrics) -> Option<GridDimensions> {
    if container.is_hidden() || !metrics.is_usable() {
        return None;
    }
    let fit = |extent: f64, cell: f64| {
        (extent / cell).floor().clamp(1.0, f64::from(u16::MAX)) as u16
    };
    Some(GridDimensions::new(
        fit(container.height, metrics.height),
        fit(container.width, metrics.width),
    ))
}

impl SyncState {
    pub fn plan_fit(&mut self, container: ContainerSize, metrics: CellMetrics) -> FitDecision {
        if container.is_hidden() {
            self.stats.suppressed_resizes += 1;
            return FitDecision::Hidden;
        }
        let Some(dims) = grid_size_for(container, metrics) else {
            return FitDecision::Degenerate;
        };
        let invalidated = self
            .cached
            .as_ref()
            .is_some_and(|snapshot| snapshot.dimensions != dims);
        if invalidated {
            self.cached = None;
        }
        self.fitted = Some(dims);
        FitDecision::Resize {
            rows: dims.rows,
            cols: dims.cols,
            invalidated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::GridSnapshot;

    const METRICS: CellMetrics = CellMetrics {
        width: 8.0,
        height: 16.0,
    };

    #[test]
    fn grid_size_floors_and_keeps_minimum() {
        assert_eq!(
            grid_size_for(ContainerSize::new(645.0, 390.0), METRICS),
            Some(GridDimensions::new(24, 80))
        );
        assert_eq!(
            grid_size_for(ContainerSize::new(3.0, 2.0), METRICS),
            Some(GridDimensions::new(1, 1))
        );
        assert_eq!(grid_size_for(ContainerSize::new(0.0, 390.0), METRICS), None);
        assert_eq!(
            grid_size_for(ContainerSize::new(640.0, 384.0), CellMetrics::new(0.0, 16.0)),
            None
        );
    }

    #[test]
    fn zero_area_never_plans_a_resize() {
        for cached in [None, Some(GridDimensions::new(24, 80)), Some(GridDimensions::new(1, 1))] {
            let mut state = SyncState::new();
            state.cached = cached.map(GridSnapshot::blank);
            for container in [
                ContainerSize::new(0.0, 0.0),
                ContainerSize::new(0.0, 400.0),
                ContainerSize::new(400.0, 0.0),
            ] {
                assert_eq!(state.plan_fit(container, METRICS), FitDecision::Hidden);
            }
            assert_eq!(state.cached().map(|s| s.dimensions), cached);
            assert_eq!(state.stats().suppressed_resizes, 3);
        }
    }

    #[test]
    fn changed_dimensions_invalidate_cache() {
        let mut state = SyncState::new();
        state.cached = Some(GridSnapshot::blank(GridDimensions::new(24, 80)));

        let same = state.plan_fit(ContainerSize::new(640.0, 384.0), METRICS);
        assert_eq!(
            same,
            FitDecision::Resize {
                rows: 24,
                cols: 80,
                invalidated: false
            }
        );
        assert!(state.cached().is_some());

        let larger = state.plan_fit(ContainerSize::new(800.0, 480.0), METRICS);
        assert_eq!(
            larger,
            FitDecision::Resize {
                rows: 30,
                cols: 100,
                invalidated: true
            }
        );
        assert!(state.cached().is_none());
        assert_eq!(state.fitted(), Some(GridDimensions::new(30, 100)));
    }

    #[test]
    fn unusable_metrics_are_degenerate() {
        let mut state = SyncState::new();
        let decision = state.plan_fit(
            ContainerSize::new(640.0, 384.0),
            CellMetrics::new(f64::NAN, 16.0),
        );
        assert_eq!(decision, FitDecision::Degenerate);
        assert_eq!(state.fitted(), None);
    }
}
