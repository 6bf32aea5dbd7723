//! Fixed-size windowing over a [`GraphView`].
//!
//! A loader walks a view either by event count (ordered batch unit) or by
//! physical duration, slicing one window per step, running an optional
//! hook over the sliced view and materializing the result.

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::error::{DgError, Result};
use crate::graph::{DgBatch, GraphView};
use crate::timedelta::{TimeDelta, TimeUnit};
use crate::types::Time;

/// Windowing parameters for a [`DgLoader`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderOptions {
    /// Events per batch (ordered) or units per batch (physical).
    pub batch_size: usize,
    /// Unit `batch_size` is expressed in.
    pub batch_unit: TimeUnit,
    /// Drop a trailing window shorter than the others.
    pub drop_last: bool,
    /// Include feature tensors in emitted batches.
    pub materialize_features: bool,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            batch_size: 1,
            batch_unit: TimeUnit::Ordered,
            drop_last: false,
            materialize_features: true,
        }
    }
}

impl LoaderOptions {
    /// Creates options with the default ordered unit.
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size,
            ..Self::default()
        }
    }

    /// Sets the batch unit.
    pub fn batch_unit(mut self, unit: TimeUnit) -> Self {
        self.batch_unit = unit;
        self
    }

    /// Enables or disables dropping a short final window.
    pub fn drop_last(mut self, enabled: bool) -> Self {
        self.drop_last = enabled;
        self
    }

    /// Enables or disables feature materialization.
    pub fn materialize_features(mut self, enabled: bool) -> Self {
        self.materialize_features = enabled;
        self
    }
}

/// Transform applied to each windowed view before it is materialized.
pub trait BatchHook {
    /// Returns the view to materialize in place of `batch`.
    fn apply(&mut self, batch: GraphView) -> Result<GraphView>;
}

impl<F> BatchHook for F
where
    F: FnMut(GraphView) -> Result<GraphView>,
{
    fn apply(&mut self, batch: GraphView) -> Result<GraphView> {
        self(batch)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Window {
    /// Inclusive global event indices.
    Events(usize, usize),
    /// Half-open time range; an open end runs past the last representable time.
    Time(Time, Option<Time>),
}

/// Iterator of materialized batches over a view.
pub struct DgLoader {
    view: GraphView,
    windows: VecDeque<Window>,
    planned: usize,
    materialize_features: bool,
    hook: Option<Box<dyn BatchHook>>,
}

impl DgLoader {
    /// Plans every window of `view`.
    ///
    /// Fails on an empty view, a zero batch size, mixing ordered and
    /// physical units, or a graph granularity coarser than the batch window.
    pub fn new(view: GraphView, options: LoaderOptions) -> Result<Self> {
        if options.batch_size == 0 {
            return Err(DgError::invalid(format!(
                "batch_size must be > 0 but got {}",
                options.batch_size
            )));
        }
        if view.is_empty() {
            return Err(DgError::invalid("cannot iterate an empty graph"));
        }
        let graph_delta = view.time_delta();
        let batch_ordered = options.batch_unit.is_ordered();
        let windows = match (graph_delta.is_ordered(), batch_ordered) {
            (true, false) => {
                return Err(DgError::invalid(
                    "cannot iterate an ordered graph using a non-ordered batch unit",
                ))
            }
            (false, true) => {
                return Err(DgError::invalid(
                    "cannot iterate a non-ordered graph using the ordered batch unit",
                ))
            }
            (_, true) => plan_ordered(&view, options.batch_size, options.drop_last),
            (false, false) => {
                let value = u64::try_from(options.batch_size)
                    .map_err(|_| DgError::invalid("batch_size does not fit in u64"))?;
                let batch_delta = TimeDelta::new(options.batch_unit, value)?;
                let width = window_width(&graph_delta, &batch_delta)?;
                plan_time(&view, width, options.drop_last)
            }
        };
        debug!(
            batches = windows.len(),
            batch_size = options.batch_size,
            batch_unit = %options.batch_unit,
            drop_last = options.drop_last,
            "loader.planned"
        );
        Ok(Self {
            view,
            planned: windows.len(),
            windows,
            materialize_features: options.materialize_features,
            hook: None,
        })
    }

    /// Installs a hook run on each window before materialization.
    pub fn with_hook(mut self, hook: impl BatchHook + 'static) -> Self {
        self.hook = Some(Box::new(hook));
        self
    }

    /// Total number of windows planned at construction.
    pub fn num_batches(&self) -> usize {
        self.planned
    }

    /// Windows not yet emitted.
    pub fn remaining(&self) -> usize {
        self.windows.len()
    }

    fn emit(&mut self, window: Window) -> Result<DgBatch> {
        let sliced = match window {
            Window::Events(first, last) => self.view.slice_events(Some(first), Some(last))?,
            Window::Time(start, end) => self.view.slice_time(Some(start), end)?,
        };
        trace!(window = ?window, events = sliced.num_events(), "loader.batch");
        let sliced = match self.hook.as_mut() {
            Some(hook) => hook.apply(sliced)?,
            None => sliced,
        };
        sliced.materialize(self.materialize_features)
    }
}

impl Iterator for DgLoader {
    type Item = Result<DgBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        let window = self.windows.pop_front()?;
        if self.windows.is_empty() {
            debug!(batches = self.planned, "loader.exhausted");
        }
        Some(self.emit(window))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.windows.len(), Some(self.windows.len()))
    }
}

impl ExactSizeIterator for DgLoader {}

impl fmt::Debug for DgLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DgLoader")
            .field("view", &self.view)
            .field("planned", &self.planned)
            .field("remaining", &self.windows.len())
            .field("hook", &self.hook.is_some())
            .finish()
    }
}

/// Width of one batch window in graph time units.
fn window_width(graph: &TimeDelta, batch: &TimeDelta) -> Result<Time> {
    if graph.is_coarser_than(batch)? {
        return Err(DgError::invalid(format!(
            "graph time delta {graph} is strictly coarser than the batch window {batch}; \
             choose a larger batch or iterate with the ordered unit"
        )));
    }
    let ratio = batch.convert(graph)?;
    if ratio.fract() != 0.0 {
        warn!(ratio, graph = %graph, batch = %batch, "loader.window.lossy");
    }
    Ok(ratio.floor() as Time)
}

fn plan_ordered(view: &GraphView, batch_size: usize, drop_last: bool) -> VecDeque<Window> {
    view.event_indices()
        .chunks(batch_size)
        .filter(|chunk| !drop_last || chunk.len() == batch_size)
        .filter_map(|chunk| Some(Window::Events(*chunk.first()?, *chunk.last()?)))
        .collect()
}

fn plan_time(view: &GraphView, width: Time, drop_last: bool) -> VecDeque<Window> {
    let (Some(start), Some(end)) = (view.start_time(), view.end_time()) else {
        return VecDeque::new();
    };
    let mut windows = VecDeque::new();
    let mut cursor = start;
    loop {
        let full_end = i128::from(cursor) + i128::from(width);
        if drop_last && full_end > i128::from(end) + 1 {
            break;
        }
        match Time::try_from(full_end) {
            Ok(window_end) => {
                windows.push_back(Window::Time(cursor, Some(window_end)));
                if window_end > end {
                    break;
                }
                cursor = window_end;
            }
            Err(_) => {
                windows.push_back(Window::Time(cursor, None));
                break;
            }
        }
    }
    windows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Event;

    fn ordered_view(n: i64) -> GraphView {
        let events = (0..n).map(|t| Event::edge(t, 0u64, 1u64)).collect();
        GraphView::new(events, TimeDelta::ordered()).unwrap()
    }

    #[test]
    fn ordered_chunks_respect_drop_last() {
        let view = ordered_view(5);
        let loader = DgLoader::new(view.clone(), LoaderOptions::new(2)).unwrap();
        assert_eq!(loader.num_batches(), 3);
        let loader = DgLoader::new(view, LoaderOptions::new(2).drop_last(true)).unwrap();
        assert_eq!(loader.num_batches(), 2);
    }

    #[test]
    fn time_windows_cover_the_end_inclusively() {
        let events = vec![Event::edge(0, 0u64, 1u64), Event::edge(9, 1u64, 2u64)];
        let view = GraphView::new(events, TimeDelta::new(TimeUnit::Second, 1).unwrap()).unwrap();
        let opts = LoaderOptions::new(5).batch_unit(TimeUnit::Second);
        let loader = DgLoader::new(view, opts).unwrap();
        assert_eq!(
            loader.windows.iter().copied().collect::<Vec<_>>(),
            vec![Window::Time(0, Some(5)), Window::Time(5, Some(10))]
        );
    }

    #[test]
    fn time_windows_reach_the_largest_timestamp() {
        let events = vec![Event::edge(Time::MAX - 3, 0u64, 1u64), Event::edge(Time::MAX, 1u64, 2u64)];
        let view = GraphView::new(events, TimeDelta::new(TimeUnit::Second, 1).unwrap()).unwrap();
        let opts = LoaderOptions::new(2).batch_unit(TimeUnit::Second);
        let loader = DgLoader::new(view.clone(), opts.clone()).unwrap();
        assert_eq!(
            loader.windows.iter().copied().collect::<Vec<_>>(),
            vec![
                Window::Time(Time::MAX - 3, Some(Time::MAX - 1)),
                Window::Time(Time::MAX - 1, None),
            ]
        );
        let edges: usize = loader.map(|b| b.unwrap().len()).sum();
        assert_eq!(edges, 2);

        let dropped = DgLoader::new(view, opts.drop_last(true)).unwrap();
        assert_eq!(dropped.num_batches(), 2);
    }

    #[test]
    fn coarser_graph_is_rejected() {
        let events = vec![Event::edge(0, 0u64, 1u64)];
        let view = GraphView::new(events, TimeDelta::new(TimeUnit::Minute, 1).unwrap()).unwrap();
        let opts = LoaderOptions::new(30).batch_unit(TimeUnit::Second);
        assert!(DgLoader::new(view, opts).is_err());
    }

    #[test]
    fn width_converts_units() {
        let graph = TimeDelta::new(TimeUnit::Second, 1).unwrap();
        let batch = TimeDelta::new(TimeUnit::Minute, 2).unwrap();
        assert_eq!(window_width(&graph, &batch).unwrap(), 120);
    }
}
