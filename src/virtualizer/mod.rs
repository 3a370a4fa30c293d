//! Windowed virtualization of a long list.
//!
//! The [`Virtualizer`] knows nothing about records. Given an item count, a
//! viewport size, a scroll offset and per-item sizes it computes which items
//! intersect the viewport (plus overscan) and where each of them starts.
//! [`Virtualizer::layout`] is pure: it can be called any number of times and
//! yields the same result until one of the inputs changes.

mod sizes;

pub use sizes::SizeCache;

use serde::{Deserialize, Serialize};
use std::ops::Range;
use tracing::trace;

/// Scroll positions closer than this to the end count as "at the end"
const END_TOLERANCE: f64 = 0.5;

/// One materialized item of the current layout
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VirtualItem {
    pub index: usize,
    pub start: f64,
    pub size: f64,
}

impl VirtualItem {
    pub fn end(&self) -> f64 {
        self.start + self.size
    }
}

/// Output of one layout pass
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Layout {
    /// Items to render, overscan included
    pub items: Vec<VirtualItem>,

    /// Items strictly intersecting the viewport
    pub visible: Range<usize>,

    /// Size of the whole scrollable content
    pub total_size: f64,
}

impl Layout {
    pub fn first(&self) -> Option<&VirtualItem> {
        self.items.first()
    }

    pub fn last(&self) -> Option<&VirtualItem> {
        self.items.last()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Alignment used by [`Virtualizer::scroll_to_index`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Align {
    /// Item top at the viewport top
    Start,
    /// Item centered in the viewport
    Center,
    /// Item bottom at the viewport bottom
    End,
    /// Scroll as little as possible to make the item visible
    #[default]
    Auto,
}

/// Virtualizer inputs that are not scroll state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtualizerOptions {
    /// Number of items, loader slots included
    pub count: usize,

    /// Size of the viewport along the scroll axis
    pub viewport_size: f64,

    /// Size assumed for items that were not measured
    pub estimate_size: f64,

    /// Extra items materialized on each side of the visible range
    pub overscan: usize,

    /// Maximum number of measured sizes kept
    pub measurement_capacity: usize,
}

impl Default for VirtualizerOptions {
    fn default() -> Self {
        Self {
            count: 0,
            viewport_size: 500.0,
            estimate_size: 100.0,
            overscan: 20,
            measurement_capacity: 1024,
        }
    }
}

impl VirtualizerOptions {
    pub fn with_count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }

    pub fn with_viewport_size(mut self, size: f64) -> Self {
        self.viewport_size = size;
        self
    }

    pub fn with_estimate_size(mut self, size: f64) -> Self {
        self.estimate_size = size;
        self
    }

    pub fn with_overscan(mut self, overscan: usize) -> Self {
        self.overscan = overscan;
        self
    }
}

/// Computes the materialized window of a list
#[derive(Debug, Clone)]
pub struct Virtualizer {
    options: VirtualizerOptions,
    scroll_offset: f64,
    sizes: SizeCache,
}

impl Virtualizer {
    pub fn new(options: VirtualizerOptions) -> Self {
        let sizes = SizeCache::new(options.estimate_size, options.measurement_capacity);
        Self {
            options,
            scroll_offset: 0.0,
            sizes,
        }
    }

    pub fn options(&self) -> &VirtualizerOptions {
        &self.options
    }

    pub fn count(&self) -> usize {
        self.options.count
    }

    pub fn viewport_size(&self) -> f64 {
        self.options.viewport_size
    }

    pub fn overscan(&self) -> usize {
        self.options.overscan
    }

    /// Current (always clamped) scroll offset
    pub fn scroll_offset(&self) -> f64 {
        self.scroll_offset
    }

    /// Change the item count. The offset is re-clamped, nothing else moves.
    pub fn set_count(&mut self, count: usize) {
        if self.options.count != count {
            self.options.count = count;
            self.sizes.truncate(count);
            self.clamp_offset();
        }
    }

    pub fn set_viewport_size(&mut self, size: f64) {
        let size = if size.is_finite() { size.max(0.0) } else { 0.0 };
        if self.options.viewport_size != size {
            self.options.viewport_size = size;
            self.clamp_offset();
        }
    }

    pub fn set_overscan(&mut self, overscan: usize) {
        self.options.overscan = overscan;
    }

    /// Size of one item, estimated unless measured
    pub fn size_of(&self, index: usize) -> f64 {
        self.sizes.get(index)
    }

    /// Start offset of an item
    pub fn offset_of(&self, index: usize) -> f64 {
        self.sizes.offset_of(index.min(self.count()))
    }

    /// Sum of all item sizes
    pub fn total_size(&self) -> f64 {
        self.sizes.offset_of(self.count())
    }

    /// Largest valid scroll offset
    pub fn max_scroll_offset(&self) -> f64 {
        (self.total_size() - self.viewport_size()).max(0.0)
    }

    pub fn is_at_start(&self) -> bool {
        self.scroll_offset <= END_TOLERANCE
    }

    pub fn is_at_end(&self) -> bool {
        self.max_scroll_offset() - self.scroll_offset <= END_TOLERANCE
    }

    /// Record the real size of an item
    pub fn measure(&mut self, index: usize, size: f64) {
        if index < self.count() && self.sizes.set(index, size) {
            self.clamp_offset();
        }
    }

    /// Move measurements when items were inserted (`delta > 0`) or removed
    /// (`delta < 0`) before them. Call before [`Self::set_count`].
    pub fn shift_measurements(&mut self, delta: i64) {
        self.sizes.shift(delta);
    }

    pub fn clear_measurements(&mut self) {
        self.sizes.clear();
        self.clamp_offset();
    }

    /// Scroll to an absolute offset.
    ///
    /// `f64::INFINITY` jumps to the end and `f64::NEG_INFINITY` to the start;
    /// everything is clamped to `[0, max_scroll_offset]`. NaN is ignored.
    /// Returns the applied offset.
    pub fn scroll_to_offset(&mut self, value: f64) -> f64 {
        if value.is_nan() {
            return self.scroll_offset;
        }
        self.scroll_offset = value.clamp(0.0, self.max_scroll_offset());
        trace!(offset = self.scroll_offset, "scrolled");
        self.scroll_offset
    }

    pub fn scroll_by(&mut self, delta: f64) -> f64 {
        self.scroll_to_offset(self.scroll_offset + delta)
    }

    /// Bring an item into view. Indices past the end address the last item.
    pub fn scroll_to_index(&mut self, index: usize, align: Align) -> f64 {
        if self.count() == 0 {
            return self.scroll_to_offset(0.0);
        }
        let index = index.min(self.count() - 1);
        let start = self.offset_of(index);
        let size = self.size_of(index);
        let viewport = self.viewport_size();

        let target = match align {
            Align::Start => start,
            Align::End => start + size - viewport,
            Align::Center => start + size / 2.0 - viewport / 2.0,
            Align::Auto => {
                if start < self.scroll_offset {
                    start
                } else if start + size > self.scroll_offset + viewport {
                    start + size - viewport
                } else {
                    self.scroll_offset
                }
            }
        };
        self.scroll_to_offset(target)
    }

    /// Index of the item covering an offset
    pub fn index_at(&self, offset: f64) -> Option<usize> {
        let count = self.count();
        if count == 0 {
            return None;
        }
        let index = partition_point(count, |i| self.sizes.offset_of(i + 1) <= offset);
        Some(index.min(count - 1))
    }

    /// Compute the items to materialize for the current inputs
    pub fn layout(&self) -> Layout {
        let count = self.count();
        let total_size = self.total_size();
        let viewport = self.viewport_size();
        if count == 0 || viewport <= 0.0 {
            return Layout {
                items: Vec::new(),
                visible: 0..0,
                total_size,
            };
        }

        let offset = self.scroll_offset;
        let window_end = offset + viewport;

        // First item ending after the offset, last item starting before the
        // window end
        let lo = partition_point(count, |i| self.sizes.offset_of(i + 1) <= offset).min(count - 1);
        let hi = partition_point(count, |i| self.sizes.offset_of(i) < window_end)
            .saturating_sub(1)
            .max(lo);

        let first = lo.saturating_sub(self.overscan());
        let last = hi.saturating_add(self.overscan()).min(count - 1);

        let mut items = Vec::with_capacity(last - first + 1);
        let mut start = self.sizes.offset_of(first);
        for index in first..=last {
            let size = self.sizes.get(index);
            items.push(VirtualItem { index, start, size });
            start += size;
        }

        Layout {
            items,
            visible: lo..hi + 1,
            total_size,
        }
    }

    fn clamp_offset(&mut self) {
        self.scroll_offset = self.scroll_offset.clamp(0.0, self.max_scroll_offset());
    }
}

/// First index in `0..len` for which `pred` is false; `pred` must be
/// monotonic (true then false)
fn partition_point(len: usize, pred: impl Fn(usize) -> bool) -> usize {
    let (mut lo, mut hi) = (0, len);
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if pred(mid) {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    lo
}

#[cfg(test)]
mod tests {
    use super::*;

    fn virtualizer(count: usize) -> Virtualizer {
        Virtualizer::new(
            VirtualizerOptions::default()
                .with_count(count)
                .with_viewport_size(500.0)
                .with_estimate_size(100.0)
                .with_overscan(2),
        )
    }

    fn indices(layout: &Layout) -> Vec<usize> {
        layout.items.iter().map(|item| item.index).collect()
    }

    #[test]
    fn test_initial_layout() {
        let v = virtualizer(100);
        let layout = v.layout();

        assert_eq!(layout.visible, 0..5);
        assert_eq!(indices(&layout), (0..7).collect::<Vec<_>>());
        assert_eq!(layout.total_size, 10_000.0);
        assert_eq!(layout.items[3], VirtualItem { index: 3, start: 300.0, size: 100.0 });
    }

    #[test]
    fn test_partial_items_are_visible() {
        let mut v = virtualizer(100);
        v.scroll_to_offset(250.0);
        let layout = v.layout();

        // 250..750 touches items 2 through 7
        assert_eq!(layout.visible, 2..8);
        assert_eq!(indices(&layout), (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_overscan_is_clamped_at_the_end() {
        let mut v = virtualizer(10);
        v.scroll_to_offset(f64::INFINITY);
        let layout = v.layout();

        assert_eq!(v.scroll_offset(), 500.0);
        assert_eq!(layout.visible, 5..10);
        assert_eq!(indices(&layout), (3..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_layout_is_idempotent() {
        let mut v = virtualizer(1000);
        v.measure(3, 42.0);
        v.scroll_to_offset(1234.5);
        assert_eq!(v.layout(), v.layout());
    }

    #[test]
    fn test_infinite_sentinels() {
        let mut v = virtualizer(20);
        assert_eq!(v.scroll_to_offset(f64::INFINITY), 1500.0);
        assert!(v.is_at_end());
        assert_eq!(v.scroll_to_offset(f64::NEG_INFINITY), 0.0);
        assert!(v.is_at_start());
        assert_eq!(v.scroll_to_offset(f64::NAN), 0.0);
    }

    #[test]
    fn test_content_smaller_than_viewport() {
        let mut v = virtualizer(3);
        assert_eq!(v.scroll_to_offset(f64::INFINITY), 0.0);
        let layout = v.layout();
        assert_eq!(layout.visible, 0..3);
        assert_eq!(layout.total_size, 300.0);
    }

    #[test]
    fn test_empty_and_zero_viewport() {
        let v = virtualizer(0);
        assert!(v.layout().is_empty());

        let mut v = virtualizer(10);
        v.set_viewport_size(0.0);
        assert!(v.layout().is_empty());
    }

    #[test]
    fn test_measurement_changes_offsets() {
        let mut v = virtualizer(10);
        v.measure(0, 250.0);

        assert_eq!(v.offset_of(1), 250.0);
        assert_eq!(v.total_size(), 1150.0);
        assert_eq!(v.layout().visible, 0..4);
    }

    #[test]
    fn test_shrinking_count_reclamps_offset() {
        let mut v = virtualizer(100);
        v.scroll_to_offset(f64::INFINITY);
        v.set_count(10);
        assert_eq!(v.scroll_offset(), 500.0);
    }

    #[test]
    fn test_scroll_to_index() {
        let mut v = virtualizer(100);
        assert_eq!(v.scroll_to_index(10, Align::Start), 1000.0);
        assert_eq!(v.scroll_to_index(10, Align::End), 600.0);
        assert_eq!(v.scroll_to_index(10, Align::Center), 800.0);
        // Already visible
        assert_eq!(v.scroll_to_index(9, Align::Auto), 800.0);
        assert_eq!(v.scroll_to_index(usize::MAX, Align::End), 9500.0);
    }

    #[test]
    fn test_index_at() {
        let v = virtualizer(10);
        assert_eq!(v.index_at(0.0), Some(0));
        assert_eq!(v.index_at(99.9), Some(0));
        assert_eq!(v.index_at(100.0), Some(1));
        assert_eq!(v.index_at(5000.0), Some(9));
        assert_eq!(virtualizer(0).index_at(0.0), None);
    }
}
