//! Per-index size bookkeeping for the virtualizer

use std::collections::BTreeMap;

/// Estimated item sizes refined by optional measurements.
///
/// Only measured indices are stored; every other index has the estimate.
/// Offsets are derived from the estimate plus the accumulated difference of
/// the measured entries before an index.
#[derive(Debug, Clone, PartialEq)]
pub struct SizeCache {
    estimate: f64,
    measured: BTreeMap<usize, f64>,
    capacity: usize,
}

impl SizeCache {
    pub fn new(estimate: f64, capacity: usize) -> Self {
        Self {
            estimate: sanitize(estimate),
            measured: BTreeMap::new(),
            capacity,
        }
    }

    pub fn estimate(&self) -> f64 {
        self.estimate
    }

    pub fn set_estimate(&mut self, estimate: f64) {
        self.estimate = sanitize(estimate);
    }

    pub fn measured_len(&self) -> usize {
        self.measured.len()
    }

    /// Size of one item
    pub fn get(&self, index: usize) -> f64 {
        self.measured.get(&index).copied().unwrap_or(self.estimate)
    }

    /// Record a measured size. Returns whether anything changed.
    pub fn set(&mut self, index: usize, size: f64) -> bool {
        if self.capacity == 0 {
            return false;
        }
        let size = sanitize(size);
        if self.measured.get(&index) == Some(&size) {
            return false;
        }
        self.measured.insert(index, size);

        // Over capacity: forget the lowest indices first
        while self.measured.len() > self.capacity {
            self.measured.pop_first();
        }
        true
    }

    /// Sum of the sizes of items `0..index`
    pub fn offset_of(&self, index: usize) -> f64 {
        let correction: f64 = self
            .measured
            .range(..index)
            .map(|(_, size)| size - self.estimate)
            .sum();
        index as f64 * self.estimate + correction
    }

    /// Move every measurement by `delta` indices, dropping those that fall
    /// below zero. Used when items are inserted or removed at the head.
    pub fn shift(&mut self, delta: i64) {
        if delta == 0 || self.measured.is_empty() {
            return;
        }
        let shifted = std::mem::take(&mut self.measured)
            .into_iter()
            .filter_map(|(index, size)| {
                let moved = i64::try_from(index).ok()?.checked_add(delta)?;
                Some((usize::try_from(moved).ok()?, size))
            })
            .collect();
        self.measured = shifted;
    }

    /// Drop measurements at or beyond `count`
    pub fn truncate(&mut self, count: usize) {
        let _dropped = self.measured.split_off(&count);
    }

    pub fn clear(&mut self) {
        self.measured.clear();
    }
}

fn sanitize(size: f64) -> f64 {
    if size.is_finite() && size > 0.0 {
        size
    } else {
        0.0
    }
}
