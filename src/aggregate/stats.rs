//! Accumulator implementations
//!
//! Every type here is a few machine words of state with O(1) apply, except
//! `Median` which pays O(log n) per insert to answer in O(1).

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use super::Aggregator;

// ============================================================================
// Scalar accumulators
// ============================================================================

/// Running total
///
/// The one aggregator whose empty state reads as a value (0) while still
/// reporting no result. Callers that blindly take `result()` get the
/// mathematically sensible empty sum; callers that check `has_result()`
/// can tell "no samples" from "samples summing to zero".
#[derive(Debug, Default)]
pub struct Sum {
    total: f64,
    seen: bool,
}

impl Sum {
    /// Empty sum
    pub fn new() -> Self {
        Sum::default()
    }
}

impl Aggregator for Sum {
    fn apply(&mut self, value: f64) {
        self.total += value;
        self.seen = true;
    }

    fn has_result(&self) -> bool {
        self.seen
    }

    fn result(&self) -> f64 {
        self.total
    }
}

/// Arithmetic mean over all applied values
#[derive(Debug, Default)]
pub struct Average {
    sum: f64,
    count: u64,
}

impl Average {
    /// Empty average
    pub fn new() -> Self {
        Average::default()
    }
}

impl Aggregator for Average {
    fn apply(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    fn has_result(&self) -> bool {
        self.count > 0
    }

    fn result(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }
}

/// Minimum, seeded at +infinity
#[derive(Debug)]
pub struct Min {
    min: f64,
}

impl Min {
    /// Empty minimum
    pub fn new() -> Self {
        Min { min: f64::INFINITY }
    }
}

impl Default for Min {
    fn default() -> Self {
        Min::new()
    }
}

impl Aggregator for Min {
    fn apply(&mut self, value: f64) {
        if value < self.min {
            self.min = value;
        }
    }

    fn has_result(&self) -> bool {
        // "Result exists" means the extremum moved off its sentinel.
        self.min < f64::INFINITY
    }

    fn result(&self) -> f64 {
        self.min
    }
}

/// Maximum, seeded at -infinity
#[derive(Debug)]
pub struct Max {
    max: f64,
}

impl Max {
    /// Empty maximum
    pub fn new() -> Self {
        Max {
            max: f64::NEG_INFINITY,
        }
    }
}

impl Default for Max {
    fn default() -> Self {
        Max::new()
    }
}

impl Aggregator for Max {
    fn apply(&mut self, value: f64) {
        if value > self.max {
            self.max = value;
        }
    }

    fn has_result(&self) -> bool {
        self.max > f64::NEG_INFINITY
    }

    fn result(&self) -> f64 {
        self.max
    }
}

/// First value latches, everything after is ignored
#[derive(Debug, Default)]
pub struct First {
    value: Option<f64>,
}

impl First {
    /// Empty latch
    pub fn new() -> Self {
        First::default()
    }
}

impl Aggregator for First {
    fn apply(&mut self, value: f64) {
        if self.value.is_none() {
            self.value = Some(value);
        }
    }

    fn has_result(&self) -> bool {
        self.value.is_some()
    }

    fn result(&self) -> f64 {
        self.value.unwrap_or(0.0)
    }
}

/// Last value always overwrites
#[derive(Debug, Default)]
pub struct Last {
    value: Option<f64>,
}

impl Last {
    /// Empty overwrite cell
    pub fn new() -> Self {
        Last::default()
    }
}

impl Aggregator for Last {
    fn apply(&mut self, value: f64) {
        self.value = Some(value);
    }

    fn has_result(&self) -> bool {
        self.value.is_some()
    }

    fn result(&self) -> f64 {
        self.value.unwrap_or(0.0)
    }
}

// ============================================================================
// Median
// ============================================================================

/// Heap element wrapper giving f64 a total order
///
/// NaN never reaches the heaps in practice (the decoder only emits finite
/// samples), so comparisons default to Equal for the NaN case.
#[derive(Debug, Clone, Copy)]
struct HeapValue(f64);

impl PartialEq for HeapValue {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for HeapValue {}

impl PartialOrd for HeapValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapValue {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.partial_cmp(&other.0).unwrap_or(Ordering::Equal)
    }
}

/// Streaming median over two balanced heaps
///
/// `lower` is a max-heap of the smaller half, `upper` a min-heap of the
/// larger half. After every insert the size difference is at most one, so
/// the median is the top of the larger heap, or the mean of both tops when
/// they tie. Insert is O(log n), query O(1).
#[derive(Debug, Default)]
pub struct Median {
    lower: BinaryHeap<HeapValue>,
    upper: BinaryHeap<Reverse<HeapValue>>,
}

impl Median {
    /// Empty median
    pub fn new() -> Self {
        Median::default()
    }

    fn rebalance(&mut self) {
        if self.lower.len() > self.upper.len() + 1 {
            if let Some(v) = self.lower.pop() {
                self.upper.push(Reverse(v));
            }
        } else if self.upper.len() > self.lower.len() + 1 {
            if let Some(Reverse(v)) = self.upper.pop() {
                self.lower.push(v);
            }
        }
    }
}

impl Aggregator for Median {
    fn apply(&mut self, value: f64) {
        let value = HeapValue(value);
        match self.lower.peek() {
            Some(top) if value > *top => self.upper.push(Reverse(value)),
            _ => self.lower.push(value),
        }
        self.rebalance();
    }

    fn has_result(&self) -> bool {
        !self.lower.is_empty() || !self.upper.is_empty()
    }

    fn result(&self) -> f64 {
        match self.lower.len().cmp(&self.upper.len()) {
            Ordering::Greater => self.lower.peek().map(|v| v.0).unwrap_or(0.0),
            Ordering::Less => self.upper.peek().map(|v| v.0 .0).unwrap_or(0.0),
            Ordering::Equal => match (self.lower.peek(), self.upper.peek()) {
                (Some(lo), Some(hi)) => (lo.0 + hi.0 .0) / 2.0,
                _ => 0.0,
            },
        }
    }
}

// ============================================================================
// Variance / StdDev
// ============================================================================

/// Sample variance via Welford's single-pass recurrence
///
/// Numerically stable: no sum of squares, so no catastrophic cancellation
/// for large means. `result()` is m2/(n-1) for n > 1, else 0.
#[derive(Debug, Default)]
pub struct Variance {
    count: u64,
    mean: f64,
    m2: f64,
}

impl Variance {
    /// Empty variance
    pub fn new() -> Self {
        Variance::default()
    }
}

impl Aggregator for Variance {
    fn apply(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        let delta2 = value - self.mean;
        self.m2 += delta * delta2;
    }

    fn has_result(&self) -> bool {
        self.count > 0
    }

    fn result(&self) -> f64 {
        if self.count > 1 {
            self.m2 / (self.count - 1) as f64
        } else {
            0.0
        }
    }
}

/// Standard deviation as a square root over `Variance`
///
/// Composition instead of a second accumulator: the root is taken at read
/// time only.
#[derive(Debug, Default)]
pub struct StdDev {
    inner: Variance,
}

impl StdDev {
    /// Empty standard deviation
    pub fn new() -> Self {
        StdDev::default()
    }
}

impl Aggregator for StdDev {
    fn apply(&mut self, value: f64) {
        self.inner.apply(value);
    }

    fn has_result(&self) -> bool {
        self.inner.has_result()
    }

    fn result(&self) -> f64 {
        self.inner.result().sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::AggregationKind;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn empty_aggregators_report_no_result() {
        for kind in [
            AggregationKind::Sum,
            AggregationKind::Average,
            AggregationKind::Min,
            AggregationKind::Max,
            AggregationKind::Median,
            AggregationKind::Variance,
            AggregationKind::StdDev,
            AggregationKind::First,
            AggregationKind::Last,
        ] {
            let agg = kind.new_aggregator();
            assert!(!agg.has_result(), "{} should start empty", kind);
        }
    }

    #[test]
    fn empty_sum_reads_zero_without_result() {
        let sum = Sum::new();
        assert!(!sum.has_result());
        assert_eq!(sum.result(), 0.0);
    }

    #[test]
    fn one_apply_flips_has_result() {
        for kind in [
            AggregationKind::Sum,
            AggregationKind::Average,
            AggregationKind::Min,
            AggregationKind::Max,
            AggregationKind::Median,
            AggregationKind::Variance,
            AggregationKind::StdDev,
            AggregationKind::First,
            AggregationKind::Last,
        ] {
            let mut agg = kind.new_aggregator();
            agg.apply(1.5);
            assert!(agg.has_result(), "{} should have a result", kind);
        }
    }

    #[test]
    fn first_latches_and_last_overwrites() {
        let mut first = First::new();
        let mut last = Last::new();
        for v in [7.0, 8.0, 9.0] {
            first.apply(v);
            last.apply(v);
        }
        assert_eq!(first.result(), 7.0);
        assert_eq!(last.result(), 9.0);
    }

    #[test]
    fn min_max_track_extrema() {
        let mut min = Min::new();
        let mut max = Max::new();
        for v in [3.0, -2.0, 8.0, 0.5] {
            min.apply(v);
            max.apply(v);
        }
        assert_eq!(min.result(), -2.0);
        assert_eq!(max.result(), 8.0);
    }

    #[test]
    fn average_divides_by_count() {
        let mut avg = Average::new();
        for v in [1.0, 2.0, 3.0, 4.0] {
            avg.apply(v);
        }
        assert_eq!(avg.result(), 2.5);
    }

    fn median_of(values: &[f64]) -> f64 {
        let mut m = Median::new();
        for &v in values {
            m.apply(v);
        }
        m.result()
    }

    #[test]
    fn median_ignores_insertion_order() {
        // Every permutation of 0..n must agree: (n-1)/2 for even n, the
        // exact middle value for odd n.
        for n in [4usize, 5, 8, 9, 16, 17] {
            let expected = if n % 2 == 0 {
                (n as f64 - 1.0) / 2.0
            } else {
                ((n - 1) / 2) as f64
            };
            let ascending: Vec<f64> = (0..n).map(|i| i as f64).collect();
            let descending: Vec<f64> = (0..n).rev().map(|i| i as f64).collect();
            let interleaved: Vec<f64> = (0..n / 2)
                .flat_map(|i| [i as f64, (n - 1 - i) as f64])
                .chain(if n % 2 == 1 {
                    Some((n / 2) as f64)
                } else {
                    None
                })
                .collect();
            assert_eq!(median_of(&ascending), expected, "ascending n={}", n);
            assert_eq!(median_of(&descending), expected, "descending n={}", n);
            assert_eq!(median_of(&interleaved), expected, "interleaved n={}", n);
        }
    }

    #[test]
    fn median_of_shuffled_sequences() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        for n in [10usize, 25, 64] {
            let mut values: Vec<f64> = (0..n).map(|i| i as f64).collect();
            // Fisher-Yates with the seeded generator
            for i in (1..values.len()).rev() {
                let j = rng.gen_range(0..=i);
                values.swap(i, j);
            }
            let expected = if n % 2 == 0 {
                (n as f64 - 1.0) / 2.0
            } else {
                ((n - 1) / 2) as f64
            };
            assert_eq!(median_of(&values), expected, "shuffled n={}", n);
        }
    }

    #[test]
    fn welford_matches_two_pass_variance() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..20 {
            let n = rng.gen_range(2..200);
            let values: Vec<f64> = (0..n).map(|_| rng.gen_range(-1e3..1e3)).collect();

            let mut var = Variance::new();
            let mut sd = StdDev::new();
            for &v in &values {
                var.apply(v);
                sd.apply(v);
            }

            let mean: f64 = values.iter().sum::<f64>() / values.len() as f64;
            let two_pass: f64 = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>()
                / (values.len() - 1) as f64;

            assert!(
                (var.result() - two_pass).abs() < 1e-6,
                "variance drifted: {} vs {}",
                var.result(),
                two_pass
            );
            assert!((sd.result() - two_pass.sqrt()).abs() < 1e-6);
        }
    }

    #[test]
    fn single_sample_variance_is_zero() {
        let mut var = Variance::new();
        var.apply(123.4);
        assert!(var.has_result());
        assert_eq!(var.result(), 0.0);
    }
}
