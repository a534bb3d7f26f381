//! Statistical primitives used by the detectors.

use std::collections::VecDeque;

/// Arithmetic mean. Returns 0.0 for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample variance with Bessel's correction (divisor `n - 1`).
///
/// Returns 0.0 when fewer than two values are given.
pub fn variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let sum_sq: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    sum_sq / (values.len() - 1) as f64
}

/// Sample standard deviation (Bessel-corrected)
pub fn std_dev(values: &[f64]) -> f64 {
    variance(values).sqrt()
}

/// Bounded FIFO of the most recent values.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    values: VecDeque<f64>,
    capacity: usize,
}

impl RollingWindow {
    /// Create an empty window holding at most `capacity` values
    pub fn new(capacity: usize) -> Self {
        Self {
            values: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Append a value, evicting and returning the oldest one when over capacity
    pub fn push(&mut self, value: f64) -> Option<f64> {
        self.values.push_back(value);
        if self.values.len() > self.capacity {
            self.values.pop_front()
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Contiguous view of the values, oldest first
    pub fn data(&mut self) -> &[f64] {
        self.values.make_contiguous()
    }

    /// Owned copy of the values, oldest first
    pub fn to_vec(&self) -> Vec<f64> {
        self.values.iter().copied().collect()
    }

    pub fn mean(&mut self) -> f64 {
        mean(self.data())
    }

    pub fn std_dev(&mut self) -> f64 {
        std_dev(self.data())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_and_std_dev() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((mean(&values) - 5.0).abs() < 1e-12);
        // Population stdev is 2.0; sample stdev is sqrt(32 / 7)
        assert!((std_dev(&values) - (32.0f64 / 7.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_degenerate_inputs() {
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(std_dev(&[]), 0.0);
        assert_eq!(std_dev(&[3.0]), 0.0);
        assert_eq!(std_dev(&[3.0, 3.0, 3.0]), 0.0);
    }

    #[test]
    fn test_rolling_window_eviction() {
        let mut window = RollingWindow::new(3);
        assert_eq!(window.push(1.0), None);
        assert_eq!(window.push(2.0), None);
        assert_eq!(window.push(3.0), None);
        assert_eq!(window.len(), 3);
        assert_eq!(window.push(4.0), Some(1.0));
        assert_eq!(window.len(), 3);
        assert_eq!(window.data(), &[2.0, 3.0, 4.0]);
        assert!((window.mean() - 3.0).abs() < 1e-12);
        assert!((window.std_dev() - 1.0).abs() < 1e-12);
        assert!(!window.is_empty());
    }
}
