use serde::{Deserialize, Serialize};

use crate::UInt;

/// Per-episode training statistics, one entry appended per episode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingStats {
    /// Total absolute Q-table change in each episode.
    pub errors: Vec<f64>,
    /// Wealth reached at the end of each episode.
    pub terminal_wealth: Vec<UInt>,
}

impl TrainingStats {
    pub fn record(&mut self, q_delta: f64, terminal_wealth: UInt) {
        self.errors.push(q_delta);
        self.terminal_wealth.push(terminal_wealth);
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Mean Q-delta and mean terminal wealth over the last `window` episodes.
    pub fn recent_mean(&self, window: usize) -> Option<(f64, f64)> {
        let errors = tail(&self.errors, window);
        let wealth: Vec<f64> = tail(&self.terminal_wealth, window)
            .iter()
            .map(|&w| f64::from(w))
            .collect();
        Some((mean(errors)?, mean(&wealth)?))
    }
}

/// Trailing moving average: entry `i` averages `values[i + 1 - window ..= i]`,
/// using fewer values at the start of the series.
pub fn moving_average(values: &[f64], window: usize) -> Vec<f64> {
    let window = window.max(1);
    let mut out = Vec::with_capacity(values.len());
    let mut sum = 0.0;
    for (i, &v) in values.iter().enumerate() {
        sum += v;
        if i >= window {
            sum -= values[i - window];
        }
        out.push(sum / (i + 1).min(window) as f64);
    }
    out
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

fn tail<T>(values: &[T], window: usize) -> &[T] {
    &values[values.len().saturating_sub(window)..]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_recent_mean() {
        let mut stats = TrainingStats::default();
        assert!(stats.is_empty());
        assert_eq!(stats.recent_mean(100), None);
        stats.record(4.0, 100);
        stats.record(2.0, 200);
        stats.record(0.0, 300);
        assert_eq!(stats.len(), 3);
        assert_eq!(stats.recent_mean(2), Some((1.0, 250.0)));
        assert_eq!(stats.recent_mean(100), Some((2.0, 200.0)));
    }

    #[test]
    fn test_moving_average() {
        let smoothed = moving_average(&[1.0, 3.0, 5.0, 7.0], 2);
        assert_eq!(smoothed, vec![1.0, 2.0, 4.0, 6.0]);
        assert_eq!(moving_average(&[2.0, 4.0], 10), vec![2.0, 3.0]);
        assert!(moving_average(&[], 3).is_empty());
    }
}
