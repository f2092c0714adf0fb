use enum_dispatch::enum_dispatch;
use rand::Rng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

/// Selects an action index from the Q-values of one state. Rows only hold
/// valid actions, so any returned index is a candidate of that state.
#[enum_dispatch]
pub trait Policy {
    fn select(&self, q_row: &[f64], rng: &mut StdRng) -> usize;
}

/// Index of the largest value, lowest index on ties.
pub fn argmax(q_row: &[f64]) -> usize {
    let mut best = 0;
    for (idx, &q) in q_row.iter().enumerate().skip(1) {
        if q > q_row[best] {
            best = idx;
        }
    }
    best
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpsilonGreedy {
    pub epsilon: f64,
}

impl EpsilonGreedy {
    pub fn new(epsilon: f64) -> Self {
        EpsilonGreedy { epsilon }
    }
}

impl Policy for EpsilonGreedy {
    fn select(&self, q_row: &[f64], rng: &mut StdRng) -> usize {
        if rng.random::<f64>() < self.epsilon {
            rng.random_range(0..q_row.len())
        } else {
            argmax(q_row)
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Greedy;

impl Policy for Greedy {
    fn select(&self, q_row: &[f64], _rng: &mut StdRng) -> usize {
        argmax(q_row)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[enum_dispatch(Policy)]
pub enum PolicyType {
    EpsilonGreedy(EpsilonGreedy),
    Greedy(Greedy),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_argmax_ties_pick_lowest() {
        assert_eq!(argmax(&[0.0]), 0);
        assert_eq!(argmax(&[1.0, 3.0, 3.0, 2.0]), 1);
        assert_eq!(argmax(&[0.0, 0.0, 0.0]), 0);
        assert_eq!(argmax(&[-5.0, -1.0, -2.0]), 1);
    }

    #[test]
    fn test_zero_epsilon_is_greedy() {
        let mut rng = StdRng::seed_from_u64(1);
        let policy: PolicyType = EpsilonGreedy::new(0.0).into();
        for _ in 0..50 {
            assert_eq!(policy.select(&[0.1, 0.9, 0.3], &mut rng), 1);
        }
    }

    #[test]
    fn test_full_epsilon_explores_every_index() {
        let mut rng = StdRng::seed_from_u64(2);
        let policy = EpsilonGreedy::new(1.0);
        let mut seen = [false; 4];
        for _ in 0..200 {
            seen[policy.select(&[9.0, 0.0, 0.0, 0.0], &mut rng)] = true;
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn test_singleton_row() {
        let mut rng = StdRng::seed_from_u64(3);
        let policy: PolicyType = Greedy.into();
        assert_eq!(policy.select(&[-4.0], &mut rng), 0);
        assert_eq!(EpsilonGreedy::new(1.0).select(&[-4.0], &mut rng), 0);
    }
}
