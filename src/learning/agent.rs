use std::collections::HashMap;

use itertools::Itertools;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::error::{QallocError, Result};
use crate::learning::policy::{EpsilonGreedy, Policy, PolicyType, argmax};
use crate::learning::q_table::QTable;
use crate::learning::schedule::ExponentialDecay;
use crate::market::Market;
use crate::{Stage, UInt};

/// Q-learning hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningParams {
    pub learning_rate: f64,
    pub discount: f64,
    pub epsilon_start: f64,
    pub epsilon_end: f64,
    pub decay_rate: f64,
}

impl Default for LearningParams {
    fn default() -> Self {
        LearningParams {
            learning_rate: 0.001,
            discount: 1.0,
            epsilon_start: 0.2,
            epsilon_end: 0.0001,
            decay_rate: 0.005,
        }
    }
}

impl LearningParams {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("learning_rate", self.learning_rate),
            ("discount", self.discount),
            ("epsilon_start", self.epsilon_start),
            ("epsilon_end", self.epsilon_end),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(QallocError::config(format!(
                    "{name} must lie in [0, 1], got {value}"
                )));
            }
        }
        if !(self.decay_rate >= 0.0 && self.decay_rate.is_finite()) {
            return Err(QallocError::config(format!(
                "decay_rate must be non-negative, got {}",
                self.decay_rate
            )));
        }
        if self.epsilon_end > self.epsilon_start {
            return Err(QallocError::config(format!(
                "epsilon_end ({}) must not exceed epsilon_start ({})",
                self.epsilon_end, self.epsilon_start
            )));
        }
        Ok(())
    }
}

/// Greedy investment for every (stage, wealth level).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GreedyPolicy {
    pub wealth_levels: Vec<UInt>,
    /// `actions[t][w_idx]`
    pub actions: Vec<Vec<UInt>>,
}

impl GreedyPolicy {
    pub fn action(&self, t: Stage, w: UInt) -> Option<UInt> {
        let w_idx = self.wealth_levels.iter().position(|&level| level == w)?;
        self.actions.get(t).map(|row| row[w_idx])
    }
}

/// Tabular Q-learning agent over a [`Market`].
#[derive(Debug, Clone)]
pub struct QLearningAgent {
    market: Market,
    params: LearningParams,
    schedule: ExponentialDecay,
    q_table: QTable,
    // Candidates depend only on wealth, so one map per wealth index serves
    // every stage.
    action_index: Vec<HashMap<UInt, usize>>,
    // Absolute Q change accumulated since the last `take_delta`.
    pending_delta: f64,
}

impl QLearningAgent {
    pub fn new(market: Market, params: LearningParams) -> Result<Self> {
        params.validate()?;
        let row_lens = market
            .all_action_candidates()
            .iter()
            .map(Vec::len)
            .collect_vec();
        let q_table = QTable::new(market.horizon(), &row_lens, 0.0);
        let action_index = market
            .all_action_candidates()
            .iter()
            .map(|cand| cand.iter().enumerate().map(|(i, &x)| (x, i)).collect())
            .collect();
        let schedule =
            ExponentialDecay::new(params.epsilon_start, params.epsilon_end, params.decay_rate);
        Ok(QLearningAgent {
            market,
            params,
            schedule,
            q_table,
            action_index,
            pending_delta: 0.0,
        })
    }

    pub fn market(&self) -> &Market {
        &self.market
    }

    pub fn params(&self) -> &LearningParams {
        &self.params
    }

    pub fn q_table(&self) -> &QTable {
        &self.q_table
    }

    pub fn epsilon(&self, episode: usize) -> f64 {
        self.schedule.epsilon(episode)
    }

    /// Epsilon-greedy investment at stage `t` and wealth `w`.
    pub fn choose_action(&self, t: Stage, w: UInt, eps: f64, rng: &mut StdRng) -> Result<UInt> {
        self.choose_action_with(&EpsilonGreedy::new(eps).into(), t, w, rng)
    }

    pub fn choose_action_with(
        &self,
        policy: &PolicyType,
        t: Stage,
        w: UInt,
        rng: &mut StdRng,
    ) -> Result<UInt> {
        let w_idx = self.locate(t, w)?;
        let a_idx = policy.select(self.row(t, w_idx)?, rng);
        Ok(self.market.all_action_candidates()[w_idx][a_idx])
    }

    /// Investment with the highest Q-value, lowest amount on ties.
    pub fn greedy_action(&self, t: Stage, w: UInt) -> Result<UInt> {
        let w_idx = self.locate(t, w)?;
        let a_idx = argmax(self.row(t, w_idx)?);
        Ok(self.market.all_action_candidates()[w_idx][a_idx])
    }

    pub fn greedy_policy(&self) -> GreedyPolicy {
        let wealth_levels = self.market.wealth_levels().to_vec();
        let candidates = self.market.all_action_candidates();
        let actions = (0..self.market.horizon())
            .map(|t| {
                (0..wealth_levels.len())
                    .map(|w_idx| {
                        let a_idx = self.q_table.row(t, w_idx).map_or(0, argmax);
                        candidates[w_idx][a_idx]
                    })
                    .collect()
            })
            .collect();
        GreedyPolicy {
            wealth_levels,
            actions,
        }
    }

    /// One-step Q-learning update of `Q[t, w, x]` toward
    /// `reward + discount * max_a Q[t + 1, w_next, a]`; the bootstrap term is
    /// zero on the last stage.
    pub fn update(
        &mut self,
        t: Stage,
        w: UInt,
        x: UInt,
        reward: f64,
        w_next: UInt,
    ) -> Result<()> {
        let w_idx = self.locate(t, w)?;
        let a_idx = *self.action_index[w_idx]
            .get(&x)
            .ok_or(QallocError::InvalidAction { wealth: w, action: x })?;
        let w_next_idx = self
            .market
            .wealth_index(w_next)
            .ok_or(QallocError::OffGridWealth(w_next))?;

        let max_next = if t + 1 < self.market.horizon() {
            self.q_table
                .max_in_row(t + 1, w_next_idx)
                .ok_or(QallocError::OffGridWealth(w_next))?
        } else {
            0.0
        };
        let target = reward + self.params.discount * max_next;
        let learning_rate = self.params.learning_rate;
        let q = self
            .q_table
            .get_mut(t, w_idx, a_idx)
            .ok_or(QallocError::InvalidAction { wealth: w, action: x })?;
        let change = learning_rate * (target - *q);
        *q += change;
        self.pending_delta += change.abs();
        Ok(())
    }

    /// Absolute Q change summed over the updates since the previous call,
    /// resetting the accumulator. Equals `q_table_delta` against a snapshot
    /// taken at the previous call as long as no cell was updated twice.
    pub fn take_delta(&mut self) -> f64 {
        std::mem::take(&mut self.pending_delta)
    }

    /// Total absolute change of the Q-table since `previous` was captured.
    pub fn q_table_delta(&self, previous: &QTable) -> f64 {
        self.q_table.delta(previous)
    }

    fn row(&self, t: Stage, w_idx: usize) -> Result<&[f64]> {
        self.q_table.row(t, w_idx).ok_or(QallocError::StageOutOfRange {
            stage: t,
            horizon: self.market.horizon(),
        })
    }

    fn locate(&self, t: Stage, w: UInt) -> Result<usize> {
        if t >= self.market.horizon() {
            return Err(QallocError::StageOutOfRange {
                stage: t,
                horizon: self.market.horizon(),
            });
        }
        self.market
            .wealth_index(w)
            .ok_or(QallocError::OffGridWealth(w))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::MarketParams;
    use proptest::prelude::*;
    use rand::SeedableRng;

    fn agent(learning_rate: f64) -> QLearningAgent {
        let market = Market::new(MarketParams {
            horizon: 10,
            p: 0.8,
            a_ret: 0.6,
            b_ret: -0.3,
            riskless_ret: 0.02,
            alpha_utility: 0.001,
            w_max: 300,
            w_step: 50,
            action_step: 50,
        })
        .unwrap();
        QLearningAgent::new(
            market,
            LearningParams {
                learning_rate,
                discount: 1.0,
                epsilon_start: 0.2,
                epsilon_end: 0.01,
                decay_rate: 0.005,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_rejects_bad_hyperparameters() {
        let market = agent(0.1).market().clone();
        for params in [
            LearningParams { learning_rate: 1.5, ..LearningParams::default() },
            LearningParams { discount: -0.1, ..LearningParams::default() },
            LearningParams { epsilon_start: 2.0, ..LearningParams::default() },
            LearningParams { decay_rate: -1.0, ..LearningParams::default() },
            LearningParams {
                epsilon_start: 0.1,
                epsilon_end: 0.9,
                decay_rate: 0.01,
                ..LearningParams::default()
            },
        ] {
            assert!(matches!(
                QLearningAgent::new(market.clone(), params),
                Err(QallocError::Config(_))
            ));
        }
    }

    #[test]
    fn test_epsilon_schedule() {
        let agent = agent(0.1);
        assert!((agent.epsilon(0) - 0.2).abs() < 1e-12);
        assert!(agent.epsilon(10) < agent.epsilon(9));
    }

    #[test]
    fn test_choose_action_is_a_candidate() {
        let agent = agent(0.1);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let x = agent.choose_action(0, 100, 0.5, &mut rng).unwrap();
            assert!([0, 50, 100].contains(&x));
        }
    }

    #[test]
    fn test_zero_wealth_always_invests_nothing() {
        let agent = agent(0.1);
        let mut rng = StdRng::seed_from_u64(8);
        for eps in [0.0, 0.5, 1.0] {
            for t in 0..10 {
                assert_eq!(agent.choose_action(t, 0, eps, &mut rng).unwrap(), 0);
            }
        }
    }

    #[test]
    fn test_greedy_picks_best_valid_action() {
        let mut agent = agent(1.0);
        agent.update(3, 150, 100, 5.0, 150).unwrap();
        let mut rng = StdRng::seed_from_u64(9);
        assert_eq!(agent.choose_action(3, 150, 0.0, &mut rng).unwrap(), 100);
        assert_eq!(agent.greedy_action(3, 150).unwrap(), 100);
        // Untouched row ties at zero and falls back to the lowest investment.
        assert_eq!(agent.greedy_action(3, 200).unwrap(), 0);
        let policy = agent.greedy_policy();
        assert_eq!(policy.action(3, 150), Some(100));
        assert_eq!(policy.action(3, 175), None);
    }

    #[test]
    fn test_invalid_inputs_fail_loudly() {
        let mut agent = agent(0.1);
        let mut rng = StdRng::seed_from_u64(10);
        assert!(matches!(
            agent.update(0, 100, 150, 1.0, 100),
            Err(QallocError::InvalidAction { wealth: 100, action: 150 })
        ));
        assert!(matches!(
            agent.update(0, 100, 50, 1.0, 110),
            Err(QallocError::OffGridWealth(110))
        ));
        assert!(matches!(
            agent.choose_action(10, 100, 0.0, &mut rng),
            Err(QallocError::StageOutOfRange { stage: 10, horizon: 10 })
        ));
        assert!(matches!(
            agent.choose_action(0, 25, 0.0, &mut rng),
            Err(QallocError::OffGridWealth(25))
        ));
        assert!(agent.q_table().iter().all(|cell| cell.3 == 0.0));
    }

    #[test]
    fn test_update_touches_only_one_cell() {
        let mut agent = agent(0.1);
        let before = agent.q_table().clone();
        agent.update(2, 200, 50, 3.0, 250).unwrap();
        let changed: Vec<_> = agent
            .q_table()
            .iter()
            .zip(before.iter())
            .filter(|(now, then)| now.3 != then.3)
            .map(|(now, _)| (now.0, now.1, now.2))
            .collect();
        // stage 2, wealth index 4, action index 1
        assert_eq!(changed, vec![(2, 4, 1)]);
        assert!((agent.q_table_delta(&before) - 0.3).abs() < 1e-12);
        assert!((agent.take_delta() - 0.3).abs() < 1e-12);
        assert_eq!(agent.take_delta(), 0.0);
    }

    #[test]
    fn test_update_bootstraps_from_next_stage() {
        let mut agent = agent(1.0);
        agent.update(5, 100, 100, 4.0, 100).unwrap();
        agent.update(4, 100, 0, 0.0, 100).unwrap();
        assert_eq!(agent.greedy_action(5, 100).unwrap(), 100);
        let w_idx = agent.market().wealth_index(100).unwrap();
        assert_eq!(agent.q_table().get(4, w_idx, 0), Some(4.0));
    }

    #[test]
    fn test_terminal_update_ignores_next_state() {
        let mut agent = agent(1.0);
        agent.update(0, 300, 300, 9.0, 300).unwrap();
        agent.update(9, 300, 0, -2.0, 300).unwrap();
        let w_idx = agent.market().wealth_index(300).unwrap();
        assert_eq!(agent.q_table().get(9, w_idx, 0), Some(-2.0));
    }

    proptest! {
        #[test]
        fn prop_repeated_update_moves_toward_target(
            learning_rate in 0.01f64..0.99,
            reward in -100.0f64..100.0,
            steps in 1usize..50,
        ) {
            let mut agent = agent(learning_rate);
            let w_idx = agent.market().wealth_index(150).unwrap();
            let mut gap = reward.abs();
            for _ in 0..steps {
                agent.update(9, 150, 50, reward, 0).unwrap();
                let q = agent.q_table().get(9, w_idx, 1).unwrap();
                let next_gap = (reward - q).abs();
                prop_assert!(next_gap <= gap + 1e-9);
                gap = next_gap;
            }
        }
    }
}
