use log::{debug, info, trace};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::error::{QallocError, Result};
use crate::learning::agent::QLearningAgent;
use crate::learning::policy::{Greedy, PolicyType};
use crate::stats::{TrainingStats, mean};
use crate::{Stage, UInt};

/// One step of an episode trajectory.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub stage: Stage,
    pub wealth: UInt,
    pub action: UInt,
    pub reward: f64,
    pub next_wealth: UInt,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Episode {
    pub episode: usize,
    pub epsilon: f64,
    pub trajectory: Vec<Transition>,
    pub q_delta: f64,
    pub terminal_wealth: UInt,
}

/// Drives full-horizon episodes through the agent's market, updating the
/// agent after every transition and recording per-episode statistics.
#[derive(Debug)]
pub struct Trainer {
    agent: QLearningAgent,
    initial_wealth: UInt,
    rng: StdRng,
    stats: TrainingStats,
    report_every: usize,
    report_window: usize,
}

impl Trainer {
    pub fn new(agent: QLearningAgent, initial_wealth: UInt, rng: StdRng) -> Result<Self> {
        if agent.market().wealth_index(initial_wealth).is_none() {
            return Err(QallocError::config(format!(
                "initial wealth {initial_wealth} is not on the wealth grid"
            )));
        }
        Ok(Trainer {
            agent,
            initial_wealth,
            rng,
            stats: TrainingStats::default(),
            report_every: 0,
            report_window: 100,
        })
    }

    /// Log moving averages every `every` episodes over the last `window`
    /// episodes. `every == 0` disables progress reports.
    pub fn with_reporting(mut self, every: usize, window: usize) -> Self {
        self.report_every = every;
        self.report_window = window.max(1);
        self
    }

    pub fn agent(&self) -> &QLearningAgent {
        &self.agent
    }

    pub fn stats(&self) -> &TrainingStats {
        &self.stats
    }

    pub fn into_parts(self) -> (QLearningAgent, TrainingStats) {
        (self.agent, self.stats)
    }

    /// Runs one episode from the initial wealth through every stage.
    pub fn run_episode(&mut self, episode: usize) -> Result<Episode> {
        let epsilon = self.agent.epsilon(episode);
        // Every stage updates a distinct cell, so the accumulated change is
        // exactly the episode's Q-table delta.
        self.agent.take_delta();
        let horizon = self.agent.market().horizon();

        let mut trajectory = Vec::with_capacity(horizon);
        let mut wealth = self.initial_wealth;
        for stage in 0..horizon {
            let action = self
                .agent
                .choose_action(stage, wealth, epsilon, &mut self.rng)?;
            let next_wealth = self.agent.market().next_state(wealth, action, &mut self.rng)?;
            let reward = self.agent.market().reward(stage, next_wealth)?;
            self.agent
                .update(stage, wealth, action, reward, next_wealth)?;

            let transition = Transition {
                stage,
                wealth,
                action,
                reward,
                next_wealth,
            };
            trace!("{transition:?}");
            trajectory.push(transition);
            wealth = next_wealth;
        }

        let q_delta = self.agent.take_delta();
        self.stats.record(q_delta, wealth);
        debug!(
            "Episode: {} | eps: {:.4} | Q-delta: {:.6} | Wealth: {}",
            episode, epsilon, q_delta, wealth
        );

        Ok(Episode {
            episode,
            epsilon,
            trajectory,
            q_delta,
            terminal_wealth: wealth,
        })
    }

    /// Runs `num_episodes` episodes. Episodes are numbered after those
    /// already recorded, so repeated calls continue the epsilon decay.
    pub fn train(&mut self, num_episodes: usize) -> Result<&TrainingStats> {
        if num_episodes == 0 {
            return Err(QallocError::config("num_episodes must be at least 1"));
        }
        let first = self.stats.len();
        let last = first + num_episodes;
        for episode in first..last {
            let summary = self.run_episode(episode)?;
            if self.report_every > 0 && (episode + 1) % self.report_every == 0 {
                self.report(last, summary.epsilon);
            }
        }
        Ok(&self.stats)
    }

    /// Rolls out the greedy policy `runs` times without touching the Q-table
    /// and returns each run's terminal wealth.
    pub fn evaluate(&mut self, runs: usize) -> Result<Vec<UInt>> {
        let greedy: PolicyType = Greedy.into();
        let horizon = self.agent.market().horizon();
        let mut outcomes = Vec::with_capacity(runs);
        for _ in 0..runs {
            let mut wealth = self.initial_wealth;
            for stage in 0..horizon {
                let action = self
                    .agent
                    .choose_action_with(&greedy, stage, wealth, &mut self.rng)?;
                wealth = self.agent.market().next_state(wealth, action, &mut self.rng)?;
            }
            outcomes.push(wealth);
        }
        if let Some(avg) = mean(&outcomes.iter().map(|&w| f64::from(w)).collect::<Vec<_>>()) {
            info!("Greedy evaluation over {} runs | Avg. Wealth: {:.2}", runs, avg);
        }
        Ok(outcomes)
    }

    fn report(&self, total: usize, epsilon: f64) {
        if let Some((avg_delta, avg_wealth)) = self.stats.recent_mean(self.report_window) {
            info!(
                "Episode {}/{} | eps={:.4} | Avg Q-diff Last {}={:.4} | Avg Wealth Last {}={:.2}",
                self.stats.len(),
                total,
                epsilon,
                self.report_window,
                avg_delta,
                self.report_window,
                avg_wealth
            );
        }
    }
}
