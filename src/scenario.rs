use std::path::{Path, PathBuf};

use log::info;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::UInt;
use crate::config::Config;
use crate::error::{QallocError, Result};
use crate::learning::agent::{GreedyPolicy, QLearningAgent};
use crate::market::Market;
use crate::stats::{TrainingStats, mean, moving_average};
use crate::trainer::Trainer;

const ERROR_SMOOTHING_WINDOW: usize = 100;
const WEALTH_SMOOTHING_WINDOW: usize = 500;

/// Everything produced by training one scenario.
#[derive(Debug, Clone)]
pub struct ScenarioReport {
    pub name: String,
    pub stats: TrainingStats,
    pub greedy_policy: GreedyPolicy,
    /// Terminal wealth of greedy rollouts after training.
    pub evaluation: Vec<UInt>,
}

/// Training curves in the shape the plotting side consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsExport {
    pub name: String,
    pub errors: Vec<f64>,
    pub errors_smoothed: Vec<f64>,
    pub terminal_wealth: Vec<UInt>,
    pub wealth_smoothed: Vec<f64>,
}

impl From<&ScenarioReport> for StatsExport {
    fn from(report: &ScenarioReport) -> Self {
        let wealth: Vec<f64> = report
            .stats
            .terminal_wealth
            .iter()
            .map(|&w| f64::from(w))
            .collect();
        StatsExport {
            name: report.name.clone(),
            errors: report.stats.errors.clone(),
            errors_smoothed: moving_average(&report.stats.errors, ERROR_SMOOTHING_WINDOW),
            terminal_wealth: report.stats.terminal_wealth.clone(),
            wealth_smoothed: moving_average(&wealth, WEALTH_SMOOTHING_WINDOW),
        }
    }
}

/// Independent random stream for scenario `index`.
pub fn scenario_rng(seed: Option<u64>, index: usize) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(index as u64)),
        None => StdRng::from_os_rng(),
    }
}

/// Builds a fresh market, agent and trainer for scenario `index`, trains it
/// and evaluates the greedy policy.
pub fn run_scenario(config: &Config, index: usize) -> Result<ScenarioReport> {
    let scenario = config.scenarios.get(index).ok_or_else(|| {
        QallocError::config(format!("no scenario at index {index}"))
    })?;
    info!("===== Running {} =====", scenario.name);

    let market = Market::new(scenario.market_params(&config.market))?;
    info!(
        "{}: {} wealth levels, up to {} investment candidates per level",
        scenario.name,
        market.wealth_levels().len(),
        market.max_candidates()
    );
    let agent = QLearningAgent::new(market, config.learning.clone())?;
    let mut trainer = Trainer::new(
        agent,
        config.initial_wealth,
        scenario_rng(config.seed, index),
    )?
    .with_reporting(config.report_every, config.report_window);

    trainer.train(config.num_episodes)?;
    let evaluation = if config.eval_runs > 0 {
        trainer.evaluate(config.eval_runs)?
    } else {
        vec![]
    };

    let (agent, stats) = trainer.into_parts();
    let greedy_policy = agent.greedy_policy();
    if let Some(first_action) = greedy_policy.action(0, config.initial_wealth) {
        info!(
            "{}: greedy investment at stage 0 with wealth {} is {}",
            scenario.name, config.initial_wealth, first_action
        );
    }
    Ok(ScenarioReport {
        name: scenario.name.clone(),
        stats,
        greedy_policy,
        evaluation,
    })
}

/// Runs every configured scenario in order, each with its own Q-table and
/// random stream.
pub fn run_all(config: &Config) -> Result<Vec<ScenarioReport>> {
    (0..config.scenarios.len())
        .map(|index| run_scenario(config, index))
        .collect()
}

/// Mean terminal wealth over the last `window` training episodes and over
/// the greedy rollouts (falling back to the former without rollouts).
pub fn summarize(report: &ScenarioReport, window: usize) -> Option<(f64, f64)> {
    let evaluation: Vec<f64> = report.evaluation.iter().map(|&w| f64::from(w)).collect();
    let (_, train_wealth) = report.stats.recent_mean(window)?;
    Some((train_wealth, mean(&evaluation).unwrap_or(train_wealth)))
}

/// Writes the scenario's training curves as JSON into `dir`.
pub fn write_stats(report: &ScenarioReport, dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let file_name: String = report
        .name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    let path = dir.join(format!("{file_name}.json"));
    let json = serde_json::to_string_pretty(&StatsExport::from(report))?;
    std::fs::write(&path, json)?;
    Ok(path)
}
