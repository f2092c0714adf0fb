use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{QallocError, Result};
use crate::learning::agent::LearningParams;
use crate::market::MarketParams;
use crate::{Stage, UInt};

/// Discretisation and utility shared by every scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub horizon: Stage,
    pub alpha_utility: f64,
    pub w_max: UInt,
    pub w_step: UInt,
    pub action_step: UInt,
}

impl Default for GridConfig {
    fn default() -> Self {
        GridConfig {
            horizon: 10,
            alpha_utility: 0.001,
            w_max: 10000,
            w_step: 50,
            action_step: 50,
        }
    }
}

/// Market conditions for one experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub p: f64,
    pub a_ret: f64,
    pub b_ret: f64,
    pub riskless_ret: f64,
}

impl Scenario {
    pub fn new(name: &str, p: f64, a_ret: f64, b_ret: f64, riskless_ret: f64) -> Self {
        Scenario {
            name: name.to_string(),
            p,
            a_ret,
            b_ret,
            riskless_ret,
        }
    }

    pub fn market_params(&self, grid: &GridConfig) -> MarketParams {
        MarketParams {
            horizon: grid.horizon,
            p: self.p,
            a_ret: self.a_ret,
            b_ret: self.b_ret,
            riskless_ret: self.riskless_ret,
            alpha_utility: grid.alpha_utility,
            w_max: grid.w_max,
            w_step: grid.w_step,
            action_step: grid.action_step,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base seed; scenario `i` trains with `seed + i`. Unseeded runs draw
    /// from the OS.
    pub seed: Option<u64>,
    pub num_episodes: usize,
    pub initial_wealth: UInt,
    /// Episodes between progress reports, 0 to disable.
    pub report_every: usize,
    pub report_window: usize,
    /// Greedy rollouts after training.
    pub eval_runs: usize,
    /// Directory for per-scenario statistics, if any.
    pub output_dir: Option<PathBuf>,
    pub market: GridConfig,
    pub learning: LearningParams,
    pub scenarios: Vec<Scenario>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            seed: None,
            num_episodes: 30000,
            initial_wealth: 1000,
            report_every: 1000,
            report_window: 100,
            eval_runs: 1000,
            output_dir: None,
            market: GridConfig::default(),
            learning: LearningParams::default(),
            scenarios: vec![
                Scenario::new("Scenario 1", 0.8, 0.6, -0.3, 0.02),
                Scenario::new("Scenario 2", 0.7, 0.4, -0.2, 0.01),
                Scenario::new("Scenario 3", 0.6, 0.35, -0.05, 0.015),
                Scenario::new("Scenario 4", 0.9, 0.5, -0.2, 0.03),
            ],
        }
    }
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_episodes < 1 {
            return Err(QallocError::config("num_episodes must be at least 1"));
        }
        if self.report_window < 1 {
            return Err(QallocError::config("report_window must be at least 1"));
        }
        if self.scenarios.is_empty() {
            return Err(QallocError::config("at least one scenario is required"));
        }
        self.learning.validate()?;
        for scenario in &self.scenarios {
            scenario.market_params(&self.market).validate().map_err(|e| {
                QallocError::config(format!("scenario '{}': {}", scenario.name, e))
            })?;
        }
        if self.initial_wealth % self.market.w_step != 0 || self.initial_wealth > self.market.w_max {
            return Err(QallocError::config(format!(
                "initial_wealth {} is not on the wealth grid",
                self.initial_wealth
            )));
        }
        Ok(())
    }
}
