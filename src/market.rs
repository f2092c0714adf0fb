use rand::Rng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use strum_macros::EnumIter;

use crate::error::{QallocError, Result};
use crate::{Stage, UInt};

/// Parameters of the two-asset market and its discretisation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketParams {
    /// Number of decision stages per episode.
    pub horizon: Stage,
    /// Probability that the risky asset pays `a_ret`.
    pub p: f64,
    pub a_ret: f64,
    pub b_ret: f64,
    pub riskless_ret: f64,
    /// Risk aversion of the exponential utility.
    pub alpha_utility: f64,
    pub w_max: UInt,
    pub w_step: UInt,
    pub action_step: UInt,
}

impl MarketParams {
    pub fn validate(&self) -> Result<()> {
        if self.horizon < 1 {
            return Err(QallocError::config("horizon must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.p) {
            return Err(QallocError::config(format!(
                "p must lie in [0, 1], got {}",
                self.p
            )));
        }
        if !(self.alpha_utility > 0.0 && self.alpha_utility.is_finite()) {
            return Err(QallocError::config(format!(
                "alpha_utility must be positive, got {}",
                self.alpha_utility
            )));
        }
        if !(self.a_ret.is_finite() && self.b_ret.is_finite() && self.riskless_ret.is_finite()) {
            return Err(QallocError::config("asset returns must be finite"));
        }
        if self.w_step == 0 {
            return Err(QallocError::config("w_step must be positive"));
        }
        if self.action_step == 0 {
            return Err(QallocError::config("action_step must be positive"));
        }
        if self.w_max == 0 || self.w_max % self.w_step != 0 {
            return Err(QallocError::config(format!(
                "w_max ({}) must be a positive multiple of w_step ({})",
                self.w_max, self.w_step
            )));
        }
        Ok(())
    }
}

/// Outcome of the risky asset over one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, Serialize, Deserialize)]
pub enum Outcome {
    High,
    Low,
}

/// Discretised finite-horizon market: wealth grid, per-wealth investment
/// candidates, stochastic transition and terminal utility.
#[derive(Debug, Clone, Serialize)]
pub struct Market {
    params: MarketParams,
    wealth_levels: Vec<UInt>,
    action_candidates: Vec<Vec<UInt>>,
}

impl Market {
    pub fn new(params: MarketParams) -> Result<Self> {
        params.validate()?;
        let wealth_levels: Vec<UInt> = (0..=params.w_max).step_by(params.w_step as usize).collect();
        let action_candidates = wealth_levels
            .iter()
            .map(|&w| (0..=w).step_by(params.action_step as usize).collect())
            .collect();
        Ok(Market {
            params,
            wealth_levels,
            action_candidates,
        })
    }

    pub fn params(&self) -> &MarketParams {
        &self.params
    }

    pub fn horizon(&self) -> Stage {
        self.params.horizon
    }

    /// The ordered grid `0, w_step, ..., w_max`.
    pub fn wealth_levels(&self) -> &[UInt] {
        &self.wealth_levels
    }

    /// Grid index of `w`, or `None` if `w` is off the grid.
    pub fn wealth_index(&self, w: UInt) -> Option<usize> {
        if w % self.params.w_step == 0 && w <= self.params.w_max {
            Some((w / self.params.w_step) as usize)
        } else {
            None
        }
    }

    /// Admissible investments at wealth `w`: `0, action_step, ...` up to `w`.
    pub fn action_candidates(&self, w: UInt) -> Result<&[UInt]> {
        let idx = self.wealth_index(w).ok_or(QallocError::OffGridWealth(w))?;
        Ok(&self.action_candidates[idx])
    }

    /// Candidate sets indexed by wealth grid index.
    pub fn all_action_candidates(&self) -> &[Vec<UInt>] {
        &self.action_candidates
    }

    /// Size of the largest candidate set over the grid.
    pub fn max_candidates(&self) -> usize {
        self.action_candidates
            .iter()
            .map(Vec::len)
            .max()
            .unwrap_or(0)
    }

    pub fn draw_outcome(&self, rng: &mut StdRng) -> Outcome {
        if rng.random::<f64>() < self.params.p {
            Outcome::High
        } else {
            Outcome::Low
        }
    }

    /// Wealth after investing `x` of `w` in the risky asset under `outcome`,
    /// rounded to the nearest grid point (half away from zero) and clamped
    /// into `[0, w_max]`.
    pub fn settle(&self, w: UInt, x: UInt, outcome: Outcome) -> Result<UInt> {
        self.check_action(w, x)?;
        let ret_risky = match outcome {
            Outcome::High => self.params.a_ret,
            Outcome::Low => self.params.b_ret,
        };
        let (w, x) = (f64::from(w), f64::from(x));
        let raw = x * (1.0 + ret_risky) + (w - x) * (1.0 + self.params.riskless_ret);
        let step = f64::from(self.params.w_step);
        let snapped = (raw / step).round() * step;
        Ok(snapped.clamp(0.0, f64::from(self.params.w_max)) as UInt)
    }

    /// Draws one risky outcome and returns the resulting grid wealth.
    pub fn next_state(&self, w: UInt, x: UInt, rng: &mut StdRng) -> Result<UInt> {
        let outcome = self.draw_outcome(rng);
        self.settle(w, x, outcome)
    }

    pub fn utility(&self, w: UInt) -> f64 {
        let alpha = self.params.alpha_utility;
        -(-alpha * f64::from(w)).exp() / alpha
    }

    /// Terminal utility on the last stage, zero before it.
    pub fn reward(&self, t: Stage, w: UInt) -> Result<f64> {
        if t >= self.params.horizon {
            return Err(QallocError::StageOutOfRange {
                stage: t,
                horizon: self.params.horizon,
            });
        }
        if t + 1 == self.params.horizon {
            Ok(self.utility(w))
        } else {
            Ok(0.0)
        }
    }

    fn check_action(&self, w: UInt, x: UInt) -> Result<()> {
        self.wealth_index(w).ok_or(QallocError::OffGridWealth(w))?;
        if x > w || x % self.params.action_step != 0 {
            return Err(QallocError::InvalidAction { wealth: w, action: x });
        }
        Ok(())
    }
}
