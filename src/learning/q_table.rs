use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::Stage;

/// Jagged Q-table: one row per (stage, wealth index), each row sized to the
/// number of investment candidates at that wealth level. There are no padding
/// cells, so an out-of-range action index is simply absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QTable {
    horizon: Stage,
    n_wealth: usize,
    rows: Vec<Vec<f64>>,
}

impl QTable {
    /// Zero-initialised table; `row_lens[w_idx]` is the candidate count at
    /// that wealth index, shared by every stage.
    pub fn new(horizon: Stage, row_lens: &[usize], init_q_value: f64) -> Self {
        let rows = (0..horizon)
            .cartesian_product(row_lens)
            .map(|(_, &len)| vec![init_q_value; len])
            .collect();
        QTable {
            horizon,
            n_wealth: row_lens.len(),
            rows,
        }
    }

    /// Q-values of one state, or `None` outside the table.
    pub fn row(&self, t: Stage, w_idx: usize) -> Option<&[f64]> {
        let offset = self.offset(t, w_idx)?;
        Some(&self.rows[offset])
    }

    pub fn get(&self, t: Stage, w_idx: usize, a_idx: usize) -> Option<f64> {
        self.row(t, w_idx)?.get(a_idx).copied()
    }

    pub fn get_mut(&mut self, t: Stage, w_idx: usize, a_idx: usize) -> Option<&mut f64> {
        let offset = self.offset(t, w_idx)?;
        self.rows[offset].get_mut(a_idx)
    }

    /// Largest value in a row.
    pub fn max_in_row(&self, t: Stage, w_idx: usize) -> Option<f64> {
        let row = self.row(t, w_idx)?;
        Some(row.iter().copied().fold(f64::NEG_INFINITY, f64::max))
    }

    /// Sum of absolute element-wise differences against `previous`.
    pub fn delta(&self, previous: &QTable) -> f64 {
        debug_assert_eq!(self.rows.len(), previous.rows.len());
        self.rows
            .iter()
            .flatten()
            .zip(previous.rows.iter().flatten())
            .map(|(now, before)| (now - before).abs())
            .sum()
    }

    /// Iterate every cell as `(stage, wealth index, action index, value)`.
    pub fn iter(&self) -> impl Iterator<Item = (Stage, usize, usize, f64)> + '_ {
        self.rows.iter().enumerate().flat_map(move |(offset, row)| {
            let (t, w_idx) = (offset / self.n_wealth, offset % self.n_wealth);
            row.iter()
                .enumerate()
                .map(move |(a_idx, &q)| (t, w_idx, a_idx, q))
        })
    }

    fn offset(&self, t: Stage, w_idx: usize) -> Option<usize> {
        if t >= self.horizon || w_idx >= self.n_wealth {
            return None;
        }
        Some(t * self.n_wealth + w_idx)
    }
}
