use serde::{Deserialize, Serialize};

/// Exploration rate decaying exponentially from `start` toward `end`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExponentialDecay {
    pub start: f64,
    pub end: f64,
    pub rate: f64,
}

impl ExponentialDecay {
    pub fn new(start: f64, end: f64, rate: f64) -> Self {
        ExponentialDecay { start, end, rate }
    }

    pub fn epsilon(&self, episode: usize) -> f64 {
        self.end + (self.start - self.end) * (-self.rate * episode as f64).exp()
    }
}
