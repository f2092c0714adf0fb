pub mod config;
pub mod error;
pub mod learning;
pub mod market;
pub mod scenario;
pub mod stats;
pub mod trainer;

pub use error::{QallocError, Result};

pub type UInt = u32;
pub type Stage = usize;
