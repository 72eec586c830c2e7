//! Consensus module - block shapes, block state, weight, rewards, validation

mod block;
mod checkpoint;
mod prime;
mod rewards;
mod state;
mod validation;
mod weight;

pub use block::*;
pub use checkpoint::*;
pub use prime::*;
pub use rewards::*;
pub use state::*;
pub use validation::*;
pub use weight::*;
