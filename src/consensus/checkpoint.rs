//! Checkpoint timespans

use super::BlockState;

/// Whether `block` opens a new checkpoint interval after `checkpoint`
pub fn is_new_timespan(block: &BlockState, checkpoint: &BlockState, timespan: u64) -> bool {
    block.time().saturating_sub(checkpoint.time()) >= timespan
}
