//! Node module - genesis and best-chain relay

mod genesis;
mod relay;

pub use genesis::*;
pub use relay::*;
