//! Storage module - key-value engines, staged overlay, typed ledger

mod kv;
mod ledger;
mod staged;
pub mod db;

pub use db::SledStore;
pub use kv::*;
pub use ledger::*;
pub use staged::*;
