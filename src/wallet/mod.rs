//! Wallet module - key management and chain notifications

mod wallet;

pub use wallet::*;

use crate::crypto::Hash;
use crate::validation::{LegacyTransaction, Transaction};

/// Wallet hooks invoked by the chain.
///
/// Notifications are fire-and-forget: the chain logs refund failures and
/// carries on.
pub trait WalletNotifier: Send + Sync {
    /// `tx` was connected in `block`
    fn notify_if_involving(&self, tx: &Transaction, block: &Hash);

    /// Whether a legacy transaction was authored by this wallet
    fn is_mine(&self, tx: &LegacyTransaction) -> bool;

    /// A local coinstake was disconnected; make its inputs spendable again
    fn refund_stake(&self, tx: &LegacyTransaction) -> Result<(), WalletError>;
}
