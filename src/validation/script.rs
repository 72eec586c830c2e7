//! Legacy script evaluation
//!
//! The default engine understands a single script form: a 32-byte public key
//! followed by a 64-byte Schnorr signature over the transaction's signing
//! hash. The key must hash to the spent output's recipient.

use crate::crypto::{PrivateKey, PublicKey};

use super::{LegacyTransaction, TxOutput};

pub trait ScriptEngine: Send + Sync {
    /// Verify input `index` of `tx` against the output it spends
    fn verify_input(&self, tx: &LegacyTransaction, index: usize, spent: &TxOutput) -> bool;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SignatureScripts;

const SCRIPT_LEN: usize = 32 + 64;

impl ScriptEngine for SignatureScripts {
    fn verify_input(&self, tx: &LegacyTransaction, index: usize, spent: &TxOutput) -> bool {
        let Some(input) = tx.inputs.get(index) else {
            return false;
        };
        if input.script.len() != SCRIPT_LEN {
            return false;
        }

        let mut key = [0u8; 32];
        key.copy_from_slice(&input.script[..32]);
        let public_key = match PublicKey::from_bytes(&key) {
            Ok(pk) => pk,
            Err(_) => return false,
        };

        if public_key.key_hash() != spent.pubkey_hash {
            return false;
        }

        public_key.verify_slice(&tx.signing_hash(), &input.script[32..])
    }
}

/// Build the unlocking script for one input of `tx`
pub fn signature_script(key: &PrivateKey, tx: &LegacyTransaction) -> Vec<u8> {
    let signature = key.sign(&tx.signing_hash());
    let mut script = Vec::with_capacity(SCRIPT_LEN);
    script.extend_from_slice(&key.public_key().0);
    script.extend_from_slice(&signature.to_bytes());
    script
}
