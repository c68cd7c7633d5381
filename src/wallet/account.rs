//! Signing account.
//!
//! # Security
//! - The private key is parsed once and held only inside the signer
//! - Keys are never logged, serialized or shown in `Debug` output
//! - Signing is pure and synchronous; no network access

use std::fmt;

use alloy::consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy::eips::eip2718::Encodable2718;
use alloy::primitives::{Address, Bytes, TxKind};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;

use crate::config::SecretKey;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::transaction::types::{SignedTransaction, UnsignedTransaction};

/// The single signing identity of an orchestrator.
#[derive(Clone)]
pub struct Account {
    signer: PrivateKeySigner,
}

impl Account {
    /// Create an account from a hex-encoded private key, with or without `0x`.
    pub fn from_private_key(private_key_hex: &str) -> OrchestratorResult<Self> {
        let key_hex = private_key_hex.trim();
        let key_hex = key_hex.strip_prefix("0x").unwrap_or(key_hex);

        // The parse error is not echoed, it may quote key material
        let signer: PrivateKeySigner = key_hex
            .parse()
            .map_err(|_| OrchestratorError::Configuration("invalid private key format".into()))?;

        tracing::info!(address = %signer.address(), "Signing account loaded");

        Ok(Self { signer })
    }

    pub fn from_secret(secret: &SecretKey) -> OrchestratorResult<Self> {
        Self::from_private_key(secret.expose())
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Sign `tx` as an EIP-155 legacy transaction.
    pub fn sign(&self, tx: &UnsignedTransaction) -> OrchestratorResult<SignedTransaction> {
        if tx.from != self.address() {
            return Err(OrchestratorError::InvalidTransaction(format!(
                "transaction from {} cannot be signed by {}",
                tx.from,
                self.address()
            )));
        }
        if tx.chain_id == 0 {
            return Err(OrchestratorError::InvalidTransaction("chain id is 0".into()));
        }
        if tx.gas_limit == 0 {
            return Err(OrchestratorError::InvalidTransaction("gas limit is 0".into()));
        }
        if tx.gas_price == 0 {
            return Err(OrchestratorError::InvalidTransaction("gas price is 0".into()));
        }

        let legacy = TxLegacy {
            chain_id: Some(tx.chain_id),
            nonce: tx.nonce,
            gas_price: tx.gas_price,
            gas_limit: tx.gas_limit,
            to: TxKind::Call(tx.to),
            value: tx.value,
            input: tx.data.clone(),
        };

        let signature = self
            .signer
            .sign_hash_sync(&legacy.signature_hash())
            .map_err(|e| OrchestratorError::InvalidTransaction(format!("signing failed: {e}")))?;

        let envelope = TxEnvelope::Legacy(legacy.into_signed(signature));
        let hash = *envelope.tx_hash();

        Ok(SignedTransaction {
            hash,
            raw: Bytes::from(envelope.encoded_2718()),
            from: tx.from,
            nonce: tx.nonce,
        })
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::consensus::Transaction;
    use alloy::eips::eip2718::Decodable2718;
    use alloy::primitives::U256;

    // Well-known test private key (Anvil's first account)
    const TEST_PRIVATE_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const TEST_ADDRESS: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";

    fn unsigned(account: &Account) -> UnsignedTransaction {
        UnsignedTransaction {
            from: account.address(),
            to: Address::repeat_byte(0x22),
            value: U256::from(1_000u64),
            data: Bytes::new(),
            gas_limit: 21_000,
            gas_price: 1_000_000_000,
            nonce: 7,
            chain_id: 11_155_111,
        }
    }

    #[test]
    fn test_account_from_private_key() {
        let account = Account::from_private_key(TEST_PRIVATE_KEY).unwrap();
        assert_eq!(account.address().to_string().to_lowercase(), TEST_ADDRESS);

        let prefixed = Account::from_private_key(&format!("0x{TEST_PRIVATE_KEY}")).unwrap();
        assert_eq!(prefixed.address(), account.address());
    }

    #[test]
    fn test_invalid_private_key() {
        let err = Account::from_private_key("invalid_key").unwrap_err();
        assert!(matches!(err, OrchestratorError::Configuration(_)));
    }

    #[test]
    fn test_debug_hides_key() {
        let account = Account::from_private_key(TEST_PRIVATE_KEY).unwrap();
        let debug = format!("{account:?}");
        assert!(!debug.contains(TEST_PRIVATE_KEY));
        assert!(debug.to_lowercase().contains(TEST_ADDRESS));
    }

    #[test]
    fn test_sign_produces_recoverable_legacy_tx() {
        let account = Account::from_private_key(TEST_PRIVATE_KEY).unwrap();
        let signed = account.sign(&unsigned(&account)).unwrap();

        let envelope = TxEnvelope::decode_2718(&mut signed.raw.as_ref()).unwrap();
        let legacy = envelope.as_legacy().unwrap();
        assert_eq!(*legacy.hash(), signed.hash);
        assert_eq!(legacy.tx().nonce(), 7);
        assert_eq!(legacy.tx().chain_id, Some(11_155_111));

        let recovered = legacy
            .signature()
            .recover_address_from_prehash(&legacy.tx().signature_hash())
            .unwrap();
        assert_eq!(recovered, account.address());
    }

    #[test]
    fn test_sign_rejects_invalid_parameters() {
        let account = Account::from_private_key(TEST_PRIVATE_KEY).unwrap();

        let mut tx = unsigned(&account);
        tx.from = Address::repeat_byte(0x99);
        assert!(matches!(account.sign(&tx), Err(OrchestratorError::InvalidTransaction(_))));

        let mut tx = unsigned(&account);
        tx.chain_id = 0;
        assert!(account.sign(&tx).is_err());

        let mut tx = unsigned(&account);
        tx.gas_limit = 0;
        assert!(account.sign(&tx).is_err());

        let mut tx = unsigned(&account);
        tx.gas_price = 0;
        assert!(account.sign(&tx).is_err());
    }
}
