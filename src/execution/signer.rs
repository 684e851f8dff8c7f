//! Local transaction signing
//!
//! Secrets never leave the process: the venue returns an unsigned
//! transaction, the account's keypair signs it here.

use super::swap::UnsignedTransfer;
use crate::errors::SwapError;
use solana_sdk::signature::Keypair;
use solana_sdk::transaction::VersionedTransaction;

/// Wire-ready signed transaction
#[derive(Debug, Clone)]
pub struct SignedTransfer {
    /// Base58 fee-payer signature, which is also the transaction id
    pub signature: String,
    pub wire: Vec<u8>,
}

pub fn sign_transfer(unsigned: &UnsignedTransfer, keypair: &Keypair) -> Result<SignedTransfer, SwapError> {
    let tx: VersionedTransaction = bincode::deserialize(&unsigned.transaction)
        .map_err(|e| SwapError::Malformed(format!("transaction bytes: {}", e)))?;

    let signed = VersionedTransaction::try_new(tx.message, &[keypair])
        .map_err(|e| SwapError::Signing(e.to_string()))?;

    let signature = signed
        .signatures
        .first()
        .map(|s| s.to_string())
        .ok_or_else(|| SwapError::Signing("transaction has no signatures".to_string()))?;

    let wire = bincode::serialize(&signed).map_err(|e| SwapError::Signing(e.to_string()))?;

    Ok(SignedTransfer { signature, wire })
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::message::{Message, VersionedMessage};
    use solana_sdk::signature::{Signature, Signer};

    fn unsigned_for(payer: &Keypair) -> UnsignedTransfer {
        let message = Message::new(&[], Some(&payer.pubkey()));
        let tx = VersionedTransaction {
            signatures: vec![Signature::default()],
            message: VersionedMessage::Legacy(message),
        };
        UnsignedTransfer {
            transaction: bincode::serialize(&tx).unwrap(),
            last_valid_block_height: Some(100),
        }
    }

    #[test]
    fn test_signs_with_account_key() {
        let payer = Keypair::new();
        let signed = sign_transfer(&unsigned_for(&payer), &payer).unwrap();

        let decoded: VersionedTransaction = bincode::deserialize(&signed.wire).unwrap();
        assert_ne!(decoded.signatures[0], Signature::default());
        assert_eq!(decoded.signatures[0].to_string(), signed.signature);
        assert!(decoded.verify_with_results().iter().all(|ok| *ok));
    }

    #[test]
    fn test_wrong_key_is_rejected() {
        let payer = Keypair::new();
        let stranger = Keypair::new();
        assert!(matches!(
            sign_transfer(&unsigned_for(&payer), &stranger),
            Err(SwapError::Signing(_))
        ));
    }

    #[test]
    fn test_garbage_bytes_are_malformed() {
        let unsigned = UnsignedTransfer {
            transaction: vec![1, 2, 3],
            last_valid_block_height: None,
        };
        assert!(matches!(
            sign_transfer(&unsigned, &Keypair::new()),
            Err(SwapError::Malformed(_))
        ));
    }
}
