//! Account credential decoding
//!
//! Two input formats decode to the same 64-byte keypair:
//! a bracketed byte array (`[12,34,...]`) or a base58 string.

use crate::errors::CredentialError;
use solana_sdk::signature::{Keypair, Signer};
use std::collections::HashSet;
use tracing::warn;

/// Length of a raw ed25519 keypair (secret + public)
pub const KEYPAIR_LENGTH: usize = 64;

/// Decode a single credential into a keypair
pub fn decode_credential(raw: &str) -> Result<Keypair, CredentialError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(CredentialError::Empty);
    }

    let bytes = if trimmed.starts_with('[') {
        serde_json::from_str::<Vec<u8>>(trimmed)
            .map_err(|e| CredentialError::InvalidArray(e.to_string()))?
    } else {
        bs58::decode(trimmed)
            .into_vec()
            .map_err(|e| CredentialError::InvalidEncoding(e.to_string()))?
    };

    if bytes.len() != KEYPAIR_LENGTH {
        return Err(CredentialError::WrongLength(bytes.len()));
    }

    Keypair::from_bytes(&bytes).map_err(|e| CredentialError::InvalidKeypair(e.to_string()))
}

/// Result of decoding a batch of credentials
pub struct DecodedCredentials {
    pub keypairs: Vec<Keypair>,
    /// Index into the supplied list and the reason it was skipped
    pub rejected: Vec<(usize, CredentialError)>,
}

/// Decode a batch, skipping malformed entries and duplicate keys
pub fn decode_credentials(raw: &[String]) -> DecodedCredentials {
    let mut keypairs = Vec::new();
    let mut rejected = Vec::new();
    let mut seen = HashSet::new();

    for (index, entry) in raw.iter().enumerate() {
        match decode_credential(entry) {
            Ok(keypair) => {
                if seen.insert(keypair.pubkey()) {
                    keypairs.push(keypair);
                } else {
                    warn!("[Wallet] Skipping duplicate credential #{} ({})", index, keypair.pubkey());
                }
            }
            Err(e) => {
                // Never log the entry itself
                warn!("[Wallet] Skipping credential #{}: {}", index, e);
                rejected.push((index, e));
            }
        }
    }

    DecodedCredentials { keypairs, rejected }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_base58() {
        let keypair = Keypair::new();
        let decoded = decode_credential(&keypair.to_base58_string()).unwrap();
        assert_eq!(decoded.pubkey(), keypair.pubkey());
    }

    #[test]
    fn test_decode_byte_array() {
        let keypair = Keypair::new();
        let array = serde_json::to_string(&keypair.to_bytes().to_vec()).unwrap();
        assert!(array.starts_with('['));

        let decoded = decode_credential(&array).unwrap();
        assert_eq!(decoded.pubkey(), keypair.pubkey());
    }

    #[test]
    fn test_decode_rejects_malformed() {
        assert_eq!(decode_credential("   ").unwrap_err(), CredentialError::Empty);
        assert!(matches!(
            decode_credential("[1,2,300]"),
            Err(CredentialError::InvalidArray(_))
        ));
        assert!(matches!(
            decode_credential("not-base58-0OIl"),
            Err(CredentialError::InvalidEncoding(_))
        ));
        assert_eq!(
            decode_credential("[1,2,3]").unwrap_err(),
            CredentialError::WrongLength(3)
        );
    }

    #[test]
    fn test_batch_skips_bad_entries() {
        let a = Keypair::new();
        let b = Keypair::new();
        let raw = vec![
            a.to_base58_string(),
            "garbage!".to_string(),
            b.to_base58_string(),
            a.to_base58_string(),
        ];

        let decoded = decode_credentials(&raw);
        assert_eq!(decoded.keypairs.len(), 2);
        assert_eq!(decoded.keypairs[0].pubkey(), a.pubkey());
        assert_eq!(decoded.keypairs[1].pubkey(), b.pubkey());
        assert_eq!(decoded.rejected.len(), 1);
        assert_eq!(decoded.rejected[0].0, 1);
    }
}
