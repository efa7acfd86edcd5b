//! Detached payload-signature verification.
//!
//! The client proves intent by signing the canonical bytes of its
//! [`AuthorizationPayload`](crate::types::AuthorizationPayload) with the key
//! it claims. Verification is a pure function over `(message, signature, key)`
//! with no I/O: it delegates entirely to the ed25519 verify primitive and
//! never compares signature bytes by hand.
//!
//! Malformed signatures, undecodable keys, and honest mismatches are the same
//! observable outcome (`false`) so callers cannot branch on why a proof failed.

use solana_signature::Signature;
use std::str::FromStr;

use crate::types::Address;

/// Verifies a detached base58 ed25519 signature over `message` against
/// `public_key`. Returns `false` on any decoding failure.
pub fn verify_detached(message: &[u8], signature_b58: &str, public_key: &Address) -> bool {
    let Ok(signature) = Signature::from_str(signature_b58) else {
        return false;
    };
    signature.verify(public_key.as_ref(), message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_keypair::Keypair;
    use solana_signer::Signer;

    fn signed_message() -> (Vec<u8>, String, Address) {
        let keypair = Keypair::new();
        let message = b"{\"amount\":\"100000\",\"nonce\":\"abc\"}".to_vec();
        let signature = keypair.sign_message(&message);
        (
            message,
            signature.to_string(),
            Address::new(keypair.pubkey()),
        )
    }

    #[test]
    fn test_valid_signature_verifies() {
        let (message, signature, address) = signed_message();
        assert!(verify_detached(&message, &signature, &address));
    }

    #[test]
    fn test_verification_is_deterministic() {
        let (message, signature, address) = signed_message();
        let first = verify_detached(&message, &signature, &address);
        let second = verify_detached(&message, &signature, &address);
        assert_eq!(first, second);
        assert!(first);
    }

    #[test]
    fn test_wrong_key_fails() {
        let (message, signature, _) = signed_message();
        let other = Address::new(Keypair::new().pubkey());
        assert!(!verify_detached(&message, &signature, &other));
    }

    #[test]
    fn test_any_flipped_signature_byte_fails() {
        let (message, signature, address) = signed_message();
        let mut bytes = bs58::decode(&signature).into_vec().unwrap();
        for i in 0..bytes.len() {
            bytes[i] ^= 0x01;
            let tampered = bs58::encode(&bytes).into_string();
            assert!(
                !verify_detached(&message, &tampered, &address),
                "flipped byte {i} still verified"
            );
            bytes[i] ^= 0x01;
        }
    }

    #[test]
    fn test_tampered_message_fails() {
        let (mut message, signature, address) = signed_message();
        message[0] ^= 0x01;
        assert!(!verify_detached(&message, &signature, &address));
    }

    #[test]
    fn test_malformed_signature_is_false_not_error() {
        let (message, _, address) = signed_message();
        assert!(!verify_detached(&message, "", &address));
        assert!(!verify_detached(&message, "not-base58-!!!", &address));
        assert!(!verify_detached(&message, "abcd", &address));
    }
}
