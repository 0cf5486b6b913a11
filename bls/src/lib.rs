//! Minimal BLS12-381 wrappers over [`blst`] in the form the rest of the
//! application consumes: compressed byte forms for containers and lazily
//! decompressed forms for verification.

pub use crate::{
    cached_public_key::CachedPublicKey, error::Error, public_key::PublicKey,
    public_key_bytes::PublicKeyBytes, secret_key::SecretKey, secret_key_bytes::SecretKeyBytes,
    signature::Signature, signature_bytes::SignatureBytes,
    uncompressed_public_key_bytes::UncompressedPublicKeyBytes,
};

pub type AggregatePublicKey = PublicKey;
pub type AggregateSignature = Signature;
pub type AggregateSignatureBytes = SignatureBytes;

mod cached_public_key;
mod error;
mod public_key;
mod public_key_bytes;
mod secret_key;
mod secret_key_bytes;
mod signature;
mod signature_bytes;
mod uncompressed_public_key_bytes;

const DOMAIN_SEPARATION_TAG: &[u8] = b"BLS_SIG_BLS12381G2_XMD:SHA-256_SSWU_RO_POP_";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_roundtrip_verifies() {
        let secret_key = SecretKey::from_bytes(SecretKeyBytes([1; 32]))
            .expect("1 is below the BLS12-381 subgroup order");

        let public_key = secret_key.to_public_key();
        let message = b"beacon";
        let signature = secret_key.sign(message);

        assert!(signature.verify(message, &public_key));
        assert!(!signature.verify(b"other", &public_key));
    }

    #[test]
    fn aggregate_signature_verifies_against_all_public_keys() {
        let message = b"beacon";

        let (public_keys, signatures): (Vec<_>, Vec<_>) = (1_u8..4)
            .map(|index| {
                let secret_key = SecretKey::from_bytes(SecretKeyBytes([index; 32]))
                    .expect("small numbers are below the BLS12-381 subgroup order");
                (secret_key.to_public_key(), secret_key.sign(message))
            })
            .unzip();

        let mut aggregate = signatures[0];
        for signature in &signatures[1..] {
            aggregate.aggregate_in_place(*signature);
        }

        assert!(aggregate.fast_aggregate_verify(message, public_keys.iter()));
    }
}
