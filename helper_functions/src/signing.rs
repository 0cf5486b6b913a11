use bls::{AggregateSignatureBytes, PublicKeyBytes, SecretKey, Signature, SignatureBytes};
use tree_hash::TreeHash;
use types::phase0::{containers::SigningData, primitives::H256};

use crate::error::Error;

#[must_use]
pub fn compute_signing_root(object: &impl TreeHash, domain: H256) -> H256 {
    compute_signing_root_from_root(object.tree_hash_root(), domain)
}

#[must_use]
pub fn compute_signing_root_from_root(object_root: H256, domain: H256) -> H256 {
    SigningData {
        object_root,
        domain,
    }
    .tree_hash_root()
}

#[must_use]
pub fn sign(secret_key: &SecretKey, object: &impl TreeHash, domain: H256) -> SignatureBytes {
    secret_key
        .sign(compute_signing_root(object, domain))
        .to_bytes()
}

pub fn verify(
    object: &impl TreeHash,
    domain: H256,
    public_key: PublicKeyBytes,
    signature_bytes: SignatureBytes,
) -> Result<(), Error> {
    verify_root(object.tree_hash_root(), domain, public_key, signature_bytes)
}

pub fn verify_root(
    object_root: H256,
    domain: H256,
    public_key: PublicKeyBytes,
    signature_bytes: SignatureBytes,
) -> Result<(), Error> {
    let public_key = public_key
        .decompress()
        .map_err(|_| Error::InvalidSignature)?;

    let signature =
        Signature::try_from(signature_bytes).map_err(|_| Error::InvalidSignature)?;

    let signing_root = compute_signing_root_from_root(object_root, domain);

    if signature.verify(signing_root, &public_key) {
        Ok(())
    } else {
        Err(Error::InvalidSignature)
    }
}

pub fn verify_aggregate(
    object: impl TreeHash,
    domain: H256,
    public_keys: &[PublicKeyBytes],
    signature_bytes: AggregateSignatureBytes,
) -> Result<(), Error> {
    let decompressed = public_keys
        .iter()
        .map(|bytes| bytes.decompress().map_err(|_| Error::InvalidSignature))
        .collect::<Result<Vec<_>, _>>()?;

    let signature =
        Signature::try_from(signature_bytes).map_err(|_| Error::InvalidSignature)?;

    let signing_root = compute_signing_root(&object, domain);

    if signature.fast_aggregate_verify(signing_root, decompressed.iter()) {
        Ok(())
    } else {
        Err(Error::InvalidSignature)
    }
}
