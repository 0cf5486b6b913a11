use core::fmt::{Debug, Formatter, Result as FmtResult};

use blst::min_pk::SecretKey as RawSecretKey;

use crate::{Error, PublicKey, SecretKeyBytes, Signature, DOMAIN_SEPARATION_TAG};

pub struct SecretKey(RawSecretKey);

// Redact the key material rather than omitting the impl entirely.
// Error types in dependent crates require their sources to implement `Debug`.
impl Debug for SecretKey {
    fn fmt(&self, formatter: &mut Formatter) -> FmtResult {
        formatter.write_str("SecretKey(_)")
    }
}

impl SecretKey {
    pub fn from_bytes(bytes: SecretKeyBytes) -> Result<Self, Error> {
        RawSecretKey::from_bytes(bytes.as_ref())
            .map(Self)
            .map_err(|_| Error::InvalidSecretKey)
    }

    pub fn derive(input_key_material: &[u8]) -> Result<Self, Error> {
        RawSecretKey::key_gen(input_key_material, &[])
            .map(Self)
            .map_err(|_| Error::InvalidSecretKey)
    }

    #[must_use]
    pub fn to_public_key(&self) -> PublicKey {
        PublicKey(self.0.sk_to_pk())
    }

    #[must_use]
    pub fn sign(&self, message: impl AsRef<[u8]>) -> Signature {
        Signature(self.0.sign(message.as_ref(), DOMAIN_SEPARATION_TAG, &[]))
    }
}
