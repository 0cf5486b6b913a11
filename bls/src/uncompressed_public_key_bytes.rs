use fixed_hash::construct_fixed_hash;
use impl_serde::impl_fixed_hash_serde;
use ssz::{Decode, DecodeError, Encode};

use crate::{Error, PublicKey};

construct_fixed_hash! {
    /// An uncompressed G1 point.
    ///
    /// Stored instead of the compressed form where decompression cost
    /// matters more than size, such as the on-disk validator registry.
    pub struct UncompressedPublicKeyBytes(96);
}

impl_fixed_hash_serde!(UncompressedPublicKeyBytes, 96);

impl Encode for UncompressedPublicKeyBytes {
    fn is_ssz_fixed_len() -> bool {
        true
    }

    fn ssz_fixed_len() -> usize {
        Self::len_bytes()
    }

    fn ssz_bytes_len(&self) -> usize {
        Self::len_bytes()
    }

    fn ssz_append(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(self.as_bytes());
    }
}

impl Decode for UncompressedPublicKeyBytes {
    fn is_ssz_fixed_len() -> bool {
        true
    }

    fn ssz_fixed_len() -> usize {
        Self::len_bytes()
    }

    fn from_ssz_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() != Self::len_bytes() {
            return Err(DecodeError::InvalidByteLength {
                len: bytes.len(),
                expected: Self::len_bytes(),
            });
        }

        Ok(Self::from_slice(bytes))
    }
}

impl From<PublicKey> for UncompressedPublicKeyBytes {
    fn from(public_key: PublicKey) -> Self {
        Self(public_key.as_raw().serialize())
    }
}

impl UncompressedPublicKeyBytes {
    pub fn deserialize(self) -> Result<PublicKey, Error> {
        blst::min_pk::PublicKey::deserialize(self.as_bytes())
            .map(PublicKey)
            .map_err(|_| Error::InvalidPublicKey)
    }
}
