use fixed_hash::construct_fixed_hash;
use impl_serde::impl_fixed_hash_serde;
use ssz::{Decode, DecodeError, Encode};
use tree_hash::{Hash256, PackedEncoding, TreeHash, TreeHashType};

construct_fixed_hash! {
    #[derive(derive_more::AsRef)]
    pub struct SignatureBytes(96);
}

impl_fixed_hash_serde!(SignatureBytes, 96);

impl Encode for SignatureBytes {
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

impl Decode for SignatureBytes {
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

impl TreeHash for SignatureBytes {
    fn tree_hash_type() -> TreeHashType {
        TreeHashType::Vector
    }

    fn tree_hash_packed_encoding(&self) -> PackedEncoding {
        unreachable!("vectors are not packed")
    }

    fn tree_hash_packing_factor() -> usize {
        unreachable!("vectors are not packed")
    }

    fn tree_hash_root(&self) -> Hash256 {
        tree_hash::merkle_root(self.as_bytes(), 0)
    }
}

impl SignatureBytes {
    /// The compressed point at infinity.
    ///
    /// Blocks produced before any sync committee participation carry it in
    /// their sync aggregates, and default-constructed containers use it too.
    #[must_use]
    pub fn empty() -> Self {
        let mut bytes = Self::zero();
        bytes.as_mut()[0] = 0xc0;
        bytes
    }

    #[must_use]
    pub fn is_empty(self) -> bool {
        self == Self::empty()
    }
}
