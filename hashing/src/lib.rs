use ethereum_types::H256;
use sha2::{Digest as _, Sha256};

#[must_use]
pub fn hash_256(bytes: impl AsRef<[u8]>) -> H256 {
    H256(Sha256::digest(bytes).into())
}

#[must_use]
pub fn hash_256_256(first: H256, second: H256) -> H256 {
    let mut hasher = Sha256::new();
    hasher.update(first);
    hasher.update(second);
    H256(hasher.finalize().into())
}

/// Digest of a 32 byte hash concatenated with a little-endian 64 bit integer.
///
/// Used to compute RANDAO mixes and shuffling sources.
#[must_use]
pub fn hash_256_64(hash: H256, number: u64) -> H256 {
    let mut hasher = Sha256::new();
    hasher.update(hash);
    hasher.update(number.to_le_bytes());
    H256(hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    use super::*;

    // The digest of an empty input is a well-known constant.
    #[test]
    fn hash_256_of_empty_input_matches_specification() {
        assert_eq!(
            hash_256([]),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
                .parse::<H256>()
                .expect("the literal is a valid H256"),
        );
    }

    #[test]
    fn hash_256_256_matches_concatenated_hash() {
        let first = H256::repeat_byte(0xab);
        let second = H256::repeat_byte(0xcd);

        let mut concatenated = [0; 64];
        concatenated[..32].copy_from_slice(first.as_bytes());
        concatenated[32..].copy_from_slice(second.as_bytes());

        assert_eq!(hash_256_256(first, second), hash_256(concatenated));
    }
}
