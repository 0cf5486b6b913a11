//! The swap-or-not shuffle.
//!
//! See the following for an explanation of the algorithm:
//! - <https://github.com/protolambda/eth2-docs/tree/de65f38857f1e27ffb6f25107d61e795cf1a5ad7#shuffling>
//! - <https://link.springer.com/chapter/10.1007/978-3-642-32009-5_1>
//!
//! The output must be bit-exact across implementations. Committee assignment
//! and proposer selection are derived from it, so any divergence forks the
//! chain.

use hashing::hash_256;
use types::{phase0::primitives::H256, preset::Preset};

/// Runs `index` forward through the shuffle.
///
/// `compute_committee` maps positions through this permutation one at a time,
/// which avoids shuffling the whole registry when only one committee is
/// needed.
#[must_use]
pub fn shuffled_index<P: Preset>(mut index: u64, index_count: u64, seed: H256) -> u64 {
    assert!(index < index_count);

    for round in 0..P::SHUFFLE_ROUND_COUNT {
        let pivot = round_pivot(seed, round, index_count);
        let flip = (pivot + index_count - index) % index_count;
        let position = index.max(flip);

        let source = round_source(seed, round, position);
        let byte = source.as_bytes()[usize::try_from(position % 256 / 8)
            .expect("the dividend is less than 256, so the quotient fits in usize")];
        let bit = byte >> (position % 8) & 1;

        if bit == 1 {
            index = flip;
        }
    }

    index
}

/// Shuffles a whole slice.
///
/// `result[i] == original[shuffled_index(i)]`, matching the ordering
/// `compute_committee` produces.
pub fn shuffle_slice<P: Preset, T: Copy>(slice: &mut [T], seed: H256) {
    let length = slice.len() as u64;

    if length == 0 {
        return;
    }

    let original = slice.to_vec();

    for (position, element) in slice.iter_mut().enumerate() {
        let source_position = shuffled_index::<P>(position as u64, length, seed);
        *element = original[usize::try_from(source_position)
            .expect("shuffled indices are bounded by the slice length")];
    }
}

fn round_pivot(seed: H256, round: u8, index_count: u64) -> u64 {
    let mut input = [0; 33];
    input[..32].copy_from_slice(seed.as_bytes());
    input[32] = round;

    let digest = hash_256(input);
    u64::from_le_bytes(
        digest.as_bytes()[..8]
            .try_into()
            .expect("the slice is exactly 8 bytes long"),
    ) % index_count
}

fn round_source(seed: H256, round: u8, position: u64) -> H256 {
    let mut input = [0; 37];
    input[..32].copy_from_slice(seed.as_bytes());
    input[32] = round;
    input[33..].copy_from_slice(&u32::try_from(position / 256)
        .expect("positions fit in u32 for all realistic registry sizes")
        .to_le_bytes());

    hash_256(input)
}

#[cfg(test)]
mod tests {
    use itertools::Itertools as _;
    use test_case::test_case;
    use types::preset::{Mainnet, Minimal};

    use super::*;

    #[test_case(1)]
    #[test_case(2)]
    #[test_case(33)]
    #[test_case(1000)]
    fn shuffled_index_is_a_permutation(index_count: u64) {
        let seed = H256::repeat_byte(0x2a);

        let outputs = (0..index_count)
            .map(|index| shuffled_index::<Minimal>(index, index_count, seed))
            .sorted()
            .collect::<Vec<_>>();

        assert_eq!(outputs, (0..index_count).collect::<Vec<_>>());
    }

    #[test]
    fn shuffle_slice_agrees_with_shuffled_index() {
        let seed = H256::repeat_byte(0x17);
        let original = (0_u64..97).collect::<Vec<_>>();

        let mut shuffled = original.clone();
        shuffle_slice::<Mainnet, _>(&mut shuffled, seed);

        for (position, element) in shuffled.iter().enumerate() {
            let source = shuffled_index::<Mainnet>(position as u64, 97, seed);
            assert_eq!(*element, original[source as usize]);
        }
    }

    #[test]
    fn different_seeds_produce_different_orderings() {
        let mut first = (0_u64..128).collect::<Vec<_>>();
        let mut second = first.clone();

        shuffle_slice::<Mainnet, _>(&mut first, H256::repeat_byte(1));
        shuffle_slice::<Mainnet, _>(&mut second, H256::repeat_byte(2));

        assert_ne!(first, second);
    }
}
