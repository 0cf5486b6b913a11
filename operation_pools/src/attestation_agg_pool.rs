use std::collections::{BTreeMap, HashMap};

use bls::{AggregateSignature, AggregateSignatureBytes};
use itertools::Itertools as _;
use ssz_types::{typenum::Unsigned as _, BitList};
use types::{
    phase0::{
        consts::ATTESTATION_PROPAGATION_SLOT_RANGE,
        containers::{Attestation, AttestationData},
        primitives::{Epoch, Slot},
    },
    preset::Preset,
};

/// Aggregates attestations by their data.
///
/// Buckets are keyed by `(slot, committee_index)` through the full
/// [`AttestationData`], since attestations with different checkpoint votes
/// cannot be aggregated even within one committee. Retention is per target
/// epoch; buckets older than the previous epoch are dropped on epoch
/// boundaries.
#[derive(Default)]
pub struct AttestationAggPool<P: Preset> {
    aggregates: BTreeMap<Epoch, HashMap<AttestationData, Vec<Aggregate<P>>>>,
}

struct Aggregate<P: Preset> {
    aggregation_bits: BitList<P::MaxValidatorsPerCommittee>,
    signature: AggregateSignatureBytes,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum AddOutcome {
    /// Merged into an existing aggregate over disjoint bits.
    Aggregated,
    /// Started a new aggregate.
    New,
    /// Every set bit was already covered.
    Duplicate,
}

impl<P: Preset> AttestationAggPool<P> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an attestation, merging it with a disjoint aggregate when
    /// possible. Adding the same attestation twice has no further effect.
    pub fn add_attestation(&mut self, attestation: Attestation<P>) -> AddOutcome {
        let Attestation {
            aggregation_bits,
            data,
            signature,
        } = attestation;

        let aggregates = self
            .aggregates
            .entry(data.target.epoch)
            .or_default()
            .entry(data)
            .or_default();

        let already_covered = aggregates.iter().any(|aggregate| {
            aggregation_bits
                .difference(&aggregate.aggregation_bits)
                .is_zero()
        });

        if already_covered {
            return AddOutcome::Duplicate;
        }

        let disjoint_position = aggregates.iter().position(|aggregate| {
            aggregate
                .aggregation_bits
                .intersection(&aggregation_bits)
                .is_zero()
        });

        if let Some(position) = disjoint_position {
            let aggregate = &mut aggregates[position];

            let combined_signature = combine_signatures(aggregate.signature, signature);

            let Some(combined_signature) = combined_signature else {
                return AddOutcome::Duplicate;
            };

            aggregate.aggregation_bits = aggregate.aggregation_bits.union(&aggregation_bits);
            aggregate.signature = combined_signature;

            return AddOutcome::Aggregated;
        }

        aggregates.push(Aggregate {
            aggregation_bits,
            signature,
        });

        AddOutcome::New
    }

    /// The best-coverage aggregates eligible for inclusion in a block at
    /// `slot`, limited to the protocol maximum.
    ///
    /// Eligible attestation slots are `[slot - 32, slot - 1]`. Overlapping
    /// aggregates for the same data are represented by the one with the
    /// larger coverage.
    #[must_use]
    pub fn best_aggregates_for_block(&self, slot: Slot) -> Vec<Attestation<P>> {
        let window =
            slot.saturating_sub(ATTESTATION_PROPAGATION_SLOT_RANGE)..=slot.saturating_sub(1);

        self.aggregates
            .values()
            .flatten()
            .filter(|(data, _)| window.contains(&data.slot))
            .filter_map(|(data, aggregates)| {
                aggregates
                    .iter()
                    .max_by_key(|aggregate| aggregate.aggregation_bits.num_set_bits())
                    .map(|aggregate| Attestation {
                        aggregation_bits: aggregate.aggregation_bits.clone(),
                        data: *data,
                        signature: aggregate.signature,
                    })
            })
            .sorted_by_key(|attestation| {
                core::cmp::Reverse(attestation.aggregation_bits.num_set_bits())
            })
            .take(P::MaxAttestations::to_usize())
            .collect()
    }

    /// Singular aggregates for gossip publication by an aggregator.
    #[must_use]
    pub fn aggregate_for(&self, data: AttestationData) -> Option<Attestation<P>> {
        self.aggregates
            .get(&data.target.epoch)?
            .get(&data)?
            .iter()
            .max_by_key(|aggregate| aggregate.aggregation_bits.num_set_bits())
            .map(|aggregate| Attestation {
                aggregation_bits: aggregate.aggregation_bits.clone(),
                data,
                signature: aggregate.signature,
            })
    }

    /// Drops buckets older than the previous epoch.
    pub fn on_epoch_boundary(&mut self, current_epoch: Epoch) {
        let cutoff = current_epoch.saturating_sub(1);
        self.aggregates = self.aggregates.split_off(&cutoff);
    }

    #[must_use]
    pub fn bucket_count(&self) -> usize {
        self.aggregates.values().map(HashMap::len).sum()
    }
}

fn combine_signatures(
    first: AggregateSignatureBytes,
    second: AggregateSignatureBytes,
) -> Option<AggregateSignatureBytes> {
    let mut first = AggregateSignature::try_from(first).ok()?;
    let second = AggregateSignature::try_from(second).ok()?;

    first.aggregate_in_place(second);

    Some(first.to_bytes())
}

#[cfg(test)]
mod tests {
    use bls::SecretKey;
    use types::{
        phase0::{containers::Checkpoint, primitives::H256},
        preset::Mainnet,
    };

    use super::*;

    fn attestation_data(slot: Slot) -> AttestationData {
        AttestationData {
            slot,
            index: 0,
            beacon_block_root: H256::repeat_byte(1),
            source: Checkpoint::default(),
            target: Checkpoint {
                epoch: slot / Mainnet::SLOTS_PER_EPOCH.get(),
                root: H256::repeat_byte(2),
            },
        }
    }

    fn attestation_over_bits(
        data: AttestationData,
        committee_size: usize,
        bits: impl IntoIterator<Item = usize>,
        seed: u8,
    ) -> Attestation<Mainnet> {
        let mut aggregation_bits = BitList::with_capacity(committee_size)
            .expect("the committee size is below the maximum");

        for bit in bits {
            aggregation_bits
                .set(bit, true)
                .expect("the bit index is below the committee size");
        }

        let secret_key =
            SecretKey::derive(&[seed; 32]).expect("the key material is acceptable");

        Attestation {
            aggregation_bits,
            data,
            signature: secret_key.sign(b"attestation").to_bytes(),
        }
    }

    #[test]
    fn disjoint_attestations_aggregate_into_full_coverage() {
        let mut pool = AttestationAggPool::<Mainnet>::new();
        let data = attestation_data(10);

        for (range, seed) in [(0..42, 1), (42..84, 2), (84..128, 3)] {
            let outcome =
                pool.add_attestation(attestation_over_bits(data, 128, range, seed));
            assert_ne!(outcome, AddOutcome::Duplicate);
        }

        let aggregates = pool.best_aggregates_for_block(11);

        assert_eq!(aggregates.len(), 1);
        assert_eq!(aggregates[0].aggregation_bits.num_set_bits(), 128);
    }

    #[test]
    fn duplicate_attestations_are_idempotent() {
        let mut pool = AttestationAggPool::<Mainnet>::new();
        let data = attestation_data(10);
        let attestation = attestation_over_bits(data, 128, 0..42, 1);

        assert_eq!(pool.add_attestation(attestation.clone()), AddOutcome::New);
        assert_eq!(pool.add_attestation(attestation), AddOutcome::Duplicate);

        let aggregates = pool.best_aggregates_for_block(11);
        assert_eq!(aggregates.len(), 1);
        assert_eq!(aggregates[0].aggregation_bits.num_set_bits(), 42);
    }

    #[test]
    fn overlapping_attestations_keep_the_larger_coverage() {
        let mut pool = AttestationAggPool::<Mainnet>::new();
        let data = attestation_data(10);

        pool.add_attestation(attestation_over_bits(data, 128, 0..100, 1));
        pool.add_attestation(attestation_over_bits(data, 128, 50..128, 2));

        let aggregates = pool.best_aggregates_for_block(11);

        assert_eq!(aggregates.len(), 1);
        assert_eq!(aggregates[0].aggregation_bits.num_set_bits(), 100);
    }

    #[test]
    fn attestations_outside_the_inclusion_window_are_not_proposed() {
        let mut pool = AttestationAggPool::<Mainnet>::new();

        pool.add_attestation(attestation_over_bits(attestation_data(10), 128, 0..4, 1));

        assert!(pool.best_aggregates_for_block(10).is_empty());
        assert_eq!(pool.best_aggregates_for_block(11).len(), 1);
        assert_eq!(pool.best_aggregates_for_block(42).len(), 1);
        assert!(pool.best_aggregates_for_block(43).is_empty());
    }

    #[test]
    fn epoch_boundaries_prune_old_buckets() {
        let mut pool = AttestationAggPool::<Mainnet>::new();

        pool.add_attestation(attestation_over_bits(attestation_data(0), 128, 0..4, 1));
        pool.add_attestation(attestation_over_bits(attestation_data(320), 128, 0..4, 2));

        assert_eq!(pool.bucket_count(), 2);

        pool.on_epoch_boundary(11);

        assert_eq!(pool.bucket_count(), 1);
    }
}
