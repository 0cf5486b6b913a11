use itertools::Itertools as _;
use types::{
    config::Config,
    phase0::{
        consts::DOMAIN_BEACON_ATTESTER,
        containers::{AttestationData, IndexedAttestation, Validator},
        primitives::Epoch,
    },
    preset::Preset,
    traits::BeaconState,
};

use crate::{accessors, error::Error, signing};

#[must_use]
pub const fn is_active_validator(validator: &Validator, epoch: Epoch) -> bool {
    validator.activation_epoch <= epoch && epoch < validator.exit_epoch
}

#[must_use]
pub const fn is_eligible_for_activation_queue<P: Preset>(validator: &Validator) -> bool {
    validator.activation_eligibility_epoch == types::phase0::consts::FAR_FUTURE_EPOCH
        && validator.effective_balance == P::MAX_EFFECTIVE_BALANCE
}

#[must_use]
pub const fn is_slashable_validator(validator: &Validator, epoch: Epoch) -> bool {
    !validator.slashed
        && validator.activation_epoch <= epoch
        && epoch < validator.withdrawable_epoch
}

/// Double votes and surround votes are slashable.
#[must_use]
pub fn is_slashable_attestation_data(first: AttestationData, second: AttestationData) -> bool {
    let double_vote = first != second && first.target.epoch == second.target.epoch;

    let surround_vote = first.source.epoch < second.source.epoch
        && second.target.epoch < first.target.epoch;

    double_vote || surround_vote
}

/// Verifies a Merkle proof of inclusion.
#[must_use]
pub fn is_valid_merkle_branch(
    leaf: types::phase0::primitives::H256,
    branch: impl IntoIterator<Item = types::phase0::primitives::H256>,
    generalized_index: u64,
    root: types::phase0::primitives::H256,
) -> bool {
    let mut node = leaf;

    for (height, sibling) in branch.into_iter().enumerate() {
        if generalized_index >> height & 1 == 1 {
            node = crate::misc::hash_concatenation(sibling, node);
        } else {
            node = crate::misc::hash_concatenation(node, sibling);
        }
    }

    node == root
}

/// Checks ordering and the aggregate signature of an indexed attestation.
pub fn validate_indexed_attestation<P: Preset>(
    config: &Config,
    state: &impl BeaconState<P>,
    indexed_attestation: &IndexedAttestation<P>,
    verify_signature: bool,
) -> Result<(), Error> {
    let indices = &indexed_attestation.attesting_indices;

    if indices.is_empty() {
        return Err(Error::AttestingIndicesEmpty);
    }

    let sorted_and_unique = indices
        .iter()
        .tuple_windows()
        .all(|(first, second)| first < second);

    if !sorted_and_unique {
        return Err(Error::AttestingIndicesNotSortedAndUnique);
    }

    if !verify_signature {
        return Ok(());
    }

    let public_keys = indices
        .iter()
        .map(|validator_index| {
            state
                .validators()
                .get(*validator_index as usize)
                .map(|validator| validator.pubkey)
                .ok_or(Error::ValidatorIndexOutOfBounds {
                    validator_index: *validator_index,
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let domain = accessors::get_domain(
        config,
        state,
        DOMAIN_BEACON_ATTESTER,
        Some(indexed_attestation.data.target.epoch),
    );

    signing::verify_aggregate(
        indexed_attestation.data,
        domain,
        &public_keys,
        indexed_attestation.signature,
    )
}

#[cfg(test)]
mod tests {
    use types::phase0::{containers::Checkpoint, primitives::H256};

    use super::*;

    fn attestation_data(source_epoch: Epoch, target_epoch: Epoch) -> AttestationData {
        AttestationData {
            slot: 0,
            index: 0,
            beacon_block_root: H256::zero(),
            source: Checkpoint {
                epoch: source_epoch,
                root: H256::zero(),
            },
            target: Checkpoint {
                epoch: target_epoch,
                root: H256::zero(),
            },
        }
    }

    #[test]
    fn surround_votes_are_slashable() {
        let surrounding = attestation_data(3, 7);
        let surrounded = attestation_data(4, 6);

        assert!(is_slashable_attestation_data(surrounding, surrounded));
        assert!(!is_slashable_attestation_data(surrounded, surrounding));
    }

    #[test]
    fn double_votes_are_slashable() {
        let first = attestation_data(3, 7);

        let second = AttestationData {
            beacon_block_root: H256::repeat_byte(1),
            ..first
        };

        assert!(is_slashable_attestation_data(first, second));
    }

    #[test]
    fn equal_votes_are_not_slashable() {
        let data = attestation_data(3, 7);
        assert!(!is_slashable_attestation_data(data, data));
    }
}
