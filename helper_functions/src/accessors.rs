use itertools::Itertools as _;
use ssz_types::VariableList;
use types::{
    config::Config,
    phase0::{
        consts::{DOMAIN_BEACON_PROPOSER, GENESIS_EPOCH},
        containers::{Attestation, AttestationData, IndexedAttestation},
        primitives::{CommitteeIndex, DomainType, Epoch, Gwei, Slot, ValidatorIndex, H256},
    },
    preset::Preset,
    traits::BeaconState,
};

use crate::{error::Error, misc, predicates};

#[must_use]
pub fn get_current_epoch<P: Preset>(state: &(impl BeaconState<P> + ?Sized)) -> Epoch {
    misc::compute_epoch_at_slot::<P>(state.slot())
}

#[must_use]
pub fn get_previous_epoch<P: Preset>(state: &(impl BeaconState<P> + ?Sized)) -> Epoch {
    let current_epoch = get_current_epoch(state);

    if current_epoch == GENESIS_EPOCH {
        GENESIS_EPOCH
    } else {
        current_epoch - 1
    }
}

#[must_use]
pub fn get_active_validator_indices<P: Preset>(
    state: &(impl BeaconState<P> + ?Sized),
    epoch: Epoch,
) -> Vec<ValidatorIndex> {
    state
        .validators()
        .iter()
        .enumerate()
        .filter(|(_, validator)| predicates::is_active_validator(validator, epoch))
        .map(|(index, _)| index as ValidatorIndex)
        .collect()
}

/// Total effective balance of all active validators, never less than one
/// increment to avoid division by zero.
#[must_use]
pub fn get_total_active_balance<P: Preset>(state: &(impl BeaconState<P> + ?Sized)) -> Gwei {
    let current_epoch = get_current_epoch(state);

    let total = state
        .validators()
        .iter()
        .filter(|validator| predicates::is_active_validator(validator, current_epoch))
        .map(|validator| validator.effective_balance)
        .sum();

    P::EFFECTIVE_BALANCE_INCREMENT.get().max(total)
}

#[must_use]
pub fn total_balance<P: Preset>(
    state: &(impl BeaconState<P> + ?Sized),
    indices: impl IntoIterator<Item = ValidatorIndex>,
) -> Gwei {
    let total = indices
        .into_iter()
        .filter_map(|index| state.validators().get(index as usize))
        .map(|validator| validator.effective_balance)
        .sum();

    P::EFFECTIVE_BALANCE_INCREMENT.get().max(total)
}

#[must_use]
pub fn get_randao_mix<P: Preset>(state: &(impl BeaconState<P> + ?Sized), epoch: Epoch) -> H256 {
    let position = epoch % P::epochs_per_historical_vector();
    state.randao_mixes()[usize::try_from(position)
        .expect("the remainder is less than the vector length")]
}

#[must_use]
pub fn get_seed<P: Preset>(
    state: &(impl BeaconState<P> + ?Sized),
    epoch: Epoch,
    domain_type: DomainType,
) -> H256 {
    let lookahead_mix = get_randao_mix(
        state,
        epoch + P::epochs_per_historical_vector() - P::MIN_SEED_LOOKAHEAD - 1,
    );

    let mut input = [0; 44];
    input[..4].copy_from_slice(domain_type.as_bytes());
    input[4..12].copy_from_slice(&epoch.to_le_bytes());
    input[12..].copy_from_slice(lookahead_mix.as_bytes());
    hashing::hash_256(input)
}

pub fn get_block_root<P: Preset>(
    state: &(impl BeaconState<P> + ?Sized),
    epoch: Epoch,
) -> Result<H256, Error> {
    get_block_root_at_slot(state, misc::compute_start_slot_at_epoch::<P>(epoch))
}

pub fn get_block_root_at_slot<P: Preset>(
    state: &(impl BeaconState<P> + ?Sized),
    slot: Slot,
) -> Result<H256, Error> {
    if !(slot < state.slot() && state.slot() <= slot + P::slots_per_historical_root()) {
        return Err(Error::SlotOutOfRange { slot });
    }

    let position = slot % P::slots_per_historical_root();
    Ok(state.block_roots()[usize::try_from(position)
        .expect("the remainder is less than the vector length")])
}

pub fn get_committee_count_per_slot<P: Preset>(
    state: &(impl BeaconState<P> + ?Sized),
    epoch: Epoch,
) -> u64 {
    misc::committees_per_slot::<P>(get_active_validator_indices(state, epoch).len() as u64)
}

pub fn beacon_committee<P: Preset>(
    state: &(impl BeaconState<P> + ?Sized),
    slot: Slot,
    committee_index: CommitteeIndex,
) -> Result<Vec<ValidatorIndex>, Error> {
    let epoch = misc::compute_epoch_at_slot::<P>(slot);
    let indices = get_active_validator_indices(state, epoch);
    let committees_per_slot = misc::committees_per_slot::<P>(indices.len() as u64);

    if committee_index >= committees_per_slot {
        return Err(Error::CommitteeIndexOutOfBounds {
            slot,
            index: committee_index,
        });
    }

    let seed = get_seed(state, epoch, types::phase0::consts::DOMAIN_BEACON_ATTESTER);
    let committees_per_epoch = committees_per_slot * P::SLOTS_PER_EPOCH.get();
    let committee_offset =
        slot % P::SLOTS_PER_EPOCH.get() * committees_per_slot + committee_index;

    Ok(misc::compute_committee::<P>(
        &indices,
        seed,
        committee_offset,
        committees_per_epoch,
    ))
}

pub fn get_beacon_proposer_index<P: Preset>(
    state: &(impl BeaconState<P> + ?Sized),
) -> Result<ValidatorIndex, Error> {
    let epoch = get_current_epoch(state);
    let indices = get_active_validator_indices(state, epoch);

    let seed = misc::hash_concatenation(
        get_seed(state, epoch, DOMAIN_BEACON_PROPOSER),
        H256::from_low_u64_le(state.slot()),
    );

    misc::compute_proposer_index::<P>(
        |validator_index| {
            state
                .validators()
                .get(validator_index as usize)
                .map(|validator| validator.effective_balance)
        },
        &indices,
        seed,
    )
}

/// Selects the fork version for signing domains from the state's fork,
/// honoring the fork boundary for objects signed in earlier epochs.
#[must_use]
pub fn get_domain<P: Preset>(
    config: &Config,
    state: &(impl BeaconState<P> + ?Sized),
    domain_type: DomainType,
    epoch: Option<Epoch>,
) -> H256 {
    let epoch = epoch.unwrap_or_else(|| get_current_epoch(state));
    let fork = state.fork();

    let fork_version = if epoch < fork.epoch {
        fork.previous_version
    } else {
        fork.current_version
    };

    misc::compute_domain(
        config,
        domain_type,
        Some(fork_version),
        Some(state.genesis_validators_root()),
    )
}

pub fn get_attesting_indices<P: Preset>(
    state: &(impl BeaconState<P> + ?Sized),
    data: AttestationData,
    aggregation_bits: &ssz_types::BitList<P::MaxValidatorsPerCommittee>,
) -> Result<Vec<ValidatorIndex>, Error> {
    let committee = beacon_committee(state, data.slot, data.index)?;

    if aggregation_bits.len() != committee.len() {
        return Err(Error::BitfieldLengthMismatch);
    }

    Ok(committee
        .into_iter()
        .enumerate()
        .filter(|(position, _)| {
            aggregation_bits
                .get(*position)
                .expect("the lengths were checked to match")
        })
        .map(|(_, validator_index)| validator_index)
        .collect())
}

pub fn get_indexed_attestation<P: Preset>(
    state: &(impl BeaconState<P> + ?Sized),
    attestation: &Attestation<P>,
) -> Result<IndexedAttestation<P>, Error> {
    let attesting_indices =
        get_attesting_indices(state, attestation.data, &attestation.aggregation_bits)?
            .into_iter()
            .sorted()
            .collect::<Vec<_>>();

    Ok(IndexedAttestation {
        attesting_indices: VariableList::new(attesting_indices)
            .expect("attesting indices are bounded by the committee size"),
        data: attestation.data,
        signature: attestation.signature,
    })
}
