use std::collections::BTreeSet;

use helper_functions::{accessors, misc, mutators, predicates};
use ssz_types::typenum::Unsigned as _;
use tree_hash::TreeHash as _;
use types::{
    config::Config,
    phase0::{
        beacon_state::BeaconState,
        consts::BASE_REWARDS_PER_EPOCH,
        containers::{Attestation, BeaconBlock, PendingAttestation},
        primitives::{Epoch, Gwei, ValidatorIndex},
    },
    preset::Preset,
    traits::BeaconState as _,
};

use crate::{error::Error, unphased};

pub fn process_slots<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
    target_slot: types::phase0::primitives::Slot,
) -> Result<(), Error> {
    unphased::process_slots_with(state, target_slot, |state| process_epoch(config, state))
}

pub fn process_epoch<P: Preset>(config: &Config, state: &mut BeaconState<P>) -> Result<(), Error> {
    process_justification_and_finalization(state)?;
    process_rewards_and_penalties(state)?;
    unphased::process_registry_updates(config, state)?;
    unphased::process_slashings_sweep(state, P::PROPORTIONAL_SLASHING_MULTIPLIER)?;
    unphased::process_eth1_data_votes_reset(state);
    unphased::process_effective_balance_updates(state);
    unphased::process_slashings_reset(state);
    unphased::process_randao_mixes_reset(state);
    unphased::process_historical_roots_update(state)?;
    process_participation_record_updates(state);

    Ok(())
}

pub fn process_block<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
    block: &BeaconBlock<P>,
    verify_signatures: bool,
) -> Result<(), Error> {
    unphased::validate_block_header(
        state,
        block.slot,
        block.proposer_index,
        block.parent_root,
        block.body.tree_hash_root(),
    )?;

    unphased::process_randao(config, state, block.body.randao_reveal, verify_signatures)?;
    unphased::process_eth1_data(state, block.body.eth1_data);

    for proposer_slashing in block.body.proposer_slashings.iter().copied() {
        unphased::process_proposer_slashing(
            config,
            state,
            proposer_slashing,
            P::MIN_SLASHING_PENALTY_QUOTIENT.get(),
        )?;
    }

    for attester_slashing in &block.body.attester_slashings {
        unphased::process_attester_slashing(
            config,
            state,
            attester_slashing,
            verify_signatures,
            P::MIN_SLASHING_PENALTY_QUOTIENT.get(),
        )?;
    }

    for attestation in &block.body.attestations {
        process_attestation(config, state, attestation, verify_signatures)?;
    }

    let expected_deposits = (state.eth1_data().deposit_count - state.eth1_deposit_index())
        .min(P::MaxDeposits::to_u64());

    if block.body.deposits.len() as u64 != expected_deposits {
        return Err(Error::DepositCountMismatch);
    }

    for deposit in &block.body.deposits {
        unphased::process_deposit(config, state, deposit)?;
    }

    for signed_exit in block.body.voluntary_exits.iter().copied() {
        unphased::process_voluntary_exit(config, state, signed_exit, verify_signatures)?;
    }

    Ok(())
}

fn process_attestation<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
    attestation: &Attestation<P>,
    verify_signature: bool,
) -> Result<(), Error> {
    let data = attestation.data;
    let current_epoch = accessors::get_current_epoch(state);
    let previous_epoch = accessors::get_previous_epoch(state);

    if data.target.epoch != previous_epoch && data.target.epoch != current_epoch {
        return Err(Error::AttestationOutsideInclusionEpochs {
            target_epoch: data.target.epoch,
        });
    }

    if data.target.epoch != misc::compute_epoch_at_slot::<P>(data.slot) {
        return Err(Error::AttestationOutsideInclusionEpochs {
            target_epoch: data.target.epoch,
        });
    }

    let lower_bound = data.slot + P::MIN_ATTESTATION_INCLUSION_DELAY.get();
    let upper_bound = data.slot + P::SLOTS_PER_EPOCH.get();

    if !(lower_bound..=upper_bound).contains(&state.slot()) {
        return Err(Error::AttestationOutsideInclusionWindow {
            attestation_slot: data.slot,
            state_slot: state.slot(),
        });
    }

    let expected_source = if data.target.epoch == current_epoch {
        state.current_justified_checkpoint()
    } else {
        state.previous_justified_checkpoint()
    };

    if data.source != expected_source {
        return Err(Error::AttestationSourceMismatch);
    }

    let indexed = accessors::get_indexed_attestation(state, attestation)?;
    predicates::validate_indexed_attestation(config, state, &indexed, verify_signature)?;

    let pending = PendingAttestation {
        aggregation_bits: attestation.aggregation_bits.clone(),
        data,
        inclusion_delay: state.slot() - data.slot,
        proposer_index: accessors::get_beacon_proposer_index(state)?,
    };

    let list = if data.target.epoch == current_epoch {
        &mut state.current_epoch_attestations
    } else {
        &mut state.previous_epoch_attestations
    };

    list.push(pending)
        .map_err(|_| Error::ValidatorOutOfBounds)?;

    Ok(())
}

fn process_justification_and_finalization<P: Preset>(
    state: &mut BeaconState<P>,
) -> Result<(), Error> {
    if accessors::get_current_epoch(state) <= 1 {
        return Ok(());
    }

    let total_active_balance = accessors::get_total_active_balance(state);

    let previous_target_indices =
        matching_target_indices(state, accessors::get_previous_epoch(state))?;
    let current_target_indices =
        matching_target_indices(state, accessors::get_current_epoch(state))?;

    let previous_target_balance =
        accessors::total_balance(state, previous_target_indices.iter().copied());
    let current_target_balance =
        accessors::total_balance(state, current_target_indices.iter().copied());

    unphased::weigh_justification_and_finalization(
        state,
        total_active_balance,
        previous_target_balance,
        current_target_balance,
    )
}

fn matching_source_attestations<P: Preset>(
    state: &BeaconState<P>,
    epoch: Epoch,
) -> &[PendingAttestation<P>] {
    if epoch == accessors::get_current_epoch(state) {
        &state.current_epoch_attestations
    } else {
        &state.previous_epoch_attestations
    }
}

fn matching_target_indices<P: Preset>(
    state: &BeaconState<P>,
    epoch: Epoch,
) -> Result<BTreeSet<ValidatorIndex>, Error> {
    let target_root = accessors::get_block_root(state, epoch)?;

    unslashed_attesting_indices(
        state,
        matching_source_attestations(state, epoch)
            .iter()
            .filter(|attestation| attestation.data.target.root == target_root),
    )
}

fn unslashed_attesting_indices<'list, P: Preset>(
    state: &BeaconState<P>,
    attestations: impl IntoIterator<Item = &'list PendingAttestation<P>>,
) -> Result<BTreeSet<ValidatorIndex>, Error> {
    let mut indices = BTreeSet::new();

    for attestation in attestations {
        for validator_index in accessors::get_attesting_indices(
            state,
            attestation.data,
            &attestation.aggregation_bits,
        )? {
            let slashed = state
                .validators
                .get(validator_index as usize)
                .is_some_and(|validator| validator.slashed);

            if !slashed {
                indices.insert(validator_index);
            }
        }
    }

    Ok(indices)
}

fn base_reward<P: Preset>(state: &BeaconState<P>, validator_index: ValidatorIndex) -> Gwei {
    let total_balance = accessors::get_total_active_balance(state);
    let effective_balance = state
        .validators
        .get(validator_index as usize)
        .map(|validator| validator.effective_balance)
        .unwrap_or_default();

    effective_balance * P::BASE_REWARD_FACTOR.get()
        / misc::integer_squareroot(total_balance)
        / BASE_REWARDS_PER_EPOCH.get()
}

#[expect(clippy::too_many_lines)]
fn process_rewards_and_penalties<P: Preset>(state: &mut BeaconState<P>) -> Result<(), Error> {
    let current_epoch = accessors::get_current_epoch(state);

    if current_epoch <= 1 {
        return Ok(());
    }

    let previous_epoch = accessors::get_previous_epoch(state);
    let total_balance = accessors::get_total_active_balance(state);
    let finality_delay = previous_epoch - state.finalized_checkpoint.epoch;

    let source_indices = unslashed_attesting_indices(
        state,
        matching_source_attestations(state, previous_epoch),
    )?;
    let target_indices = matching_target_indices(state, previous_epoch)?;

    let head_indices = {
        let mut indices = BTreeSet::new();

        for attestation in matching_source_attestations(state, previous_epoch) {
            let head_root = accessors::get_block_root_at_slot(state, attestation.data.slot)?;

            if attestation.data.beacon_block_root != head_root {
                continue;
            }

            for validator_index in accessors::get_attesting_indices(
                state,
                attestation.data,
                &attestation.aggregation_bits,
            )? {
                let slashed = state
                    .validators
                    .get(validator_index as usize)
                    .is_some_and(|validator| validator.slashed);

                if !slashed {
                    indices.insert(validator_index);
                }
            }
        }

        indices
    };

    let eligible = state
        .validators
        .iter()
        .enumerate()
        .filter(|(_, validator)| {
            predicates::is_active_validator(validator, previous_epoch)
                || (validator.slashed && previous_epoch + 1 < validator.withdrawable_epoch)
        })
        .map(|(validator_index, _)| validator_index as ValidatorIndex)
        .collect::<Vec<_>>();

    let mut rewards = vec![0_u64; state.validators.len()];
    let mut penalties = vec![0_u64; state.validators.len()];

    for validator_index in eligible.iter().copied() {
        let base = base_reward(state, validator_index);
        let position = validator_index as usize;

        for indices in [&source_indices, &target_indices, &head_indices] {
            if indices.contains(&validator_index) {
                let attesting_balance = accessors::total_balance(state, indices.iter().copied());
                let increment = P::EFFECTIVE_BALANCE_INCREMENT.get();

                if finality_delay > P::MIN_EPOCHS_TO_INACTIVITY_PENALTY {
                    rewards[position] += base;
                } else {
                    rewards[position] +=
                        base * (attesting_balance / increment) / (total_balance / increment);
                }
            } else {
                penalties[position] += base;
            }
        }

        if finality_delay > P::MIN_EPOCHS_TO_INACTIVITY_PENALTY {
            penalties[position] += BASE_REWARDS_PER_EPOCH.get() * base;

            if !target_indices.contains(&validator_index) {
                let effective_balance = state
                    .validators
                    .get(position)
                    .map(|validator| validator.effective_balance)
                    .unwrap_or_default();

                penalties[position] +=
                    effective_balance * finality_delay / P::INACTIVITY_PENALTY_QUOTIENT.get();
            }
        }
    }

    // Inclusion delay rewards go to the earliest inclusion of each source
    // attester, split between the attester and the proposer who included it.
    for validator_index in source_indices.iter().copied() {
        let earliest = matching_source_attestations(state, previous_epoch)
            .iter()
            .filter(|attestation| {
                accessors::get_attesting_indices(
                    state,
                    attestation.data,
                    &attestation.aggregation_bits,
                )
                .is_ok_and(|indices| indices.contains(&validator_index))
            })
            .min_by_key(|attestation| attestation.inclusion_delay);

        if let Some(attestation) = earliest {
            let base = base_reward(state, validator_index);
            let proposer_reward = base / P::PROPOSER_REWARD_QUOTIENT.get();
            let max_attester_reward = base - proposer_reward;

            rewards[attestation.proposer_index as usize] += proposer_reward;
            rewards[validator_index as usize] +=
                max_attester_reward / attestation.inclusion_delay.max(1);
        }
    }

    for (validator_index, reward) in rewards.into_iter().enumerate() {
        mutators::increase_balance(state, validator_index as ValidatorIndex, reward)?;
    }

    for (validator_index, penalty) in penalties.into_iter().enumerate() {
        mutators::decrease_balance(state, validator_index as ValidatorIndex, penalty)?;
    }

    Ok(())
}

fn process_participation_record_updates<P: Preset>(state: &mut BeaconState<P>) {
    state.previous_epoch_attestations =
        core::mem::take(&mut state.current_epoch_attestations);
}
