use std::collections::BTreeSet;

use helper_functions::{accessors, misc, mutators, predicates, signing};
use ssz_types::typenum::Unsigned as _;
use tree_hash::TreeHash;
use types::{
    altair::{
        beacon_state::BeaconState as AltairBeaconState,
        consts::{
            DOMAIN_SYNC_COMMITTEE, INACTIVITY_PENALTY_QUOTIENT_ALTAIR,
            MIN_SLASHING_PENALTY_QUOTIENT_ALTAIR, PARTICIPATION_FLAG_WEIGHTS,
            PROPORTIONAL_SLASHING_MULTIPLIER_ALTAIR, PROPOSER_WEIGHT, SYNC_REWARD_WEIGHT,
            TIMELY_HEAD_FLAG_INDEX, TIMELY_SOURCE_FLAG_INDEX, TIMELY_TARGET_FLAG_INDEX,
            WEIGHT_DENOMINATOR,
        },
        containers::{BeaconBlock, SyncAggregate, SyncCommittee},
    },
    config::Config,
    nonstandard::Phase,
    phase0::{
        beacon_state::BeaconState as Phase0BeaconState,
        consts::GENESIS_EPOCH,
        containers::{Attestation, Fork},
        primitives::{Epoch, Gwei, Slot, ValidatorIndex, H256},
    },
    preset::Preset,
    traits::{BeaconState as _, PostAltairBeaconState},
};

use crate::{error::Error, unphased};

pub fn process_slots<P: Preset>(
    config: &Config,
    state: &mut AltairBeaconState<P>,
    target_slot: Slot,
) -> Result<(), Error> {
    unphased::process_slots_with(state, target_slot, |state| {
        process_epoch(
            config,
            state,
            PROPORTIONAL_SLASHING_MULTIPLIER_ALTAIR,
            INACTIVITY_PENALTY_QUOTIENT_ALTAIR,
        )
    })
}

/// Epoch processing shared by altair and later forks.
///
/// The slashing multiplier and inactivity quotient are the only values that
/// change between them.
pub fn process_epoch<P, S>(
    config: &Config,
    state: &mut S,
    proportional_slashing_multiplier: u64,
    inactivity_penalty_quotient: u64,
) -> Result<(), Error>
where
    P: Preset,
    S: PostAltairBeaconState<P> + TreeHash,
{
    process_justification_and_finalization(state)?;
    process_inactivity_updates(config, state)?;
    process_rewards_and_penalties(config, state, inactivity_penalty_quotient)?;
    unphased::process_registry_updates(config, state)?;
    unphased::process_slashings_sweep(state, proportional_slashing_multiplier)?;
    unphased::process_eth1_data_votes_reset(state);
    unphased::process_effective_balance_updates(state);
    unphased::process_slashings_reset(state);
    unphased::process_randao_mixes_reset(state);
    unphased::process_historical_roots_update(state)?;
    process_participation_flag_updates(state);
    process_sync_committee_updates(state)?;

    Ok(())
}

pub fn process_block<P: Preset>(
    config: &Config,
    state: &mut AltairBeaconState<P>,
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
            MIN_SLASHING_PENALTY_QUOTIENT_ALTAIR,
        )?;
    }

    for attester_slashing in &block.body.attester_slashings {
        unphased::process_attester_slashing(
            config,
            state,
            attester_slashing,
            verify_signatures,
            MIN_SLASHING_PENALTY_QUOTIENT_ALTAIR,
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
        process_deposit(config, state, deposit)?;
    }

    for signed_exit in block.body.voluntary_exits.iter().copied() {
        unphased::process_voluntary_exit(config, state, signed_exit, verify_signatures)?;
    }

    process_sync_aggregate(config, state, &block.body.sync_aggregate, verify_signatures)?;

    Ok(())
}

/// Applies a deposit, extending the participation and inactivity lists for
/// new validators.
pub fn process_deposit<P, S>(
    config: &Config,
    state: &mut S,
    deposit: &types::phase0::containers::Deposit,
) -> Result<(), Error>
where
    P: Preset,
    S: PostAltairBeaconState<P>,
{
    if let Some(_new_validator_index) = unphased::process_deposit(config, state, deposit)? {
        state
            .previous_epoch_participation_mut()
            .push(0)
            .map_err(|_| Error::ValidatorOutOfBounds)?;
        state
            .current_epoch_participation_mut()
            .push(0)
            .map_err(|_| Error::ValidatorOutOfBounds)?;
        state
            .inactivity_scores_mut()
            .push(0)
            .map_err(|_| Error::ValidatorOutOfBounds)?;
    }

    Ok(())
}

pub fn process_attestation<P, S>(
    config: &Config,
    state: &mut S,
    attestation: &Attestation<P>,
    verify_signature: bool,
) -> Result<(), Error>
where
    P: Preset,
    S: PostAltairBeaconState<P>,
{
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

    let inclusion_delay = state.slot() - data.slot;
    let flag_indices = participation_flag_indices(state, data, inclusion_delay)?;

    let total_active_balance = accessors::get_total_active_balance(state);
    let mut proposer_reward_numerator = 0;

    for validator_index in indexed.attesting_indices.iter().copied() {
        let base = base_reward(state, validator_index, total_active_balance);
        let position = validator_index as usize;

        let participation = if data.target.epoch == current_epoch {
            state.current_epoch_participation_mut()
        } else {
            state.previous_epoch_participation_mut()
        };

        let flags = participation
            .get_mut(position)
            .ok_or(Error::ValidatorOutOfBounds)?;

        for (flag_index, weight) in PARTICIPATION_FLAG_WEIGHTS {
            if flag_indices.contains(&flag_index) && *flags >> flag_index & 1 == 0 {
                *flags |= 1 << flag_index;
                proposer_reward_numerator += base * weight;
            }
        }
    }

    let proposer_reward_denominator =
        (WEIGHT_DENOMINATOR - PROPOSER_WEIGHT) * WEIGHT_DENOMINATOR / PROPOSER_WEIGHT;
    let proposer_reward = proposer_reward_numerator / proposer_reward_denominator;

    let proposer_index = accessors::get_beacon_proposer_index(state)?;
    mutators::increase_balance(state, proposer_index, proposer_reward)?;

    Ok(())
}

fn participation_flag_indices<P, S>(
    state: &S,
    data: types::phase0::containers::AttestationData,
    inclusion_delay: u64,
) -> Result<Vec<usize>, Error>
where
    P: Preset,
    S: PostAltairBeaconState<P>,
{
    let justified_checkpoint = if data.target.epoch == accessors::get_current_epoch(state) {
        state.current_justified_checkpoint()
    } else {
        state.previous_justified_checkpoint()
    };

    let matching_source = data.source == justified_checkpoint;
    let matching_target = matching_source
        && data.target.root == accessors::get_block_root(state, data.target.epoch)?;
    let matching_head = matching_target
        && data.beacon_block_root == accessors::get_block_root_at_slot(state, data.slot)?;

    let mut flag_indices = vec![];

    if matching_source
        && inclusion_delay <= misc::integer_squareroot(P::SLOTS_PER_EPOCH.get())
    {
        flag_indices.push(TIMELY_SOURCE_FLAG_INDEX);
    }

    if matching_target && inclusion_delay <= P::SLOTS_PER_EPOCH.get() {
        flag_indices.push(TIMELY_TARGET_FLAG_INDEX);
    }

    if matching_head && inclusion_delay == P::MIN_ATTESTATION_INCLUSION_DELAY.get() {
        flag_indices.push(TIMELY_HEAD_FLAG_INDEX);
    }

    Ok(flag_indices)
}

pub fn process_sync_aggregate<P, S>(
    config: &Config,
    state: &mut S,
    sync_aggregate: &SyncAggregate<P>,
    verify_signature: bool,
) -> Result<(), Error>
where
    P: Preset,
    S: PostAltairBeaconState<P>,
{
    if verify_signature {
        let previous_slot = state.slot().saturating_sub(1);
        let block_root = accessors::get_block_root_at_slot(state, previous_slot)
            .unwrap_or_else(|_| H256::zero());

        let participant_pubkeys = state
            .current_sync_committee()
            .pubkeys
            .iter()
            .zip(sync_aggregate.sync_committee_bits.iter())
            .filter(|(_, bit)| *bit)
            .map(|(pubkey, _)| *pubkey)
            .collect::<Vec<_>>();

        let domain = accessors::get_domain(
            config,
            state,
            DOMAIN_SYNC_COMMITTEE,
            Some(accessors::get_previous_epoch(state)),
        );

        signing::verify_aggregate(
            block_root,
            domain,
            &participant_pubkeys,
            sync_aggregate.sync_committee_signature,
        )
        .map_err(|_| Error::InvalidSyncAggregate)?;
    }

    let total_active_balance = accessors::get_total_active_balance(state);
    let total_active_increments =
        total_active_balance / P::EFFECTIVE_BALANCE_INCREMENT;
    let total_base_rewards = base_reward_per_increment::<P>(total_active_balance)
        * total_active_increments;
    let max_participant_rewards = total_base_rewards * SYNC_REWARD_WEIGHT
        / WEIGHT_DENOMINATOR
        / P::SLOTS_PER_EPOCH.get();
    let participant_reward = max_participant_rewards / P::sync_committee_size();
    let proposer_reward =
        participant_reward * PROPOSER_WEIGHT / (WEIGHT_DENOMINATOR - PROPOSER_WEIGHT);

    let proposer_index = accessors::get_beacon_proposer_index(state)?;

    let committee_pubkeys = state.current_sync_committee().pubkeys.clone();

    for (pubkey, participated) in committee_pubkeys
        .iter()
        .zip(sync_aggregate.sync_committee_bits.iter())
    {
        let validator_index = state
            .validators()
            .iter()
            .position(|validator| validator.pubkey == *pubkey)
            .map(|position| position as ValidatorIndex)
            .ok_or(Error::ValidatorOutOfBounds)?;

        if participated {
            mutators::increase_balance(state, validator_index, participant_reward)?;
            mutators::increase_balance(state, proposer_index, proposer_reward)?;
        } else {
            mutators::decrease_balance(state, validator_index, participant_reward)?;
        }
    }

    Ok(())
}

fn process_justification_and_finalization<P, S>(state: &mut S) -> Result<(), Error>
where
    P: Preset,
    S: PostAltairBeaconState<P>,
{
    if accessors::get_current_epoch(state) <= 1 {
        return Ok(());
    }

    let total_active_balance = accessors::get_total_active_balance(state);

    let previous_target_balance = unslashed_participating_balance(
        state,
        TIMELY_TARGET_FLAG_INDEX,
        accessors::get_previous_epoch(state),
    );
    let current_target_balance = unslashed_participating_balance(
        state,
        TIMELY_TARGET_FLAG_INDEX,
        accessors::get_current_epoch(state),
    );

    unphased::weigh_justification_and_finalization(
        state,
        total_active_balance,
        previous_target_balance,
        current_target_balance,
    )
}

fn unslashed_participating_indices<P, S>(
    state: &S,
    flag_index: usize,
    epoch: Epoch,
) -> BTreeSet<ValidatorIndex>
where
    P: Preset,
    S: PostAltairBeaconState<P>,
{
    let participation = if epoch == accessors::get_current_epoch(state) {
        state.current_epoch_participation()
    } else {
        state.previous_epoch_participation()
    };

    state
        .validators()
        .iter()
        .zip(participation.iter())
        .enumerate()
        .filter(|(_, (validator, flags))| {
            predicates::is_active_validator(validator, epoch)
                && !validator.slashed
                && **flags >> flag_index & 1 == 1
        })
        .map(|(validator_index, _)| validator_index as ValidatorIndex)
        .collect()
}

fn unslashed_participating_balance<P, S>(state: &S, flag_index: usize, epoch: Epoch) -> Gwei
where
    P: Preset,
    S: PostAltairBeaconState<P>,
{
    accessors::total_balance(
        state,
        unslashed_participating_indices(state, flag_index, epoch),
    )
}

fn base_reward_per_increment<P: Preset>(total_active_balance: Gwei) -> Gwei {
    P::EFFECTIVE_BALANCE_INCREMENT.get() * P::BASE_REWARD_FACTOR.get()
        / misc::integer_squareroot(total_active_balance)
}

fn base_reward<P, S>(state: &S, validator_index: ValidatorIndex, total_active_balance: Gwei) -> Gwei
where
    P: Preset,
    S: PostAltairBeaconState<P>,
{
    let increments = state
        .validators()
        .get(validator_index as usize)
        .map(|validator| validator.effective_balance / P::EFFECTIVE_BALANCE_INCREMENT)
        .unwrap_or_default();

    increments * base_reward_per_increment::<P>(total_active_balance)
}

fn process_inactivity_updates<P, S>(config: &Config, state: &mut S) -> Result<(), Error>
where
    P: Preset,
    S: PostAltairBeaconState<P>,
{
    if accessors::get_current_epoch(state) == GENESIS_EPOCH {
        return Ok(());
    }

    let previous_epoch = accessors::get_previous_epoch(state);
    let target_indices =
        unslashed_participating_indices(state, TIMELY_TARGET_FLAG_INDEX, previous_epoch);
    let in_inactivity_leak = previous_epoch - state.finalized_checkpoint().epoch
        > P::MIN_EPOCHS_TO_INACTIVITY_PENALTY;

    let eligible = eligible_validator_indices(state);

    for validator_index in eligible {
        let score = state
            .inactivity_scores_mut()
            .get_mut(validator_index as usize)
            .ok_or(Error::ValidatorOutOfBounds)?;

        if target_indices.contains(&validator_index) {
            *score = score.saturating_sub(1);
        } else {
            *score += config.inactivity_score_bias.get();
        }

        if !in_inactivity_leak {
            *score = score.saturating_sub(config.inactivity_score_recovery_rate);
        }
    }

    Ok(())
}

fn eligible_validator_indices<P, S>(state: &S) -> Vec<ValidatorIndex>
where
    P: Preset,
    S: PostAltairBeaconState<P>,
{
    let previous_epoch = accessors::get_previous_epoch(state);

    state
        .validators()
        .iter()
        .enumerate()
        .filter(|(_, validator)| {
            predicates::is_active_validator(validator, previous_epoch)
                || (validator.slashed && previous_epoch + 1 < validator.withdrawable_epoch)
        })
        .map(|(validator_index, _)| validator_index as ValidatorIndex)
        .collect()
}

fn process_rewards_and_penalties<P, S>(
    config: &Config,
    state: &mut S,
    inactivity_penalty_quotient: u64,
) -> Result<(), Error>
where
    P: Preset,
    S: PostAltairBeaconState<P>,
{
    let current_epoch = accessors::get_current_epoch(state);

    if current_epoch <= 1 {
        return Ok(());
    }

    let previous_epoch = accessors::get_previous_epoch(state);
    let total_active_balance = accessors::get_total_active_balance(state);
    let total_active_increments = total_active_balance / P::EFFECTIVE_BALANCE_INCREMENT;
    let in_inactivity_leak = previous_epoch - state.finalized_checkpoint().epoch
        > P::MIN_EPOCHS_TO_INACTIVITY_PENALTY;

    let mut rewards = vec![0_u64; state.validators().len()];
    let mut penalties = vec![0_u64; state.validators().len()];

    for (flag_index, weight) in PARTICIPATION_FLAG_WEIGHTS {
        let participating =
            unslashed_participating_indices(state, flag_index, previous_epoch);
        let participating_increments =
            accessors::total_balance(state, participating.iter().copied())
                / P::EFFECTIVE_BALANCE_INCREMENT;

        for validator_index in eligible_validator_indices(state) {
            let base = base_reward(state, validator_index, total_active_balance);
            let position = validator_index as usize;

            if participating.contains(&validator_index) {
                if !in_inactivity_leak {
                    rewards[position] += base * weight * participating_increments
                        / (total_active_increments * WEIGHT_DENOMINATOR);
                }
            } else if flag_index != TIMELY_HEAD_FLAG_INDEX {
                penalties[position] += base * weight / WEIGHT_DENOMINATOR;
            }
        }
    }

    let target_indices =
        unslashed_participating_indices(state, TIMELY_TARGET_FLAG_INDEX, previous_epoch);

    for validator_index in eligible_validator_indices(state) {
        if target_indices.contains(&validator_index) {
            continue;
        }

        let position = validator_index as usize;

        let effective_balance = state
            .validators()
            .get(position)
            .map(|validator| validator.effective_balance)
            .unwrap_or_default();

        let inactivity_score = state
            .inactivity_scores()
            .get(position)
            .copied()
            .unwrap_or_default();

        penalties[position] += effective_balance * inactivity_score
            / (config.inactivity_score_bias.get() * inactivity_penalty_quotient);
    }

    for (validator_index, reward) in rewards.into_iter().enumerate() {
        mutators::increase_balance(state, validator_index as ValidatorIndex, reward)?;
    }

    for (validator_index, penalty) in penalties.into_iter().enumerate() {
        mutators::decrease_balance(state, validator_index as ValidatorIndex, penalty)?;
    }

    Ok(())
}

fn process_participation_flag_updates<P, S>(state: &mut S)
where
    P: Preset,
    S: PostAltairBeaconState<P>,
{
    let rotated = core::mem::take(state.current_epoch_participation_mut());
    *state.previous_epoch_participation_mut() = rotated;

    let validator_count = state.validators().len();
    *state.current_epoch_participation_mut() =
        ssz_types::VariableList::new(vec![0; validator_count])
            .expect("the participation list limit matches the validator registry limit");
}

fn process_sync_committee_updates<P, S>(state: &mut S) -> Result<(), Error>
where
    P: Preset,
    S: PostAltairBeaconState<P>,
{
    let next_epoch = accessors::get_current_epoch(state) + 1;

    if next_epoch % P::EPOCHS_PER_SYNC_COMMITTEE_PERIOD.get() == 0 {
        let rotated = state.next_sync_committee().clone();
        *state.current_sync_committee_mut() = rotated;
        *state.next_sync_committee_mut() = next_sync_committee(state)?;
    }

    Ok(())
}

/// Samples the sync committee for the period after the next epoch.
pub fn next_sync_committee<P, S>(state: &S) -> Result<SyncCommittee<P>, Error>
where
    P: Preset,
    S: PostAltairBeaconState<P>,
{
    let epoch = accessors::get_current_epoch(state) + 1;
    let active_indices = accessors::get_active_validator_indices(state, epoch);

    if active_indices.is_empty() {
        return Err(Error::ValidatorOutOfBounds);
    }

    let seed = accessors::get_seed(state, epoch, DOMAIN_SYNC_COMMITTEE);
    let total = active_indices.len() as u64;
    let max_random_byte = u64::from(u8::MAX);

    let mut pubkeys = vec![];
    let mut attempt = 0_u64;

    while (pubkeys.len() as u64) < P::sync_committee_size() {
        let shuffled_position = shuffling::shuffled_index::<P>(attempt % total, total, seed);
        let candidate_index = active_indices[usize::try_from(shuffled_position)
            .expect("shuffled indices are bounded by the list length")];

        let random_source = hashing::hash_256_64(seed, attempt / 32);
        let random_byte = u64::from(
            random_source.as_bytes()[usize::try_from(attempt % 32)
                .expect("the remainder is less than 32")],
        );

        let validator = state
            .validators()
            .get(candidate_index as usize)
            .ok_or(Error::ValidatorOutOfBounds)?;

        if validator.effective_balance * max_random_byte
            >= P::MAX_EFFECTIVE_BALANCE * random_byte
        {
            pubkeys.push(validator.pubkey);
        }

        attempt += 1;
    }

    let aggregate_pubkey = bls::PublicKey::aggregate_nonempty(
        pubkeys
            .iter()
            .map(|bytes| bytes.decompress())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| Error::InvalidSignature)?,
    )
    .map_err(|_| Error::InvalidSignature)?
    .to_bytes();

    Ok(SyncCommittee {
        pubkeys: ssz_types::FixedVector::new(pubkeys)
            .map_err(|_| Error::ValidatorOutOfBounds)?,
        aggregate_pubkey,
    })
}

/// The altair fork transition.
pub fn upgrade_state<P: Preset>(
    config: &Config,
    pre: Phase0BeaconState<P>,
) -> Result<AltairBeaconState<P>, Error> {
    let validator_count = pre.validators.len();

    let mut post = AltairBeaconState {
        genesis_time: pre.genesis_time,
        genesis_validators_root: pre.genesis_validators_root,
        slot: pre.slot,
        fork: Fork {
            previous_version: pre.fork.current_version,
            current_version: config.fork_version(Phase::Altair),
            epoch: accessors::get_current_epoch(&pre),
        },
        latest_block_header: pre.latest_block_header,
        block_roots: pre.block_roots,
        state_roots: pre.state_roots,
        historical_roots: pre.historical_roots,
        eth1_data: pre.eth1_data,
        eth1_data_votes: pre.eth1_data_votes,
        eth1_deposit_index: pre.eth1_deposit_index,
        validators: pre.validators,
        balances: pre.balances,
        randao_mixes: pre.randao_mixes,
        slashings: pre.slashings,
        previous_epoch_participation: ssz_types::VariableList::new(vec![0; validator_count])
            .expect("the participation list limit matches the validator registry limit"),
        current_epoch_participation: ssz_types::VariableList::new(vec![0; validator_count])
            .expect("the participation list limit matches the validator registry limit"),
        justification_bits: pre.justification_bits,
        previous_justified_checkpoint: pre.previous_justified_checkpoint,
        current_justified_checkpoint: pre.current_justified_checkpoint,
        finalized_checkpoint: pre.finalized_checkpoint,
        inactivity_scores: ssz_types::VariableList::new(vec![0; validator_count])
            .expect("the inactivity list limit matches the validator registry limit"),
        current_sync_committee: SyncCommittee {
            pubkeys: ssz_types::FixedVector::default(),
            aggregate_pubkey: bls::PublicKeyBytes::default(),
        },
        next_sync_committee: SyncCommittee {
            pubkeys: ssz_types::FixedVector::default(),
            aggregate_pubkey: bls::PublicKeyBytes::default(),
        },
    };

    let sync_committee = next_sync_committee(&post)?;
    post.current_sync_committee = sync_committee.clone();
    post.next_sync_committee = sync_committee;

    Ok(post)
}
