//! Transition steps shared by every fork.
//!
//! These operate on [`BeaconState`] and only touch the fields the forks have
//! in common. Per-fork modules compose them with the fork-specific steps.

use helper_functions::{accessors, misc, mutators, predicates, signing};
use ssz_types::typenum::Unsigned as _;
use tree_hash::TreeHash;
use types::{
    config::Config,
    phase0::{
        consts::{
            DOMAIN_BEACON_PROPOSER, DOMAIN_DEPOSIT, DOMAIN_RANDAO, DOMAIN_VOLUNTARY_EXIT,
            FAR_FUTURE_EPOCH,
        },
        containers::{
            AttesterSlashing, Checkpoint, DepositData, DepositMessage, ProposerSlashing,
            SignedVoluntaryExit, Validator,
        },
        primitives::{Epoch, Gwei, Slot, ValidatorIndex, H256},
    },
    preset::Preset,
    traits::BeaconState,
};

use crate::error::Error;

/// Advances the state through empty slots up to and including
/// `target_slot`, running epoch processing at epoch boundaries via the
/// supplied callback.
pub fn process_slots_with<P, S>(
    state: &mut S,
    target_slot: Slot,
    mut process_epoch: impl FnMut(&mut S) -> Result<(), Error>,
) -> Result<(), Error>
where
    P: Preset,
    S: BeaconState<P> + TreeHash,
{
    if target_slot <= state.slot() {
        return Err(Error::SlotInPast {
            state_slot: state.slot(),
            target_slot,
        });
    }

    while state.slot() < target_slot {
        process_slot(state);

        if misc::is_epoch_start::<P>(state.slot() + 1) {
            process_epoch(state)?;
        }

        *state.slot_mut() += 1;
    }

    Ok(())
}

/// Rotates the state and block root caches for one slot.
fn process_slot<P, S>(state: &mut S)
where
    P: Preset,
    S: BeaconState<P> + TreeHash,
{
    let previous_state_root = state.tree_hash_root();
    let position = usize::try_from(state.slot() % P::slots_per_historical_root())
        .expect("the remainder is less than the vector length");

    state.state_roots_mut()[position] = previous_state_root;

    if state.latest_block_header().state_root.is_zero() {
        state.latest_block_header_mut().state_root = previous_state_root;
    }

    let previous_block_root = state.latest_block_header().tree_hash_root();
    state.block_roots_mut()[position] = previous_block_root;
}

pub fn validate_block_header<P: Preset>(
    state: &mut impl BeaconState<P>,
    slot: Slot,
    proposer_index: ValidatorIndex,
    parent_root: H256,
    body_root: H256,
) -> Result<(), Error> {
    if slot != state.slot() {
        return Err(Error::SlotMismatch {
            state_slot: state.slot(),
            block_slot: slot,
        });
    }

    let expected_proposer = accessors::get_beacon_proposer_index(state)?;

    if proposer_index != expected_proposer {
        return Err(Error::ProposerMismatch {
            computed: expected_proposer,
            in_block: proposer_index,
        });
    }

    let expected_parent = state.latest_block_header().tree_hash_root();

    if parent_root != expected_parent {
        return Err(Error::ParentRootMismatch {
            computed: expected_parent,
            in_block: parent_root,
        });
    }

    let proposer = state
        .validators()
        .get(proposer_index as usize)
        .ok_or(Error::ValidatorOutOfBounds)?;

    if proposer.slashed {
        return Err(Error::ProposerSlashed { proposer_index });
    }

    *state.latest_block_header_mut() = types::phase0::containers::BeaconBlockHeader {
        slot,
        proposer_index,
        parent_root,
        // Overwritten by the next `process_slot`. It cannot be computed here
        // because the post-state is not known yet.
        state_root: H256::zero(),
        body_root,
    };

    Ok(())
}

pub fn process_randao<P: Preset>(
    config: &Config,
    state: &mut impl BeaconState<P>,
    randao_reveal: bls::SignatureBytes,
    verify_signature: bool,
) -> Result<(), Error> {
    let epoch = accessors::get_current_epoch(state);

    if verify_signature {
        let proposer_index = accessors::get_beacon_proposer_index(state)?;
        let proposer_pubkey = state
            .validators()
            .get(proposer_index as usize)
            .ok_or(Error::ValidatorOutOfBounds)?
            .pubkey;

        let domain = accessors::get_domain(config, state, DOMAIN_RANDAO, None);

        signing::verify(&epoch, domain, proposer_pubkey, randao_reveal)
            .map_err(|_| Error::InvalidRandaoReveal)?;
    }

    let mix_position = usize::try_from(epoch % P::epochs_per_historical_vector())
        .expect("the remainder is less than the vector length");

    let current_mix = accessors::get_randao_mix(state, epoch);
    let reveal_digest = hashing::hash_256(randao_reveal.as_bytes());

    let mut mixed = [0; 32];
    for (byte, (current, revealed)) in mixed.iter_mut().zip(
        current_mix
            .as_bytes()
            .iter()
            .zip(reveal_digest.as_bytes().iter()),
    ) {
        *byte = current ^ revealed;
    }

    state.randao_mixes_mut()[mix_position] = H256(mixed);

    Ok(())
}

pub fn process_eth1_data<P: Preset>(
    state: &mut impl BeaconState<P>,
    eth1_data: types::phase0::containers::Eth1Data,
) {
    // A full vote is tolerated failing to push only when the list is full,
    // which cannot happen because the list is reset every voting period.
    state
        .eth1_data_votes_mut()
        .push(eth1_data)
        .expect("the votes list is reset every voting period");

    let vote_count = state
        .eth1_data_votes()
        .iter()
        .filter(|vote| **vote == eth1_data)
        .count();

    if vote_count * 2 > P::SlotsPerEth1VotingPeriod::to_usize() {
        *state.eth1_data_mut() = eth1_data;
    }
}

pub fn process_proposer_slashing<P: Preset>(
    config: &Config,
    state: &mut impl BeaconState<P>,
    proposer_slashing: ProposerSlashing,
    min_slashing_penalty_quotient: u64,
) -> Result<(), Error> {
    let header_1 = proposer_slashing.signed_header_1.message;
    let header_2 = proposer_slashing.signed_header_2.message;

    let slashable = header_1.slot == header_2.slot
        && header_1.proposer_index == header_2.proposer_index
        && header_1 != header_2;

    if !slashable {
        return Err(Error::InvalidProposerSlashing);
    }

    let proposer_index = header_1.proposer_index;
    let proposer = state
        .validators()
        .get(proposer_index as usize)
        .ok_or(Error::ValidatorOutOfBounds)?;

    if !predicates::is_slashable_validator(proposer, accessors::get_current_epoch(state)) {
        return Err(Error::InvalidProposerSlashing);
    }

    let pubkey = proposer.pubkey;

    for signed_header in [
        proposer_slashing.signed_header_1,
        proposer_slashing.signed_header_2,
    ] {
        let domain = accessors::get_domain(
            config,
            state,
            DOMAIN_BEACON_PROPOSER,
            Some(misc::compute_epoch_at_slot::<P>(signed_header.message.slot)),
        );

        signing::verify(&signed_header.message, domain, pubkey, signed_header.signature)
            .map_err(|_| Error::InvalidSignature)?;
    }

    let whistleblower = accessors::get_beacon_proposer_index(state)?;
    mutators::slash_validator(
        config,
        state,
        proposer_index,
        None,
        whistleblower,
        min_slashing_penalty_quotient,
    )?;

    Ok(())
}

pub fn process_attester_slashing<P: Preset>(
    config: &Config,
    state: &mut impl BeaconState<P>,
    attester_slashing: &AttesterSlashing<P>,
    verify_signatures: bool,
    min_slashing_penalty_quotient: u64,
) -> Result<(), Error> {
    let attestation_1 = &attester_slashing.attestation_1;
    let attestation_2 = &attester_slashing.attestation_2;

    if !predicates::is_slashable_attestation_data(attestation_1.data, attestation_2.data) {
        return Err(Error::InvalidAttesterSlashing);
    }

    predicates::validate_indexed_attestation(config, state, attestation_1, verify_signatures)?;
    predicates::validate_indexed_attestation(config, state, attestation_2, verify_signatures)?;

    let current_epoch = accessors::get_current_epoch(state);
    let whistleblower = accessors::get_beacon_proposer_index(state)?;

    let indices_1 = attestation_1
        .attesting_indices
        .iter()
        .copied()
        .collect::<std::collections::BTreeSet<_>>();

    let mut slashed_any = false;

    for validator_index in attestation_2
        .attesting_indices
        .iter()
        .filter(|validator_index| indices_1.contains(validator_index))
    {
        let slashable = state
            .validators()
            .get(*validator_index as usize)
            .is_some_and(|validator| {
                predicates::is_slashable_validator(validator, current_epoch)
            });

        if slashable {
            mutators::slash_validator(
                config,
                state,
                *validator_index,
                None,
                whistleblower,
                min_slashing_penalty_quotient,
            )?;
            slashed_any = true;
        }
    }

    if !slashed_any {
        return Err(Error::InvalidAttesterSlashing);
    }

    Ok(())
}

/// Verifies a deposit's Merkle proof against the tracked deposit root and
/// applies its data.
pub fn process_deposit<P: Preset>(
    config: &Config,
    state: &mut impl BeaconState<P>,
    deposit: &types::phase0::containers::Deposit,
) -> Result<Option<ValidatorIndex>, Error> {
    let leaf = deposit.data.tree_hash_root();
    let deposit_index = state.eth1_deposit_index();

    let proof_is_valid = predicates::is_valid_merkle_branch(
        leaf,
        deposit.proof.iter().copied(),
        deposit_index,
        state.eth1_data().deposit_root,
    );

    if !proof_is_valid {
        return Err(Error::InvalidDepositProof);
    }

    *state.eth1_deposit_index_mut() += 1;

    apply_deposit_data(config, state, deposit.data)
}

/// Adds a deposit to the registry or tops up an existing validator.
///
/// Deposits with invalid signatures are skipped rather than rejected. They
/// were accepted by the deposit contract and consume a deposit index.
pub fn apply_deposit_data<P: Preset>(
    config: &Config,
    state: &mut impl BeaconState<P>,
    data: DepositData,
) -> Result<Option<ValidatorIndex>, Error> {
    let existing_index = state
        .validators()
        .iter()
        .position(|validator| validator.pubkey == data.pubkey)
        .map(|position| position as ValidatorIndex);

    if let Some(validator_index) = existing_index {
        mutators::increase_balance(state, validator_index, data.amount)?;
        return Ok(None);
    }

    let deposit_message = DepositMessage {
        pubkey: data.pubkey,
        withdrawal_credentials: data.withdrawal_credentials,
        amount: data.amount,
    };

    // Deposit domains are computed with the genesis fork version so deposits
    // remain valid across forks.
    let domain = misc::compute_domain(config, DOMAIN_DEPOSIT, None, None);

    if signing::verify(&deposit_message, domain, data.pubkey, data.signature).is_err() {
        return Ok(None);
    }

    let effective_balance = (data.amount - data.amount % P::EFFECTIVE_BALANCE_INCREMENT)
        .min(P::MAX_EFFECTIVE_BALANCE);

    let validator = Validator {
        pubkey: data.pubkey,
        withdrawal_credentials: data.withdrawal_credentials,
        effective_balance,
        slashed: false,
        activation_eligibility_epoch: FAR_FUTURE_EPOCH,
        activation_epoch: FAR_FUTURE_EPOCH,
        exit_epoch: FAR_FUTURE_EPOCH,
        withdrawable_epoch: FAR_FUTURE_EPOCH,
    };

    state
        .validators_mut()
        .push(validator)
        .map_err(|_| Error::ValidatorOutOfBounds)?;
    state
        .balances_mut()
        .push(data.amount)
        .map_err(|_| Error::ValidatorOutOfBounds)?;

    Ok(Some(state.validators().len() as ValidatorIndex - 1))
}

pub fn process_voluntary_exit<P: Preset>(
    config: &Config,
    state: &mut impl BeaconState<P>,
    signed_exit: SignedVoluntaryExit,
    verify_signature: bool,
) -> Result<(), Error> {
    let exit = signed_exit.message;
    let current_epoch = accessors::get_current_epoch(state);

    let validator = state
        .validators()
        .get(exit.validator_index as usize)
        .ok_or(Error::InvalidVoluntaryExit)?;

    let valid = predicates::is_active_validator(validator, current_epoch)
        && validator.exit_epoch == FAR_FUTURE_EPOCH
        && current_epoch >= exit.epoch
        && current_epoch >= validator.activation_epoch + config.shard_committee_period;

    if !valid {
        return Err(Error::InvalidVoluntaryExit);
    }

    if verify_signature {
        let domain =
            accessors::get_domain(config, state, DOMAIN_VOLUNTARY_EXIT, Some(exit.epoch));

        signing::verify(&exit, domain, validator.pubkey, signed_exit.signature)
            .map_err(|_| Error::InvalidVoluntaryExit)?;
    }

    mutators::initiate_validator_exit(config, state, exit.validator_index)?;

    Ok(())
}

/// The two-round justification and finalization rule.
///
/// Bit 0 tracks the current epoch, bit 1 the previous one. A checkpoint
/// finalizes when it is justified and the required later bits are set.
pub fn weigh_justification_and_finalization<P: Preset>(
    state: &mut impl BeaconState<P>,
    total_active_balance: Gwei,
    previous_epoch_target_balance: Gwei,
    current_epoch_target_balance: Gwei,
) -> Result<(), Error> {
    let previous_epoch = accessors::get_previous_epoch(state);
    let current_epoch = accessors::get_current_epoch(state);

    let old_previous_justified = state.previous_justified_checkpoint();
    let old_current_justified = state.current_justified_checkpoint();

    *state.previous_justified_checkpoint_mut() = old_current_justified;

    let bits = state.justification_bits_mut();
    for position in (1..bits.len()).rev() {
        let earlier = bits.get(position - 1).expect("the position is in bounds");
        bits.set(position, earlier).expect("the position is in bounds");
    }
    bits.set(0, false).expect("the position is in bounds");

    if previous_epoch_target_balance * 3 >= total_active_balance * 2 {
        *state.current_justified_checkpoint_mut() = Checkpoint {
            epoch: previous_epoch,
            root: accessors::get_block_root(state, previous_epoch)?,
        };
        state
            .justification_bits_mut()
            .set(1, true)
            .expect("the position is in bounds");
    }

    if current_epoch_target_balance * 3 >= total_active_balance * 2 {
        *state.current_justified_checkpoint_mut() = Checkpoint {
            epoch: current_epoch,
            root: accessors::get_block_root(state, current_epoch)?,
        };
        state
            .justification_bits_mut()
            .set(0, true)
            .expect("the position is in bounds");
    }

    let bits = state.justification_bits();
    let bit = |position: usize| bits.get(position).expect("the position is in bounds");

    // 2nd/3rd/4th most recent epochs justified, sourcing from the oldest.
    if bit(1) && bit(2) && bit(3) && old_previous_justified.epoch + 3 == current_epoch {
        *state.finalized_checkpoint_mut() = old_previous_justified;
    }

    if bit(1) && bit(2) && old_previous_justified.epoch + 2 == current_epoch {
        *state.finalized_checkpoint_mut() = old_previous_justified;
    }

    if bit(0) && bit(1) && bit(2) && old_current_justified.epoch + 2 == current_epoch {
        *state.finalized_checkpoint_mut() = old_current_justified;
    }

    if bit(0) && bit(1) && old_current_justified.epoch + 1 == current_epoch {
        *state.finalized_checkpoint_mut() = old_current_justified;
    }

    Ok(())
}

pub fn process_registry_updates<P: Preset>(
    config: &Config,
    state: &mut impl BeaconState<P>,
) -> Result<(), Error> {
    let current_epoch = accessors::get_current_epoch(state);
    let activation_exit_epoch = misc::compute_activation_exit_epoch::<P>(current_epoch);

    let mut to_eject = vec![];

    for (validator_index, validator) in state.validators_mut().iter_mut().enumerate() {
        if validator.activation_eligibility_epoch == FAR_FUTURE_EPOCH
            && validator.effective_balance == P::MAX_EFFECTIVE_BALANCE
        {
            validator.activation_eligibility_epoch = current_epoch + 1;
        }

        if predicates::is_active_validator(validator, current_epoch)
            && validator.effective_balance <= config.ejection_balance
        {
            to_eject.push(validator_index as ValidatorIndex);
        }
    }

    for validator_index in to_eject {
        mutators::initiate_validator_exit(config, state, validator_index)?;
    }

    let mut activation_queue = state
        .validators()
        .iter()
        .enumerate()
        .filter(|(_, validator)| {
            validator.activation_eligibility_epoch <= state_finalized_epoch(state)
                && validator.activation_epoch == FAR_FUTURE_EPOCH
        })
        .map(|(validator_index, validator)| {
            (
                validator.activation_eligibility_epoch,
                validator_index as ValidatorIndex,
            )
        })
        .collect::<Vec<_>>();

    activation_queue.sort_unstable();

    let churn_limit = mutators::validator_churn_limit::<P>(config, state);

    let to_activate = activation_queue
        .into_iter()
        .take(usize::try_from(churn_limit).expect("churn limits are small"))
        .map(|(_, validator_index)| validator_index)
        .collect::<Vec<_>>();

    for validator_index in to_activate {
        state
            .validators_mut()
            .get_mut(validator_index as usize)
            .ok_or(Error::ValidatorOutOfBounds)?
            .activation_epoch = activation_exit_epoch;
    }

    Ok(())
}

fn state_finalized_epoch<P: Preset>(state: &impl BeaconState<P>) -> Epoch {
    state.finalized_checkpoint().epoch
}

pub fn process_slashings_sweep<P: Preset>(
    state: &mut impl BeaconState<P>,
    proportional_slashing_multiplier: u64,
) -> Result<(), Error> {
    let current_epoch = accessors::get_current_epoch(state);
    let total_balance = accessors::get_total_active_balance(state);

    let slashings_sum = state.slashings().iter().copied().sum::<Gwei>();
    let adjusted_total = (slashings_sum * proportional_slashing_multiplier).min(total_balance);

    let penalties = state
        .validators()
        .iter()
        .enumerate()
        .filter(|(_, validator)| {
            validator.slashed
                && current_epoch + P::epochs_per_slashings_vector() / 2
                    == validator.withdrawable_epoch
        })
        .map(|(validator_index, validator)| {
            let increment = P::EFFECTIVE_BALANCE_INCREMENT.get();
            let penalty_numerator =
                validator.effective_balance / increment * adjusted_total;
            let penalty = penalty_numerator / total_balance * increment;
            (validator_index as ValidatorIndex, penalty)
        })
        .collect::<Vec<_>>();

    for (validator_index, penalty) in penalties {
        mutators::decrease_balance(state, validator_index, penalty)?;
    }

    Ok(())
}

pub fn process_effective_balance_updates<P: Preset>(state: &mut impl BeaconState<P>) {
    let increment = P::EFFECTIVE_BALANCE_INCREMENT.get();
    let hysteresis_increment = increment / P::HYSTERESIS_QUOTIENT;
    let downward_threshold = hysteresis_increment * P::HYSTERESIS_DOWNWARD_MULTIPLIER;
    let upward_threshold = hysteresis_increment * P::HYSTERESIS_UPWARD_MULTIPLIER;

    let balances = state
        .balances()
        .iter()
        .copied()
        .collect::<Vec<_>>();

    for (validator, balance) in state.validators_mut().iter_mut().zip(balances) {
        let below = balance + downward_threshold < validator.effective_balance;
        let above = validator.effective_balance + upward_threshold < balance;

        if below || above {
            validator.effective_balance =
                (balance - balance % increment).min(P::MAX_EFFECTIVE_BALANCE);
        }
    }
}

pub fn process_eth1_data_votes_reset<P: Preset>(state: &mut impl BeaconState<P>) {
    let next_slot = state.slot() + 1;

    if next_slot % P::SlotsPerEth1VotingPeriod::to_u64() == 0 {
        *state.eth1_data_votes_mut() = ssz_types::VariableList::empty();
    }
}

pub fn process_slashings_reset<P: Preset>(state: &mut impl BeaconState<P>) {
    let next_epoch = accessors::get_current_epoch(state) + 1;
    let position = usize::try_from(next_epoch % P::epochs_per_slashings_vector())
        .expect("the remainder is less than the vector length");

    state.slashings_mut()[position] = 0;
}

pub fn process_randao_mixes_reset<P: Preset>(state: &mut impl BeaconState<P>) {
    let current_epoch = accessors::get_current_epoch(state);
    let next_epoch = current_epoch + 1;
    let position = usize::try_from(next_epoch % P::epochs_per_historical_vector())
        .expect("the remainder is less than the vector length");

    state.randao_mixes_mut()[position] = accessors::get_randao_mix(state, current_epoch);
}

pub fn process_historical_roots_update<P: Preset>(
    state: &mut impl BeaconState<P>,
) -> Result<(), Error> {
    let next_epoch = accessors::get_current_epoch(state) + 1;
    let epochs_per_period = P::slots_per_historical_root() / P::SLOTS_PER_EPOCH.get();

    if next_epoch % epochs_per_period == 0 {
        let block_roots_root = state.block_roots().tree_hash_root();
        let state_roots_root = state.state_roots().tree_hash_root();
        let historical_root = misc::hash_concatenation(block_roots_root, state_roots_root);

        state
            .historical_roots_mut()
            .push(historical_root)
            .map_err(|_| Error::ValidatorOutOfBounds)?;
    }

    Ok(())
}
