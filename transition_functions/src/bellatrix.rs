use helper_functions::accessors;
use ssz_types::typenum::Unsigned as _;
use tree_hash::TreeHash as _;
use types::{
    altair::beacon_state::BeaconState as AltairBeaconState,
    bellatrix::{
        beacon_state::BeaconState as BellatrixBeaconState,
        consts::{
            INACTIVITY_PENALTY_QUOTIENT_BELLATRIX, MIN_SLASHING_PENALTY_QUOTIENT_BELLATRIX,
            PROPORTIONAL_SLASHING_MULTIPLIER_BELLATRIX,
        },
        containers::{BeaconBlock, ExecutionPayload, ExecutionPayloadHeader},
    },
    config::Config,
    nonstandard::Phase,
    phase0::primitives::Slot,
    preset::Preset,
    traits::BeaconState as _,
};

use crate::{altair, error::Error, unphased};

pub fn process_slots<P: Preset>(
    config: &Config,
    state: &mut BellatrixBeaconState<P>,
    target_slot: Slot,
) -> Result<(), Error> {
    unphased::process_slots_with(state, target_slot, |state| {
        altair::process_epoch(
            config,
            state,
            PROPORTIONAL_SLASHING_MULTIPLIER_BELLATRIX,
            INACTIVITY_PENALTY_QUOTIENT_BELLATRIX,
        )
    })
}

pub fn process_block<P: Preset>(
    config: &Config,
    state: &mut BellatrixBeaconState<P>,
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

    if is_execution_enabled(state, block) {
        process_execution_payload(config, state, &block.body.execution_payload)?;
    }

    unphased::process_randao(config, state, block.body.randao_reveal, verify_signatures)?;
    unphased::process_eth1_data(state, block.body.eth1_data);

    for proposer_slashing in block.body.proposer_slashings.iter().copied() {
        unphased::process_proposer_slashing(
            config,
            state,
            proposer_slashing,
            MIN_SLASHING_PENALTY_QUOTIENT_BELLATRIX,
        )?;
    }

    for attester_slashing in &block.body.attester_slashings {
        unphased::process_attester_slashing(
            config,
            state,
            attester_slashing,
            verify_signatures,
            MIN_SLASHING_PENALTY_QUOTIENT_BELLATRIX,
        )?;
    }

    for attestation in &block.body.attestations {
        altair::process_attestation(config, state, attestation, verify_signatures)?;
    }

    let expected_deposits = (state.eth1_data().deposit_count - state.eth1_deposit_index())
        .min(P::MaxDeposits::to_u64());

    if block.body.deposits.len() as u64 != expected_deposits {
        return Err(Error::DepositCountMismatch);
    }

    for deposit in &block.body.deposits {
        altair::process_deposit(config, state, deposit)?;
    }

    for signed_exit in block.body.voluntary_exits.iter().copied() {
        unphased::process_voluntary_exit(config, state, signed_exit, verify_signatures)?;
    }

    altair::process_sync_aggregate(
        config,
        state,
        &block.body.sync_aggregate,
        verify_signatures,
    )?;

    Ok(())
}

#[must_use]
pub fn is_merge_transition_complete<P: Preset>(state: &BellatrixBeaconState<P>) -> bool {
    state.latest_execution_payload_header != ExecutionPayloadHeader::default()
}

fn is_execution_enabled<P: Preset>(
    state: &BellatrixBeaconState<P>,
    block: &BeaconBlock<P>,
) -> bool {
    is_merge_transition_complete(state)
        || block.body.execution_payload != ExecutionPayload::default()
}

/// Consistency checks between the payload and the consensus state.
///
/// Execution validity itself is judged by the execution client; fork choice
/// tracks the verdict per block.
fn process_execution_payload<P: Preset>(
    config: &Config,
    state: &mut BellatrixBeaconState<P>,
    payload: &ExecutionPayload<P>,
) -> Result<(), Error> {
    if is_merge_transition_complete(state)
        && payload.parent_hash != state.latest_execution_payload_header.block_hash
    {
        return Err(Error::PayloadParentMismatch);
    }

    let current_epoch = accessors::get_current_epoch(state);

    if payload.prev_randao != accessors::get_randao_mix(state, current_epoch) {
        return Err(Error::PayloadFieldMismatch);
    }

    let expected_timestamp = state.genesis_time
        + state.slot * config.seconds_per_slot.get();

    if payload.timestamp != expected_timestamp {
        return Err(Error::PayloadFieldMismatch);
    }

    state.latest_execution_payload_header = ExecutionPayloadHeader {
        parent_hash: payload.parent_hash,
        fee_recipient: payload.fee_recipient,
        state_root: payload.state_root,
        receipts_root: payload.receipts_root,
        logs_bloom: payload.logs_bloom.clone(),
        prev_randao: payload.prev_randao,
        block_number: payload.block_number,
        gas_limit: payload.gas_limit,
        gas_used: payload.gas_used,
        timestamp: payload.timestamp,
        extra_data: payload.extra_data.clone(),
        base_fee_per_gas: payload.base_fee_per_gas,
        block_hash: payload.block_hash,
        transactions_root: payload.transactions.tree_hash_root(),
    };

    Ok(())
}

/// The bellatrix fork transition.
#[must_use]
pub fn upgrade_state<P: Preset>(
    config: &Config,
    pre: AltairBeaconState<P>,
) -> BellatrixBeaconState<P> {
    BellatrixBeaconState {
        genesis_time: pre.genesis_time,
        genesis_validators_root: pre.genesis_validators_root,
        slot: pre.slot,
        fork: types::phase0::containers::Fork {
            previous_version: pre.fork.current_version,
            current_version: config.fork_version(Phase::Bellatrix),
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
        previous_epoch_participation: pre.previous_epoch_participation,
        current_epoch_participation: pre.current_epoch_participation,
        justification_bits: pre.justification_bits,
        previous_justified_checkpoint: pre.previous_justified_checkpoint,
        current_justified_checkpoint: pre.current_justified_checkpoint,
        finalized_checkpoint: pre.finalized_checkpoint,
        inactivity_scores: pre.inactivity_scores,
        current_sync_committee: pre.current_sync_committee,
        next_sync_committee: pre.next_sync_committee,
        latest_execution_payload_header: ExecutionPayloadHeader::default(),
    }
}
