use thiserror::Error;
use types::{
    nonstandard::Phase,
    phase0::primitives::{Epoch, Slot, ValidatorIndex, H256},
};

#[derive(Clone, Copy, PartialEq, Eq, Debug, Error)]
pub enum Error {
    #[error("target slot {target_slot} is not after state slot {state_slot}")]
    SlotInPast { state_slot: Slot, target_slot: Slot },
    #[error("block phase {block_phase:?} does not match state phase {state_phase:?}")]
    PhaseMismatch {
        block_phase: Phase,
        state_phase: Phase,
    },
    #[error("block slot {block_slot} does not match state slot {state_slot}")]
    SlotMismatch { state_slot: Slot, block_slot: Slot },
    #[error("block parent root {in_block:?} does not match latest block header {computed:?}")]
    ParentRootMismatch { computed: H256, in_block: H256 },
    #[error("block proposer {in_block} does not match expected proposer {computed}")]
    ProposerMismatch {
        computed: ValidatorIndex,
        in_block: ValidatorIndex,
    },
    #[error("block proposer {proposer_index} is slashed")]
    ProposerSlashed { proposer_index: ValidatorIndex },
    #[error("state root {in_block:?} does not match computed state root {computed:?}")]
    StateRootMismatch { computed: H256, in_block: H256 },
    #[error("signature is invalid")]
    InvalidSignature,
    #[error("RANDAO reveal is invalid")]
    InvalidRandaoReveal,
    #[error("proposer slashing headers are not slashable")]
    InvalidProposerSlashing,
    #[error("attester slashing attestations are not slashable")]
    InvalidAttesterSlashing,
    #[error("attestation targets epoch {target_epoch} outside the current and previous epoch")]
    AttestationOutsideInclusionEpochs { target_epoch: Epoch },
    #[error(
        "attestation inclusion delay is out of range \
         (attestation slot: {attestation_slot}, state slot: {state_slot})"
    )]
    AttestationOutsideInclusionWindow {
        attestation_slot: Slot,
        state_slot: Slot,
    },
    #[error("attestation source does not match the justified checkpoint")]
    AttestationSourceMismatch,
    #[error("deposit count does not match expected count")]
    DepositCountMismatch,
    #[error("deposit merkle proof is invalid")]
    InvalidDepositProof,
    #[error("voluntary exit is invalid")]
    InvalidVoluntaryExit,
    #[error("sync aggregate signature is invalid")]
    InvalidSyncAggregate,
    #[error("execution payload does not build on the previous payload")]
    PayloadParentMismatch,
    #[error("execution payload randao or timestamp does not match the state")]
    PayloadFieldMismatch,
    #[error("validator index is out of bounds")]
    ValidatorOutOfBounds,
    #[error("helper function failed: {0}")]
    Helper(#[from] helper_functions::error::Error),
}
