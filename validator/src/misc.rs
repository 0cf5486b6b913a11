use types::phase0::primitives::{CommitteeIndex, Slot, ValidatorIndex};

/// An assignment to attest in a particular committee.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct AttesterDuty {
    pub validator_index: ValidatorIndex,
    pub slot: Slot,
    pub committee_index: CommitteeIndex,
    /// Position within the committee, used to set the aggregation bit.
    pub committee_position: usize,
    pub committee_size: usize,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ProposerDuty {
    pub validator_index: ValidatorIndex,
    pub slot: Slot,
}
