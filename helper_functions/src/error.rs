use thiserror::Error;
use types::phase0::primitives::{CommitteeIndex, Slot, ValidatorIndex};

#[derive(Clone, Copy, PartialEq, Eq, Debug, Error)]
pub enum Error {
    #[error("committee index {index} out of bounds for slot {slot}")]
    CommitteeIndexOutOfBounds { slot: Slot, index: CommitteeIndex },
    #[error("no active validators")]
    NoActiveValidators,
    #[error("slot {slot} is out of range for block root lookup")]
    SlotOutOfRange { slot: Slot },
    #[error("validator index {validator_index} out of bounds")]
    ValidatorIndexOutOfBounds { validator_index: ValidatorIndex },
    #[error("attestation bitfield length does not match committee size")]
    BitfieldLengthMismatch,
    #[error("attesting indices are not sorted and unique")]
    AttestingIndicesNotSortedAndUnique,
    #[error("attesting indices are empty")]
    AttestingIndicesEmpty,
    #[error("signature is invalid")]
    InvalidSignature,
}
