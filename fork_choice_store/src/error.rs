use thiserror::Error;
use types::phase0::primitives::{Slot, H256};

#[derive(Clone, Copy, PartialEq, Eq, Debug, Error)]
pub enum Error {
    #[error("block {root:?} at slot {slot} does not descend from the finalized chain")]
    Unviable { root: H256, slot: Slot },
    #[error("block {root:?} is not in the DAG")]
    UnknownBlock { root: H256 },
    #[error("block {root:?} at slot {slot} is not after its parent at slot {parent_slot}")]
    SlotNotAfterParent {
        root: H256,
        slot: Slot,
        parent_slot: Slot,
    },
    #[error("vote target {root:?} is not in the DAG")]
    UnknownVoteTarget { root: H256 },
    #[error("DAG rebuild did not reach the finalized tail")]
    RebuildDidNotReachTail,
}
