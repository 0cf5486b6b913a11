use std::sync::Arc;

use clock::Tick;
use types::{
    combined::SignedBeaconBlock,
    phase0::primitives::{Epoch, Gwei, Slot, ValidatorIndex, H256},
    preset::Preset,
};

/// Work submitted to the mutator.
///
/// Blocks are trusted or untrusted depending on origin; gossip blocks get
/// full signature verification, requested blocks already matched a root the
/// requester asked for.
pub enum MutatorMessage<P: Preset> {
    Block {
        block: Arc<SignedBeaconBlock<P>>,
        origin: BlockOrigin,
    },
    Attestation {
        validator_index: ValidatorIndex,
        target_root: H256,
        target_epoch: Epoch,
        balance: Gwei,
    },
    Tick(Tick),
    Stop,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BlockOrigin {
    Gossip,
    Requested,
    Own,
}

impl BlockOrigin {
    #[must_use]
    pub const fn verify_signatures(self) -> bool {
        matches!(self, Self::Gossip | Self::Requested)
    }
}

/// Notifications published by the mutator after its state has been
/// committed. Head updates only become visible here once the corresponding
/// state transition has been persisted.
#[derive(Clone, Debug)]
pub enum MutatorEvent<P: Preset> {
    BlockAdmitted {
        root: H256,
        slot: Slot,
        block: Arc<SignedBeaconBlock<P>>,
    },
    BlockRejected {
        root: H256,
        rejected_by_peer_fault: bool,
    },
    HeadChanged {
        root: H256,
        slot: Slot,
    },
    Finalized {
        root: H256,
        epoch: Epoch,
    },
}
