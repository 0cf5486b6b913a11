use bls::SignatureBytes;
use derive_more::From;
use serde::{Deserialize, Serialize};
use ssz::{Decode, DecodeError, Encode as _};
use tree_hash::TreeHash as _;

use crate::{
    altair::{
        beacon_state::BeaconState as AltairBeaconState,
        containers::{
            BeaconBlock as AltairBeaconBlock, SignedBeaconBlock as AltairSignedBeaconBlock,
            SyncAggregate,
        },
    },
    bellatrix::{
        beacon_state::BeaconState as BellatrixBeaconState,
        containers::{
            BeaconBlock as BellatrixBeaconBlock, SignedBeaconBlock as BellatrixSignedBeaconBlock,
        },
    },
    config::Config,
    nonstandard::Phase,
    phase0::{
        beacon_state::BeaconState as Phase0BeaconState,
        containers::{
            BeaconBlock as Phase0BeaconBlock, BeaconBlockHeader, Checkpoint, Fork,
            SignedBeaconBlock as Phase0SignedBeaconBlock,
        },
        primitives::{ExecutionBlockHash, Slot, UnixSeconds, ValidatorIndex, H256},
    },
    preset::Preset,
    traits::BeaconState as UnphasedBeaconState,
};

// The first fields of every per-fork variant coincide, so the slot needed to
// select the variant can be read at a fixed offset before decoding.
const SLOT_OFFSET_IN_BLOCK: usize = 0;
const SLOT_OFFSET_IN_SIGNED_BLOCK: usize = 100;
const SLOT_OFFSET_IN_STATE: usize = 40;

macro_rules! match_forked {
    ($self:expr, $inner:pat => $expression:expr) => {
        match $self {
            Self::Phase0($inner) => $expression,
            Self::Altair($inner) => $expression,
            Self::Bellatrix($inner) => $expression,
        }
    };
}

#[derive(Clone, PartialEq, Debug, From, Deserialize, Serialize)]
#[serde(bound = "", untagged)]
pub enum BeaconState<P: Preset> {
    Phase0(Phase0BeaconState<P>),
    Altair(AltairBeaconState<P>),
    Bellatrix(BellatrixBeaconState<P>),
}

impl<P: Preset> BeaconState<P> {
    #[must_use]
    pub const fn phase(&self) -> Phase {
        match self {
            Self::Phase0(_) => Phase::Phase0,
            Self::Altair(_) => Phase::Altair,
            Self::Bellatrix(_) => Phase::Bellatrix,
        }
    }

    #[must_use]
    pub fn genesis_time(&self) -> UnixSeconds {
        match_forked!(self, state => state.genesis_time)
    }

    #[must_use]
    pub fn genesis_validators_root(&self) -> H256 {
        match_forked!(self, state => state.genesis_validators_root)
    }

    #[must_use]
    pub fn slot(&self) -> Slot {
        match_forked!(self, state => state.slot)
    }

    pub fn set_slot(&mut self, slot: Slot) {
        match_forked!(self, state => state.slot = slot)
    }

    #[must_use]
    pub fn fork(&self) -> Fork {
        match_forked!(self, state => state.fork)
    }

    #[must_use]
    pub fn latest_block_header(&self) -> BeaconBlockHeader {
        match_forked!(self, state => state.latest_block_header)
    }

    #[must_use]
    pub fn finalized_checkpoint(&self) -> Checkpoint {
        match_forked!(self, state => state.finalized_checkpoint)
    }

    #[must_use]
    pub fn current_justified_checkpoint(&self) -> Checkpoint {
        match_forked!(self, state => state.current_justified_checkpoint)
    }

    #[must_use]
    pub fn validator_count(&self) -> usize {
        match_forked!(self, state => state.validators.len())
    }

    /// Borrows the fields shared by every fork.
    #[must_use]
    pub fn as_unphased(&self) -> &dyn UnphasedBeaconState<P> {
        match_forked!(self, state => state)
    }

    pub fn as_unphased_mut(&mut self) -> &mut dyn UnphasedBeaconState<P> {
        match_forked!(self, state => state)
    }

    #[must_use]
    pub fn hash_tree_root(&self) -> H256 {
        match_forked!(self, state => state.tree_hash_root())
    }

    #[must_use]
    pub fn to_ssz(&self) -> Vec<u8> {
        match_forked!(self, state => state.as_ssz_bytes())
    }

    pub fn from_ssz(config: &Config, bytes: &[u8]) -> Result<Self, DecodeError> {
        let slot = read_slot(bytes, SLOT_OFFSET_IN_STATE)?;

        match config.phase_at_slot::<P>(slot) {
            Phase::Phase0 => Phase0BeaconState::from_ssz_bytes(bytes).map(Self::Phase0),
            Phase::Altair => AltairBeaconState::from_ssz_bytes(bytes).map(Self::Altair),
            Phase::Bellatrix => BellatrixBeaconState::from_ssz_bytes(bytes).map(Self::Bellatrix),
        }
    }
}

#[derive(Clone, PartialEq, Debug, From, Deserialize, Serialize)]
#[serde(bound = "", untagged)]
pub enum BeaconBlock<P: Preset> {
    Phase0(Phase0BeaconBlock<P>),
    Altair(AltairBeaconBlock<P>),
    Bellatrix(BellatrixBeaconBlock<P>),
}

impl<P: Preset> BeaconBlock<P> {
    #[must_use]
    pub const fn phase(&self) -> Phase {
        match self {
            Self::Phase0(_) => Phase::Phase0,
            Self::Altair(_) => Phase::Altair,
            Self::Bellatrix(_) => Phase::Bellatrix,
        }
    }

    #[must_use]
    pub fn slot(&self) -> Slot {
        match_forked!(self, block => block.slot)
    }

    #[must_use]
    pub fn proposer_index(&self) -> ValidatorIndex {
        match_forked!(self, block => block.proposer_index)
    }

    #[must_use]
    pub fn parent_root(&self) -> H256 {
        match_forked!(self, block => block.parent_root)
    }

    #[must_use]
    pub fn state_root(&self) -> H256 {
        match_forked!(self, block => block.state_root)
    }

    #[must_use]
    pub fn hash_tree_root(&self) -> H256 {
        match_forked!(self, block => block.tree_hash_root())
    }

    #[must_use]
    pub fn randao_reveal(&self) -> SignatureBytes {
        match_forked!(self, block => block.body.randao_reveal)
    }

    #[must_use]
    pub fn sync_aggregate(&self) -> Option<&SyncAggregate<P>> {
        match self {
            Self::Phase0(_) => None,
            Self::Altair(block) => Some(&block.body.sync_aggregate),
            Self::Bellatrix(block) => Some(&block.body.sync_aggregate),
        }
    }

    #[must_use]
    pub fn execution_block_hash(&self) -> Option<ExecutionBlockHash> {
        match self {
            Self::Phase0(_) | Self::Altair(_) => None,
            Self::Bellatrix(block) => Some(block.body.execution_payload.block_hash),
        }
    }

    #[must_use]
    pub fn to_header(&self) -> BeaconBlockHeader {
        let body_root = match_forked!(self, block => block.body.tree_hash_root());

        BeaconBlockHeader {
            slot: self.slot(),
            proposer_index: self.proposer_index(),
            parent_root: self.parent_root(),
            state_root: self.state_root(),
            body_root,
        }
    }

    #[must_use]
    pub fn with_signature(self, signature: SignatureBytes) -> SignedBeaconBlock<P> {
        match self {
            Self::Phase0(message) => Phase0SignedBeaconBlock { message, signature }.into(),
            Self::Altair(message) => AltairSignedBeaconBlock { message, signature }.into(),
            Self::Bellatrix(message) => BellatrixSignedBeaconBlock { message, signature }.into(),
        }
    }

    #[must_use]
    pub fn to_ssz(&self) -> Vec<u8> {
        match_forked!(self, block => block.as_ssz_bytes())
    }

    pub fn from_ssz(config: &Config, bytes: &[u8]) -> Result<Self, DecodeError> {
        let slot = read_slot(bytes, SLOT_OFFSET_IN_BLOCK)?;

        match config.phase_at_slot::<P>(slot) {
            Phase::Phase0 => Phase0BeaconBlock::from_ssz_bytes(bytes).map(Self::Phase0),
            Phase::Altair => AltairBeaconBlock::from_ssz_bytes(bytes).map(Self::Altair),
            Phase::Bellatrix => BellatrixBeaconBlock::from_ssz_bytes(bytes).map(Self::Bellatrix),
        }
    }
}

#[derive(Clone, PartialEq, Debug, From, Deserialize, Serialize)]
#[serde(bound = "", untagged)]
pub enum SignedBeaconBlock<P: Preset> {
    Phase0(Phase0SignedBeaconBlock<P>),
    Altair(AltairSignedBeaconBlock<P>),
    Bellatrix(BellatrixSignedBeaconBlock<P>),
}

impl<P: Preset> SignedBeaconBlock<P> {
    #[must_use]
    pub const fn phase(&self) -> Phase {
        match self {
            Self::Phase0(_) => Phase::Phase0,
            Self::Altair(_) => Phase::Altair,
            Self::Bellatrix(_) => Phase::Bellatrix,
        }
    }

    #[must_use]
    pub fn slot(&self) -> Slot {
        match_forked!(self, block => block.message.slot)
    }

    #[must_use]
    pub fn proposer_index(&self) -> ValidatorIndex {
        match_forked!(self, block => block.message.proposer_index)
    }

    #[must_use]
    pub fn parent_root(&self) -> H256 {
        match_forked!(self, block => block.message.parent_root)
    }

    #[must_use]
    pub fn state_root(&self) -> H256 {
        match_forked!(self, block => block.message.state_root)
    }

    #[must_use]
    pub fn signature(&self) -> SignatureBytes {
        match_forked!(self, block => block.signature)
    }

    /// Hash tree root of the block message, which is what block roots refer
    /// to everywhere in the protocol.
    #[must_use]
    pub fn block_root(&self) -> H256 {
        match_forked!(self, block => block.message.tree_hash_root())
    }

    #[must_use]
    pub fn execution_block_hash(&self) -> Option<ExecutionBlockHash> {
        self.message().execution_block_hash()
    }

    #[must_use]
    pub fn message(&self) -> BeaconBlock<P> {
        match self {
            Self::Phase0(block) => block.message.clone().into(),
            Self::Altair(block) => block.message.clone().into(),
            Self::Bellatrix(block) => block.message.clone().into(),
        }
    }

    #[must_use]
    pub fn to_ssz(&self) -> Vec<u8> {
        match_forked!(self, block => block.as_ssz_bytes())
    }

    pub fn from_ssz(config: &Config, bytes: &[u8]) -> Result<Self, DecodeError> {
        let slot = read_slot(bytes, SLOT_OFFSET_IN_SIGNED_BLOCK)?;

        match config.phase_at_slot::<P>(slot) {
            Phase::Phase0 => Phase0SignedBeaconBlock::from_ssz_bytes(bytes).map(Self::Phase0),
            Phase::Altair => AltairSignedBeaconBlock::from_ssz_bytes(bytes).map(Self::Altair),
            Phase::Bellatrix => {
                BellatrixSignedBeaconBlock::from_ssz_bytes(bytes).map(Self::Bellatrix)
            }
        }
    }
}

fn read_slot(bytes: &[u8], offset: usize) -> Result<Slot, DecodeError> {
    let end = offset + core::mem::size_of::<Slot>();

    let slot_bytes = bytes
        .get(offset..end)
        .ok_or(DecodeError::InvalidByteLength {
            len: bytes.len(),
            expected: end,
        })?;

    Ok(Slot::from_le_bytes(
        slot_bytes
            .try_into()
            .expect("the slice is exactly 8 bytes long"),
    ))
}

#[cfg(test)]
mod tests {
    use crate::preset::Mainnet;

    use super::*;

    #[test]
    fn signed_phase0_block_roundtrips_through_ssz() {
        let config = Config::mainnet();
        let block = SignedBeaconBlock::<Mainnet>::Phase0(Phase0SignedBeaconBlock::default());

        let decoded = SignedBeaconBlock::from_ssz(&config, &block.to_ssz())
            .expect("phase0 block bytes are valid");

        assert_eq!(decoded, block);
    }

    #[test]
    fn signed_altair_block_roundtrips_through_ssz() {
        let config = Config {
            altair_fork_epoch: 0,
            ..Config::mainnet()
        };

        let block = SignedBeaconBlock::<Mainnet>::Altair(AltairSignedBeaconBlock::default());

        let decoded = SignedBeaconBlock::from_ssz(&config, &block.to_ssz())
            .expect("altair block bytes are valid");

        assert_eq!(decoded, block);
    }

    #[test]
    fn decoding_dispatches_on_the_slot_in_the_block() {
        let config = Config {
            altair_fork_epoch: 1,
            ..Config::mainnet()
        };

        let mut message = AltairBeaconBlock::<Mainnet>::default();
        message.slot = Mainnet::SLOTS_PER_EPOCH.get();

        let block = SignedBeaconBlock::Altair(AltairSignedBeaconBlock {
            message,
            signature: SignatureBytes::empty(),
        });

        let decoded = SignedBeaconBlock::<Mainnet>::from_ssz(&config, &block.to_ssz())
            .expect("altair block bytes are valid");

        assert_eq!(decoded.phase(), Phase::Altair);
        assert_eq!(decoded.slot(), Mainnet::SLOTS_PER_EPOCH.get());
    }
}
