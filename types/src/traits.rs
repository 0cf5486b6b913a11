use duplicate::duplicate_item;
use ssz_types::{BitVector, FixedVector, VariableList};

use crate::{
    altair::{
        beacon_state::{BeaconState as AltairBeaconState, ParticipationFlags},
        containers::SyncCommittee,
    },
    bellatrix::beacon_state::BeaconState as BellatrixBeaconState,
    phase0::{
        beacon_state::BeaconState as Phase0BeaconState,
        consts::JustificationBitsLength,
        containers::{BeaconBlockHeader, Checkpoint, Eth1Data, Fork, Validator},
        primitives::{DepositIndex, Gwei, Slot, UnixSeconds, H256},
    },
    preset::Preset,
};

/// Fields present in the states of every fork.
///
/// Slot processing and most helper functions only touch these, which lets
/// them be written once instead of per fork.
pub trait BeaconState<P: Preset>: Send + Sync {
    fn genesis_time(&self) -> UnixSeconds;
    fn genesis_validators_root(&self) -> H256;
    fn slot(&self) -> Slot;
    fn slot_mut(&mut self) -> &mut Slot;
    fn fork(&self) -> Fork;
    fn fork_mut(&mut self) -> &mut Fork;

    fn latest_block_header(&self) -> BeaconBlockHeader;
    fn latest_block_header_mut(&mut self) -> &mut BeaconBlockHeader;
    fn block_roots(&self) -> &FixedVector<H256, P::SlotsPerHistoricalRoot>;
    fn block_roots_mut(&mut self) -> &mut FixedVector<H256, P::SlotsPerHistoricalRoot>;
    fn state_roots(&self) -> &FixedVector<H256, P::SlotsPerHistoricalRoot>;
    fn state_roots_mut(&mut self) -> &mut FixedVector<H256, P::SlotsPerHistoricalRoot>;
    fn historical_roots(&self) -> &VariableList<H256, P::HistoricalRootsLimit>;
    fn historical_roots_mut(&mut self) -> &mut VariableList<H256, P::HistoricalRootsLimit>;

    fn eth1_data(&self) -> Eth1Data;
    fn eth1_data_mut(&mut self) -> &mut Eth1Data;
    fn eth1_data_votes(&self) -> &VariableList<Eth1Data, P::SlotsPerEth1VotingPeriod>;
    fn eth1_data_votes_mut(&mut self) -> &mut VariableList<Eth1Data, P::SlotsPerEth1VotingPeriod>;
    fn eth1_deposit_index(&self) -> DepositIndex;
    fn eth1_deposit_index_mut(&mut self) -> &mut DepositIndex;

    fn validators(&self) -> &VariableList<Validator, P::ValidatorRegistryLimit>;
    fn validators_mut(&mut self) -> &mut VariableList<Validator, P::ValidatorRegistryLimit>;
    fn balances(&self) -> &VariableList<Gwei, P::ValidatorRegistryLimit>;
    fn balances_mut(&mut self) -> &mut VariableList<Gwei, P::ValidatorRegistryLimit>;

    fn randao_mixes(&self) -> &FixedVector<H256, P::EpochsPerHistoricalVector>;
    fn randao_mixes_mut(&mut self) -> &mut FixedVector<H256, P::EpochsPerHistoricalVector>;
    fn slashings(&self) -> &FixedVector<Gwei, P::EpochsPerSlashingsVector>;
    fn slashings_mut(&mut self) -> &mut FixedVector<Gwei, P::EpochsPerSlashingsVector>;

    fn justification_bits(&self) -> &BitVector<JustificationBitsLength>;
    fn justification_bits_mut(&mut self) -> &mut BitVector<JustificationBitsLength>;
    fn previous_justified_checkpoint(&self) -> Checkpoint;
    fn previous_justified_checkpoint_mut(&mut self) -> &mut Checkpoint;
    fn current_justified_checkpoint(&self) -> Checkpoint;
    fn current_justified_checkpoint_mut(&mut self) -> &mut Checkpoint;
    fn finalized_checkpoint(&self) -> Checkpoint;
    fn finalized_checkpoint_mut(&mut self) -> &mut Checkpoint;
}

#[duplicate_item(
    implementor;
    [Phase0BeaconState];
    [AltairBeaconState];
    [BellatrixBeaconState];
)]
impl<P: Preset> BeaconState<P> for implementor<P> {
    fn genesis_time(&self) -> UnixSeconds {
        self.genesis_time
    }

    fn genesis_validators_root(&self) -> H256 {
        self.genesis_validators_root
    }

    fn slot(&self) -> Slot {
        self.slot
    }

    fn slot_mut(&mut self) -> &mut Slot {
        &mut self.slot
    }

    fn fork(&self) -> Fork {
        self.fork
    }

    fn fork_mut(&mut self) -> &mut Fork {
        &mut self.fork
    }

    fn latest_block_header(&self) -> BeaconBlockHeader {
        self.latest_block_header
    }

    fn latest_block_header_mut(&mut self) -> &mut BeaconBlockHeader {
        &mut self.latest_block_header
    }

    fn block_roots(&self) -> &FixedVector<H256, P::SlotsPerHistoricalRoot> {
        &self.block_roots
    }

    fn block_roots_mut(&mut self) -> &mut FixedVector<H256, P::SlotsPerHistoricalRoot> {
        &mut self.block_roots
    }

    fn state_roots(&self) -> &FixedVector<H256, P::SlotsPerHistoricalRoot> {
        &self.state_roots
    }

    fn state_roots_mut(&mut self) -> &mut FixedVector<H256, P::SlotsPerHistoricalRoot> {
        &mut self.state_roots
    }

    fn historical_roots(&self) -> &VariableList<H256, P::HistoricalRootsLimit> {
        &self.historical_roots
    }

    fn historical_roots_mut(&mut self) -> &mut VariableList<H256, P::HistoricalRootsLimit> {
        &mut self.historical_roots
    }

    fn eth1_data(&self) -> Eth1Data {
        self.eth1_data
    }

    fn eth1_data_mut(&mut self) -> &mut Eth1Data {
        &mut self.eth1_data
    }

    fn eth1_data_votes(&self) -> &VariableList<Eth1Data, P::SlotsPerEth1VotingPeriod> {
        &self.eth1_data_votes
    }

    fn eth1_data_votes_mut(
        &mut self,
    ) -> &mut VariableList<Eth1Data, P::SlotsPerEth1VotingPeriod> {
        &mut self.eth1_data_votes
    }

    fn eth1_deposit_index(&self) -> DepositIndex {
        self.eth1_deposit_index
    }

    fn eth1_deposit_index_mut(&mut self) -> &mut DepositIndex {
        &mut self.eth1_deposit_index
    }

    fn validators(&self) -> &VariableList<Validator, P::ValidatorRegistryLimit> {
        &self.validators
    }

    fn validators_mut(&mut self) -> &mut VariableList<Validator, P::ValidatorRegistryLimit> {
        &mut self.validators
    }

    fn balances(&self) -> &VariableList<Gwei, P::ValidatorRegistryLimit> {
        &self.balances
    }

    fn balances_mut(&mut self) -> &mut VariableList<Gwei, P::ValidatorRegistryLimit> {
        &mut self.balances
    }

    fn randao_mixes(&self) -> &FixedVector<H256, P::EpochsPerHistoricalVector> {
        &self.randao_mixes
    }

    fn randao_mixes_mut(&mut self) -> &mut FixedVector<H256, P::EpochsPerHistoricalVector> {
        &mut self.randao_mixes
    }

    fn slashings(&self) -> &FixedVector<Gwei, P::EpochsPerSlashingsVector> {
        &self.slashings
    }

    fn slashings_mut(&mut self) -> &mut FixedVector<Gwei, P::EpochsPerSlashingsVector> {
        &mut self.slashings
    }

    fn justification_bits(&self) -> &BitVector<JustificationBitsLength> {
        &self.justification_bits
    }

    fn justification_bits_mut(&mut self) -> &mut BitVector<JustificationBitsLength> {
        &mut self.justification_bits
    }

    fn previous_justified_checkpoint(&self) -> Checkpoint {
        self.previous_justified_checkpoint
    }

    fn previous_justified_checkpoint_mut(&mut self) -> &mut Checkpoint {
        &mut self.previous_justified_checkpoint
    }

    fn current_justified_checkpoint(&self) -> Checkpoint {
        self.current_justified_checkpoint
    }

    fn current_justified_checkpoint_mut(&mut self) -> &mut Checkpoint {
        &mut self.current_justified_checkpoint
    }

    fn finalized_checkpoint(&self) -> Checkpoint {
        self.finalized_checkpoint
    }

    fn finalized_checkpoint_mut(&mut self) -> &mut Checkpoint {
        &mut self.finalized_checkpoint
    }
}

/// Fields added in the altair fork and carried by every later one.
pub trait PostAltairBeaconState<P: Preset>: BeaconState<P> {
    fn previous_epoch_participation(
        &self,
    ) -> &VariableList<ParticipationFlags, P::ValidatorRegistryLimit>;
    fn previous_epoch_participation_mut(
        &mut self,
    ) -> &mut VariableList<ParticipationFlags, P::ValidatorRegistryLimit>;
    fn current_epoch_participation(
        &self,
    ) -> &VariableList<ParticipationFlags, P::ValidatorRegistryLimit>;
    fn current_epoch_participation_mut(
        &mut self,
    ) -> &mut VariableList<ParticipationFlags, P::ValidatorRegistryLimit>;

    fn inactivity_scores(&self) -> &VariableList<u64, P::ValidatorRegistryLimit>;
    fn inactivity_scores_mut(&mut self) -> &mut VariableList<u64, P::ValidatorRegistryLimit>;

    fn current_sync_committee(&self) -> &SyncCommittee<P>;
    fn current_sync_committee_mut(&mut self) -> &mut SyncCommittee<P>;
    fn next_sync_committee(&self) -> &SyncCommittee<P>;
    fn next_sync_committee_mut(&mut self) -> &mut SyncCommittee<P>;
}

#[duplicate_item(
    implementor;
    [AltairBeaconState];
    [BellatrixBeaconState];
)]
impl<P: Preset> PostAltairBeaconState<P> for implementor<P> {
    fn previous_epoch_participation(
        &self,
    ) -> &VariableList<ParticipationFlags, P::ValidatorRegistryLimit> {
        &self.previous_epoch_participation
    }

    fn previous_epoch_participation_mut(
        &mut self,
    ) -> &mut VariableList<ParticipationFlags, P::ValidatorRegistryLimit> {
        &mut self.previous_epoch_participation
    }

    fn current_epoch_participation(
        &self,
    ) -> &VariableList<ParticipationFlags, P::ValidatorRegistryLimit> {
        &self.current_epoch_participation
    }

    fn current_epoch_participation_mut(
        &mut self,
    ) -> &mut VariableList<ParticipationFlags, P::ValidatorRegistryLimit> {
        &mut self.current_epoch_participation
    }

    fn inactivity_scores(&self) -> &VariableList<u64, P::ValidatorRegistryLimit> {
        &self.inactivity_scores
    }

    fn inactivity_scores_mut(&mut self) -> &mut VariableList<u64, P::ValidatorRegistryLimit> {
        &mut self.inactivity_scores
    }

    fn current_sync_committee(&self) -> &SyncCommittee<P> {
        &self.current_sync_committee
    }

    fn current_sync_committee_mut(&mut self) -> &mut SyncCommittee<P> {
        &mut self.current_sync_committee
    }

    fn next_sync_committee(&self) -> &SyncCommittee<P> {
        &self.next_sync_committee
    }

    fn next_sync_committee_mut(&mut self) -> &mut SyncCommittee<P> {
        &mut self.next_sync_committee
    }
}
