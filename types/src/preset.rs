use core::{fmt::Debug, hash::Hash, num::NonZeroU64};

use nonzero_ext::nonzero;
use serde::{Deserialize, Serialize};
use typenum::{
    Unsigned, U1024, U1048576, U1073741824, U1099511627776, U128, U16, U16777216, U2, U2048, U256,
    U32, U4096, U512, U64, U65536, U8, U8192,
};

use crate::phase0::primitives::Gwei;

/// Compile-time constants that differ between the mainnet and minimal
/// configurations.
///
/// List and vector lengths are associated [`typenum`] types so containers can
/// be checked at the type level. Everything else is an associated constant.
pub trait Preset:
    'static + Copy + Clone + Default + Debug + PartialEq + Eq + Hash + Send + Sync
{
    type EpochsPerHistoricalVector: Unsigned + Clone + Sync + Send + Debug + PartialEq + Eq + Hash;
    type EpochsPerSlashingsVector: Unsigned + Clone + Sync + Send + Debug + PartialEq + Eq + Hash;
    type HistoricalRootsLimit: Unsigned + Clone + Sync + Send + Debug + PartialEq + Eq + Hash;
    type MaxAttestations: Unsigned + Clone + Sync + Send + Debug + PartialEq + Eq + Hash;
    type MaxAttestationsPerEpoch: Unsigned + Clone + Sync + Send + Debug + PartialEq + Eq + Hash;
    type MaxAttesterSlashings: Unsigned + Clone + Sync + Send + Debug + PartialEq + Eq + Hash;
    type MaxBytesPerTransaction: Unsigned + Clone + Sync + Send + Debug + PartialEq + Eq + Hash;
    type MaxDeposits: Unsigned + Clone + Sync + Send + Debug + PartialEq + Eq + Hash;
    type MaxExtraDataBytes: Unsigned + Clone + Sync + Send + Debug + PartialEq + Eq + Hash;
    type MaxProposerSlashings: Unsigned + Clone + Sync + Send + Debug + PartialEq + Eq + Hash;
    type MaxTransactionsPerPayload: Unsigned + Clone + Sync + Send + Debug + PartialEq + Eq + Hash;
    type MaxValidatorsPerCommittee: Unsigned + Clone + Sync + Send + Debug + PartialEq + Eq + Hash;
    type MaxVoluntaryExits: Unsigned + Clone + Sync + Send + Debug + PartialEq + Eq + Hash;
    type BytesPerLogsBloom: Unsigned + Clone + Sync + Send + Debug + PartialEq + Eq + Hash;
    type SlotsPerEth1VotingPeriod: Unsigned + Clone + Sync + Send + Debug + PartialEq + Eq + Hash;
    type SlotsPerHistoricalRoot: Unsigned + Clone + Sync + Send + Debug + PartialEq + Eq + Hash;
    type SyncCommitteeSize: Unsigned + Clone + Sync + Send + Debug + PartialEq + Eq + Hash;
    type SyncSubcommitteeSize: Unsigned + Clone + Sync + Send + Debug + PartialEq + Eq + Hash;
    type ValidatorRegistryLimit: Unsigned + Clone + Sync + Send + Debug + PartialEq + Eq + Hash;

    const SLOTS_PER_EPOCH: NonZeroU64;
    const EPOCHS_PER_SYNC_COMMITTEE_PERIOD: NonZeroU64;
    const SHUFFLE_ROUND_COUNT: u8;

    const MAX_COMMITTEES_PER_SLOT: NonZeroU64;
    const TARGET_COMMITTEE_SIZE: NonZeroU64;
    const TARGET_AGGREGATORS_PER_COMMITTEE: NonZeroU64;

    const MIN_ATTESTATION_INCLUSION_DELAY: NonZeroU64;
    const MIN_SEED_LOOKAHEAD: u64;
    const MAX_SEED_LOOKAHEAD: u64;
    const MIN_EPOCHS_TO_INACTIVITY_PENALTY: u64;

    const MAX_EFFECTIVE_BALANCE: Gwei;
    const EFFECTIVE_BALANCE_INCREMENT: NonZeroU64;
    const MIN_DEPOSIT_AMOUNT: Gwei;
    const HYSTERESIS_QUOTIENT: NonZeroU64;
    const HYSTERESIS_DOWNWARD_MULTIPLIER: u64;
    const HYSTERESIS_UPWARD_MULTIPLIER: u64;

    const BASE_REWARD_FACTOR: NonZeroU64;
    const PROPOSER_REWARD_QUOTIENT: NonZeroU64;
    const WHISTLEBLOWER_REWARD_QUOTIENT: NonZeroU64;
    const INACTIVITY_PENALTY_QUOTIENT: NonZeroU64;
    const MIN_SLASHING_PENALTY_QUOTIENT: NonZeroU64;
    const PROPORTIONAL_SLASHING_MULTIPLIER: u64;

    const SYNC_COMMITTEE_SUBNET_COUNT: NonZeroU64;

    #[must_use]
    fn slots_per_historical_root() -> u64 {
        Self::SlotsPerHistoricalRoot::U64
    }

    #[must_use]
    fn epochs_per_historical_vector() -> u64 {
        Self::EpochsPerHistoricalVector::U64
    }

    #[must_use]
    fn epochs_per_slashings_vector() -> u64 {
        Self::EpochsPerSlashingsVector::U64
    }

    #[must_use]
    fn sync_committee_size() -> u64 {
        Self::SyncCommitteeSize::U64
    }
}

#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Debug)]
pub struct Mainnet;

impl Preset for Mainnet {
    type EpochsPerHistoricalVector = U65536;
    type EpochsPerSlashingsVector = U8192;
    type HistoricalRootsLimit = U16777216;
    type MaxAttestations = U128;
    type MaxAttestationsPerEpoch = U4096;
    type MaxAttesterSlashings = U2;
    type MaxBytesPerTransaction = U1073741824;
    type MaxDeposits = U16;
    type MaxExtraDataBytes = U32;
    type MaxProposerSlashings = U16;
    type MaxTransactionsPerPayload = U1048576;
    type MaxValidatorsPerCommittee = U2048;
    type MaxVoluntaryExits = U16;
    type BytesPerLogsBloom = U256;
    type SlotsPerEth1VotingPeriod = U2048;
    type SlotsPerHistoricalRoot = U8192;
    type SyncCommitteeSize = U512;
    type SyncSubcommitteeSize = U128;
    type ValidatorRegistryLimit = U1099511627776;

    const SLOTS_PER_EPOCH: NonZeroU64 = nonzero!(32_u64);
    const EPOCHS_PER_SYNC_COMMITTEE_PERIOD: NonZeroU64 = nonzero!(256_u64);
    const SHUFFLE_ROUND_COUNT: u8 = 90;

    const MAX_COMMITTEES_PER_SLOT: NonZeroU64 = nonzero!(64_u64);
    const TARGET_COMMITTEE_SIZE: NonZeroU64 = nonzero!(128_u64);
    const TARGET_AGGREGATORS_PER_COMMITTEE: NonZeroU64 = nonzero!(16_u64);

    const MIN_ATTESTATION_INCLUSION_DELAY: NonZeroU64 = nonzero!(1_u64);
    const MIN_SEED_LOOKAHEAD: u64 = 1;
    const MAX_SEED_LOOKAHEAD: u64 = 4;
    const MIN_EPOCHS_TO_INACTIVITY_PENALTY: u64 = 4;

    const MAX_EFFECTIVE_BALANCE: Gwei = 32_000_000_000;
    const EFFECTIVE_BALANCE_INCREMENT: NonZeroU64 = nonzero!(1_000_000_000_u64);
    const MIN_DEPOSIT_AMOUNT: Gwei = 1_000_000_000;
    const HYSTERESIS_QUOTIENT: NonZeroU64 = nonzero!(4_u64);
    const HYSTERESIS_DOWNWARD_MULTIPLIER: u64 = 1;
    const HYSTERESIS_UPWARD_MULTIPLIER: u64 = 5;

    const BASE_REWARD_FACTOR: NonZeroU64 = nonzero!(64_u64);
    const PROPOSER_REWARD_QUOTIENT: NonZeroU64 = nonzero!(8_u64);
    const WHISTLEBLOWER_REWARD_QUOTIENT: NonZeroU64 = nonzero!(512_u64);
    const INACTIVITY_PENALTY_QUOTIENT: NonZeroU64 = nonzero!(67_108_864_u64);
    const MIN_SLASHING_PENALTY_QUOTIENT: NonZeroU64 = nonzero!(128_u64);
    const PROPORTIONAL_SLASHING_MULTIPLIER: u64 = 1;

    const SYNC_COMMITTEE_SUBNET_COUNT: NonZeroU64 = nonzero!(4_u64);
}

#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Debug)]
pub struct Minimal;

impl Preset for Minimal {
    type EpochsPerHistoricalVector = U64;
    type EpochsPerSlashingsVector = U64;
    type HistoricalRootsLimit = U16777216;
    type MaxAttestations = U128;
    type MaxAttestationsPerEpoch = U1024;
    type MaxAttesterSlashings = U2;
    type MaxBytesPerTransaction = U1073741824;
    type MaxDeposits = U16;
    type MaxExtraDataBytes = U32;
    type MaxProposerSlashings = U16;
    type MaxTransactionsPerPayload = U1048576;
    type MaxValidatorsPerCommittee = U2048;
    type MaxVoluntaryExits = U16;
    type BytesPerLogsBloom = U256;
    type SlotsPerEth1VotingPeriod = U32;
    type SlotsPerHistoricalRoot = U64;
    type SyncCommitteeSize = U32;
    type SyncSubcommitteeSize = U8;
    type ValidatorRegistryLimit = U1099511627776;

    const SLOTS_PER_EPOCH: NonZeroU64 = nonzero!(8_u64);
    const EPOCHS_PER_SYNC_COMMITTEE_PERIOD: NonZeroU64 = nonzero!(8_u64);
    const SHUFFLE_ROUND_COUNT: u8 = 10;

    const MAX_COMMITTEES_PER_SLOT: NonZeroU64 = nonzero!(4_u64);
    const TARGET_COMMITTEE_SIZE: NonZeroU64 = nonzero!(4_u64);
    const TARGET_AGGREGATORS_PER_COMMITTEE: NonZeroU64 = nonzero!(16_u64);

    const MIN_ATTESTATION_INCLUSION_DELAY: NonZeroU64 = nonzero!(1_u64);
    const MIN_SEED_LOOKAHEAD: u64 = 1;
    const MAX_SEED_LOOKAHEAD: u64 = 4;
    const MIN_EPOCHS_TO_INACTIVITY_PENALTY: u64 = 4;

    const MAX_EFFECTIVE_BALANCE: Gwei = 32_000_000_000;
    const EFFECTIVE_BALANCE_INCREMENT: NonZeroU64 = nonzero!(1_000_000_000_u64);
    const MIN_DEPOSIT_AMOUNT: Gwei = 1_000_000_000;
    const HYSTERESIS_QUOTIENT: NonZeroU64 = nonzero!(4_u64);
    const HYSTERESIS_DOWNWARD_MULTIPLIER: u64 = 1;
    const HYSTERESIS_UPWARD_MULTIPLIER: u64 = 5;

    const BASE_REWARD_FACTOR: NonZeroU64 = nonzero!(64_u64);
    const PROPOSER_REWARD_QUOTIENT: NonZeroU64 = nonzero!(8_u64);
    const WHISTLEBLOWER_REWARD_QUOTIENT: NonZeroU64 = nonzero!(512_u64);
    const INACTIVITY_PENALTY_QUOTIENT: NonZeroU64 = nonzero!(33_554_432_u64);
    const MIN_SLASHING_PENALTY_QUOTIENT: NonZeroU64 = nonzero!(64_u64);
    const PROPORTIONAL_SLASHING_MULTIPLIER: u64 = 2;

    const SYNC_COMMITTEE_SUBNET_COUNT: NonZeroU64 = nonzero!(4_u64);
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PresetName {
    #[default]
    Mainnet,
    Minimal,
}
