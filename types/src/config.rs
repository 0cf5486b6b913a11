use core::num::NonZeroU64;
use std::borrow::Cow;

use hex_literal::hex;
use nonzero_ext::nonzero;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tree_hash::TreeHash as _;

use crate::{
    nonstandard::Phase,
    phase0::{
        consts::{FAR_FUTURE_EPOCH, GENESIS_EPOCH},
        containers::ForkData,
        primitives::{
            DomainType, Epoch, ForkDigest, Slot, SyncCommitteePeriod, UnixSeconds, Version, H256,
            H32,
        },
    },
    preset::{Preset, PresetName},
};

/// Configuration variables customizable at runtime.
///
/// Immutable after startup and passed as an explicit value through all layers.
/// The `*_fork_epoch` fields use [`FAR_FUTURE_EPOCH`] to disable a fork.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Config {
    // Meta
    pub config_name: Cow<'static, str>,
    pub preset_base: PresetName,

    // Genesis
    #[serde(with = "ethereum_serde_utils::quoted_u64")]
    pub genesis_delay: u64,
    pub genesis_fork_version: Version,
    #[serde(with = "ethereum_serde_utils::quoted_u64")]
    pub min_genesis_time: UnixSeconds,

    // Forking
    #[serde(with = "ethereum_serde_utils::quoted_u64")]
    pub altair_fork_epoch: Epoch,
    pub altair_fork_version: Version,
    #[serde(with = "ethereum_serde_utils::quoted_u64")]
    pub bellatrix_fork_epoch: Epoch,
    pub bellatrix_fork_version: Version,

    // Time parameters
    pub seconds_per_slot: NonZeroU64,

    // Validator cycle
    pub churn_limit_quotient: NonZeroU64,
    #[serde(with = "ethereum_serde_utils::quoted_u64")]
    pub ejection_balance: u64,
    #[serde(with = "ethereum_serde_utils::quoted_u64")]
    pub min_per_epoch_churn_limit: u64,
    #[serde(with = "ethereum_serde_utils::quoted_u64")]
    pub min_validator_withdrawability_delay: u64,
    #[serde(with = "ethereum_serde_utils::quoted_u64")]
    pub shard_committee_period: u64,
    pub inactivity_score_bias: NonZeroU64,
    #[serde(with = "ethereum_serde_utils::quoted_u64")]
    pub inactivity_score_recovery_rate: u64,

    // Networking
    #[serde(with = "ethereum_serde_utils::quoted_u64")]
    pub gossip_max_size: u64,
    #[serde(with = "ethereum_serde_utils::quoted_u64")]
    pub max_chunk_size: u64,
    #[serde(with = "ethereum_serde_utils::quoted_u64")]
    pub max_request_blocks: u64,
    pub message_domain_invalid_snappy: DomainType,
    pub message_domain_valid_snappy: DomainType,
    #[serde(with = "ethereum_serde_utils::quoted_u64")]
    pub attestation_subnet_count: u64,
    #[serde(with = "ethereum_serde_utils::quoted_u64")]
    pub resp_timeout: u64,
    #[serde(with = "ethereum_serde_utils::quoted_u64")]
    pub ttfb_timeout: u64,
    #[serde(with = "ethereum_serde_utils::quoted_u64")]
    pub min_epochs_for_block_requests: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self::mainnet()
    }
}

impl Config {
    #[must_use]
    pub fn mainnet() -> Self {
        Self {
            config_name: Cow::Borrowed("mainnet"),
            preset_base: PresetName::Mainnet,

            genesis_delay: 604_800,
            genesis_fork_version: H32(hex!("00000000")),
            min_genesis_time: 1_606_824_000,

            altair_fork_epoch: 74_240,
            altair_fork_version: H32(hex!("01000000")),
            bellatrix_fork_epoch: 144_896,
            bellatrix_fork_version: H32(hex!("02000000")),

            seconds_per_slot: nonzero!(12_u64),

            churn_limit_quotient: nonzero!(65_536_u64),
            ejection_balance: 16_000_000_000,
            min_per_epoch_churn_limit: 4,
            min_validator_withdrawability_delay: 256,
            shard_committee_period: 256,
            inactivity_score_bias: nonzero!(4_u64),
            inactivity_score_recovery_rate: 16,

            gossip_max_size: 10_485_760,
            max_chunk_size: 10_485_760,
            max_request_blocks: 1024,
            message_domain_invalid_snappy: H32(hex!("00000000")),
            message_domain_valid_snappy: H32(hex!("01000000")),
            attestation_subnet_count: 64,
            resp_timeout: 10,
            ttfb_timeout: 5,
            min_epochs_for_block_requests: 33_024,
        }
    }

    #[must_use]
    pub fn minimal() -> Self {
        Self {
            config_name: Cow::Borrowed("minimal"),
            preset_base: PresetName::Minimal,

            genesis_delay: 300,
            genesis_fork_version: H32(hex!("00000001")),
            min_genesis_time: 1_578_009_600,

            altair_fork_epoch: FAR_FUTURE_EPOCH,
            altair_fork_version: H32(hex!("01000001")),
            bellatrix_fork_epoch: FAR_FUTURE_EPOCH,
            bellatrix_fork_version: H32(hex!("02000001")),

            seconds_per_slot: nonzero!(6_u64),

            min_epochs_for_block_requests: 272,
            ..Self::mainnet()
        }
    }

    /// Mainnet config with all forks enabled from genesis, for local testnets
    /// and tests.
    #[must_use]
    pub fn mainnet_all_forks() -> Self {
        Self {
            config_name: Cow::Borrowed("mainnet-all-forks"),
            altair_fork_epoch: GENESIS_EPOCH,
            bellatrix_fork_epoch: GENESIS_EPOCH,
            ..Self::mainnet()
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.altair_fork_epoch > self.bellatrix_fork_epoch {
            return Err(Error::ForkEpochsNotOrdered {
                earlier_phase: Phase::Altair,
                later_phase: Phase::Bellatrix,
            });
        }

        Ok(())
    }

    #[must_use]
    pub fn fork_epoch(&self, phase: Phase) -> Epoch {
        match phase {
            Phase::Phase0 => GENESIS_EPOCH,
            Phase::Altair => self.altair_fork_epoch,
            Phase::Bellatrix => self.bellatrix_fork_epoch,
        }
    }

    #[must_use]
    pub fn fork_version(&self, phase: Phase) -> Version {
        match phase {
            Phase::Phase0 => self.genesis_fork_version,
            Phase::Altair => self.altair_fork_version,
            Phase::Bellatrix => self.bellatrix_fork_version,
        }
    }

    #[must_use]
    pub fn phase_at_epoch(&self, epoch: Epoch) -> Phase {
        enum_iterator::reverse_all::<Phase>()
            .find(|phase| self.fork_epoch(*phase) <= epoch)
            .unwrap_or(Phase::Phase0)
    }

    #[must_use]
    pub fn phase_at_slot<P: Preset>(&self, slot: Slot) -> Phase {
        self.phase_at_epoch(slot / P::SLOTS_PER_EPOCH.get())
    }

    #[must_use]
    pub fn fork_digest(&self, phase: Phase, genesis_validators_root: H256) -> ForkDigest {
        let fork_data_root = ForkData {
            current_version: self.fork_version(phase),
            genesis_validators_root,
        }
        .tree_hash_root();

        ForkDigest::from_slice(&fork_data_root.as_bytes()[..ForkDigest::len_bytes()])
    }

    #[must_use]
    pub fn slot_duration(&self) -> core::time::Duration {
        core::time::Duration::from_secs(self.seconds_per_slot.get())
    }

    #[must_use]
    pub fn sync_committee_period_at_epoch<P: Preset>(epoch: Epoch) -> SyncCommitteePeriod {
        if epoch == FAR_FUTURE_EPOCH {
            return SyncCommitteePeriod::MAX;
        }

        epoch / P::EPOCHS_PER_SYNC_COMMITTEE_PERIOD.get()
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("{earlier_phase:?} fork epoch is later than {later_phase:?} fork epoch")]
    ForkEpochsNotOrdered {
        earlier_phase: Phase,
        later_phase: Phase,
    },
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use crate::preset::Mainnet;

    use super::*;

    #[test]
    fn predefined_configs_are_valid() {
        Config::mainnet().validate().expect("mainnet is valid");
        Config::minimal().validate().expect("minimal is valid");
    }

    #[test_case(0 => Phase::Phase0)]
    #[test_case(74_239 => Phase::Phase0)]
    #[test_case(74_240 => Phase::Altair)]
    #[test_case(144_895 => Phase::Altair)]
    #[test_case(144_896 => Phase::Bellatrix)]
    #[test_case(FAR_FUTURE_EPOCH => Phase::Bellatrix)]
    fn mainnet_phase_at_epoch(epoch: Epoch) -> Phase {
        Config::mainnet().phase_at_epoch(epoch)
    }

    #[test]
    fn phase_at_slot_uses_epoch_boundaries() {
        let config = Config::mainnet();
        let first_altair_slot = 74_240 * Mainnet::SLOTS_PER_EPOCH.get();

        assert_eq!(
            config.phase_at_slot::<Mainnet>(first_altair_slot - 1),
            Phase::Phase0,
        );
        assert_eq!(
            config.phase_at_slot::<Mainnet>(first_altair_slot),
            Phase::Altair,
        );
    }
}
