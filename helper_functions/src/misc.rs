use hashing::{hash_256, hash_256_64};
use types::{
    config::Config,
    phase0::{
        consts::{FAR_FUTURE_EPOCH, FAR_FUTURE_SLOT},
        containers::ForkData,
        primitives::{
            DomainType, Epoch, Gwei, Slot, SyncCommitteePeriod, ValidatorIndex, Version, H256,
        },
    },
    preset::Preset,
};

use crate::error::Error;

#[must_use]
pub fn compute_epoch_at_slot<P: Preset>(slot: Slot) -> Epoch {
    if slot == FAR_FUTURE_SLOT {
        return FAR_FUTURE_EPOCH;
    }

    slot / P::SLOTS_PER_EPOCH.get()
}

#[must_use]
pub fn compute_start_slot_at_epoch<P: Preset>(epoch: Epoch) -> Slot {
    epoch.saturating_mul(P::SLOTS_PER_EPOCH.get())
}

#[must_use]
pub fn is_epoch_start<P: Preset>(slot: Slot) -> bool {
    slot % P::SLOTS_PER_EPOCH.get() == 0
}

#[must_use]
pub fn compute_activation_exit_epoch<P: Preset>(epoch: Epoch) -> Epoch {
    epoch
        .saturating_add(1)
        .saturating_add(P::MAX_SEED_LOOKAHEAD)
}

#[must_use]
pub fn sync_committee_period_at_epoch<P: Preset>(epoch: Epoch) -> SyncCommitteePeriod {
    if epoch == FAR_FUTURE_EPOCH {
        return SyncCommitteePeriod::MAX;
    }

    epoch / P::EPOCHS_PER_SYNC_COMMITTEE_PERIOD.get()
}

#[must_use]
pub fn committees_per_slot<P: Preset>(active_validator_count: u64) -> u64 {
    (active_validator_count
        / P::SLOTS_PER_EPOCH.get()
        / P::TARGET_COMMITTEE_SIZE.get())
    .clamp(1, P::MAX_COMMITTEES_PER_SLOT.get())
}

/// `compute_domain` from the consensus specification.
///
/// The genesis validators root is mixed in so that domains differ between
/// networks even when fork versions collide.
#[must_use]
pub fn compute_domain(
    config: &Config,
    domain_type: DomainType,
    fork_version: Option<Version>,
    genesis_validators_root: Option<H256>,
) -> H256 {
    let fork_data = ForkData {
        current_version: fork_version.unwrap_or(config.genesis_fork_version),
        genesis_validators_root: genesis_validators_root.unwrap_or_else(H256::zero),
    };

    let fork_data_root = tree_hash::TreeHash::tree_hash_root(&fork_data);

    let mut domain = [0; 32];
    domain[..4].copy_from_slice(domain_type.as_bytes());
    domain[4..].copy_from_slice(&fork_data_root.as_bytes()[..28]);
    H256(domain)
}

#[must_use]
pub fn fork_version_at_epoch(config: &Config, epoch: Epoch) -> Version {
    config.fork_version(config.phase_at_epoch(epoch))
}

/// Weighted sampling of the proposer from the first `u64::MAX` candidates.
///
/// Candidates are drawn in shuffled order and accepted with probability
/// proportional to their effective balance.
pub fn compute_proposer_index<P: Preset>(
    effective_balances: impl Fn(ValidatorIndex) -> Option<Gwei>,
    indices: &[ValidatorIndex],
    seed: H256,
) -> Result<ValidatorIndex, Error> {
    if indices.is_empty() {
        return Err(Error::NoActiveValidators);
    }

    let total = indices.len() as u64;
    let max_random_byte = u64::from(u8::MAX);

    for attempt in 0_u64.. {
        let shuffled_position =
            shuffling::shuffled_index::<P>(attempt % total, total, seed);
        let candidate_index = indices[usize::try_from(shuffled_position)
            .expect("shuffled indices are bounded by the list length")];

        let random_source = hash_256_64(seed, attempt / 32);
        let random_byte = u64::from(
            random_source.as_bytes()[usize::try_from(attempt % 32)
                .expect("the remainder is less than 32")],
        );

        let effective_balance = effective_balances(candidate_index)
            .ok_or(Error::ValidatorIndexOutOfBounds {
                validator_index: candidate_index,
            })?;

        if effective_balance * max_random_byte >= P::MAX_EFFECTIVE_BALANCE * random_byte {
            return Ok(candidate_index);
        }
    }

    unreachable!("the acceptance probability is never zero for active validators")
}

/// The committee for `(slot, committee_index)` as positions into the shuffled
/// active validator set.
#[must_use]
pub fn compute_committee<P: Preset>(
    indices: &[ValidatorIndex],
    seed: H256,
    committee_index: u64,
    committee_count: u64,
) -> Vec<ValidatorIndex> {
    let total = indices.len() as u64;
    let start = total * committee_index / committee_count;
    let end = total * (committee_index + 1) / committee_count;

    (start..end)
        .map(|position| {
            let shuffled = shuffling::shuffled_index::<P>(position, total, seed);
            indices[usize::try_from(shuffled)
                .expect("shuffled indices are bounded by the list length")]
        })
        .collect()
}

#[must_use]
pub fn compute_subnet_for_attestation<P: Preset>(
    committees_per_slot: u64,
    slot: Slot,
    committee_index: u64,
    attestation_subnet_count: u64,
) -> u64 {
    let slots_since_epoch_start = slot % P::SLOTS_PER_EPOCH.get();
    let committees_since_epoch_start = committees_per_slot * slots_since_epoch_start;

    (committees_since_epoch_start + committee_index) % attestation_subnet_count
}

/// Floor of the square root, matching the `integer_squareroot` helper in the
/// consensus specification.
#[must_use]
pub const fn integer_squareroot(n: u64) -> u64 {
    let mut x = n;
    let mut y = x.div_ceil(2);

    while y < x {
        x = y;
        y = (x + n / x) / 2;
    }

    x
}

#[must_use]
pub fn hash_concatenation(first: H256, second: H256) -> H256 {
    let mut input = [0; 64];
    input[..32].copy_from_slice(first.as_bytes());
    input[32..].copy_from_slice(second.as_bytes());
    hash_256(input)
}

#[cfg(test)]
mod tests {
    use test_case::test_case;
    use types::preset::Mainnet;

    use super::*;

    #[test_case(0 => 0)]
    #[test_case(31 => 0)]
    #[test_case(32 => 1)]
    #[test_case(FAR_FUTURE_SLOT => FAR_FUTURE_EPOCH; "the far future slot maps to the far future epoch")]
    fn epoch_at_slot_with_mainnet_preset(slot: Slot) -> Epoch {
        compute_epoch_at_slot::<Mainnet>(slot)
    }

    #[test_case(0 => 0)]
    #[test_case(1 => 32)]
    #[test_case(FAR_FUTURE_EPOCH => FAR_FUTURE_SLOT; "the far future epoch maps to the far future slot")]
    fn start_slot_at_epoch_with_mainnet_preset(epoch: Epoch) -> Slot {
        compute_start_slot_at_epoch::<Mainnet>(epoch)
    }

    #[test_case(0 => true)]
    #[test_case(1 => false)]
    #[test_case(32 => true)]
    fn epoch_start_with_mainnet_preset(slot: Slot) -> bool {
        is_epoch_start::<Mainnet>(slot)
    }

    #[test_case(0 => 1; "too few validators for even one full committee")]
    #[test_case(1 << 20 => 64; "committee count is capped")]
    fn committees_per_slot_with_mainnet_preset(active_validator_count: u64) -> u64 {
        committees_per_slot::<Mainnet>(active_validator_count)
    }

    #[test_case(0 => 0)]
    #[test_case(1 => 1)]
    #[test_case(3 => 1)]
    #[test_case(4 => 2)]
    #[test_case(99 => 9)]
    #[test_case(u64::MAX => 4_294_967_295)]
    fn integer_squareroot_rounds_down(n: u64) -> u64 {
        integer_squareroot(n)
    }
}
