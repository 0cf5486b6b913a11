use helper_functions::{misc, signing};
use types::{
    combined::{BeaconState, SignedBeaconBlock},
    config::Config,
    phase0::{consts::DOMAIN_BEACON_PROPOSER, primitives::Slot},
    preset::Preset,
};

use crate::{altair, bellatrix, error::Error, phase0, unphased};

/// Which signatures to verify during a transition.
///
/// Blocks arriving over gossip get full verification. Blocks that were
/// already verified once are trusted and skipped on replay.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SignatureStrategy {
    VerifyAll,
    VerifyProposerOnly,
    Skip,
}

impl SignatureStrategy {
    const fn verify_proposer(self) -> bool {
        matches!(self, Self::VerifyAll | Self::VerifyProposerOnly)
    }

    const fn verify_operations(self) -> bool {
        matches!(self, Self::VerifyAll)
    }
}

/// Whether to check the post-state root against the one in the block.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum StateRootPolicy {
    Verify,
    Trust,
}

/// Advances the state through empty slots.
///
/// Fork upgrades happen at the epoch boundaries the chain config names.
pub fn process_slots<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
    target_slot: Slot,
) -> Result<(), Error> {
    if target_slot <= state.slot() {
        return Err(Error::SlotInPast {
            state_slot: state.slot(),
            target_slot,
        });
    }

    loop {
        upgrade_if_scheduled(config, state)?;

        if state.slot() >= target_slot {
            break;
        }

        let next_upgrade_slot = next_fork_upgrade_slot(config, state);
        let stop_slot = next_upgrade_slot
            .filter(|upgrade_slot| *upgrade_slot <= target_slot)
            .unwrap_or(target_slot);

        match state {
            BeaconState::Phase0(state) => phase0::process_slots(config, state, stop_slot)?,
            BeaconState::Altair(state) => altair::process_slots(config, state, stop_slot)?,
            BeaconState::Bellatrix(state) => {
                bellatrix::process_slots(config, state, stop_slot)?;
            }
        }
    }

    Ok(())
}

fn next_fork_upgrade_slot<P: Preset>(config: &Config, state: &BeaconState<P>) -> Option<Slot> {
    let upgrade_epoch = match state {
        BeaconState::Phase0(_) => config.altair_fork_epoch,
        BeaconState::Altair(_) => config.bellatrix_fork_epoch,
        BeaconState::Bellatrix(_) => return None,
    };

    upgrade_epoch
        .checked_mul(P::SLOTS_PER_EPOCH.get())
        .filter(|upgrade_slot| *upgrade_slot > state.slot())
}

fn upgrade_if_scheduled<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
) -> Result<(), Error> {
    let epoch = state.slot() / P::SLOTS_PER_EPOCH.get();

    loop {
        match state {
            BeaconState::Phase0(phase0_state) if config.altair_fork_epoch == epoch => {
                let upgraded = altair::upgrade_state(config, phase0_state.clone())?;
                *state = BeaconState::Altair(upgraded);
            }
            BeaconState::Altair(altair_state) if config.bellatrix_fork_epoch == epoch => {
                let upgraded = bellatrix::upgrade_state(config, altair_state.clone());
                *state = BeaconState::Bellatrix(upgraded);
            }
            _ => break,
        }
    }

    Ok(())
}

/// The full state transition: empty slots, the block itself, and the
/// post-state root check.
pub fn state_transition<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
    block: &SignedBeaconBlock<P>,
    signature_strategy: SignatureStrategy,
    state_root_policy: StateRootPolicy,
) -> Result<(), Error> {
    if block.slot() > state.slot() {
        process_slots(config, state, block.slot())?;
    }

    if signature_strategy.verify_proposer() {
        verify_block_signature(config, state, block)?;
    }

    process_block(
        config,
        state,
        block,
        signature_strategy.verify_operations(),
    )?;

    if matches!(state_root_policy, StateRootPolicy::Verify) {
        let computed = state.hash_tree_root();
        let in_block = block.state_root();

        if computed != in_block {
            return Err(Error::StateRootMismatch { computed, in_block });
        }
    }

    Ok(())
}

fn process_block<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
    block: &SignedBeaconBlock<P>,
    verify_signatures: bool,
) -> Result<(), Error> {
    match (state, block) {
        (BeaconState::Phase0(state), SignedBeaconBlock::Phase0(block)) => {
            phase0::process_block(config, state, &block.message, verify_signatures)
        }
        (BeaconState::Altair(state), SignedBeaconBlock::Altair(block)) => {
            altair::process_block(config, state, &block.message, verify_signatures)
        }
        (BeaconState::Bellatrix(state), SignedBeaconBlock::Bellatrix(block)) => {
            bellatrix::process_block(config, state, &block.message, verify_signatures)
        }
        (state, block) => Err(Error::PhaseMismatch {
            block_phase: block.phase(),
            state_phase: state.phase(),
        }),
    }
}

fn verify_block_signature<P: Preset>(
    config: &Config,
    state: &BeaconState<P>,
    block: &SignedBeaconBlock<P>,
) -> Result<(), Error> {
    let unphased_state = state.as_unphased();

    let proposer_pubkey = unphased_state
        .validators()
        .get(block.proposer_index() as usize)
        .ok_or(Error::ValidatorOutOfBounds)?
        .pubkey;

    let fork = unphased_state.fork();
    let epoch = misc::compute_epoch_at_slot::<P>(unphased_state.slot());

    let fork_version = if epoch < fork.epoch {
        fork.previous_version
    } else {
        fork.current_version
    };

    let domain = misc::compute_domain(
        config,
        DOMAIN_BEACON_PROPOSER,
        Some(fork_version),
        Some(unphased_state.genesis_validators_root()),
    );

    signing::verify_root(block.block_root(), domain, proposer_pubkey, block.signature())
        .map_err(|_| Error::InvalidSignature)
}

#[cfg(test)]
mod tests {
    use types::preset::Minimal;

    use super::*;

    #[test]
    fn process_slots_rejects_targets_in_the_past() {
        let config = Config::minimal();
        let mut state = BeaconState::<Minimal>::Phase0(Default::default());
        state.set_slot(5);

        assert_eq!(
            process_slots(&config, &mut state, 5),
            Err(Error::SlotInPast {
                state_slot: 5,
                target_slot: 5,
            }),
        );

        assert_eq!(
            process_slots(&config, &mut state, 3),
            Err(Error::SlotInPast {
                state_slot: 5,
                target_slot: 3,
            }),
        );
    }

    #[test]
    fn process_block_rejects_mismatched_phases() {
        let config = Config::minimal();
        let mut state = BeaconState::<Minimal>::Phase0(Default::default());

        let block = SignedBeaconBlock::<Minimal>::Altair(Default::default());

        assert!(matches!(
            process_block(&config, &mut state, &block, false),
            Err(Error::PhaseMismatch { .. }),
        ));
    }
}
