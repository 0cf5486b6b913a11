use types::{
    config::Config,
    phase0::{
        consts::FAR_FUTURE_EPOCH,
        primitives::{Epoch, Gwei, ValidatorIndex},
    },
    preset::Preset,
    traits::BeaconState,
};

use crate::{accessors, error::Error, misc};

pub fn increase_balance<P: Preset>(
    state: &mut impl BeaconState<P>,
    validator_index: ValidatorIndex,
    delta: Gwei,
) -> Result<(), Error> {
    let balance = balance_mut(state, validator_index)?;
    *balance = balance.saturating_add(delta);
    Ok(())
}

/// Balances saturate at zero rather than underflowing. Penalties can exceed
/// the remaining balance.
pub fn decrease_balance<P: Preset>(
    state: &mut impl BeaconState<P>,
    validator_index: ValidatorIndex,
    delta: Gwei,
) -> Result<(), Error> {
    let balance = balance_mut(state, validator_index)?;
    *balance = balance.saturating_sub(delta);
    Ok(())
}

pub fn initiate_validator_exit<P: Preset>(
    config: &Config,
    state: &mut impl BeaconState<P>,
    validator_index: ValidatorIndex,
) -> Result<(), Error> {
    let current_epoch = accessors::get_current_epoch(state);

    let already_exiting = state
        .validators()
        .get(validator_index as usize)
        .ok_or(Error::ValidatorIndexOutOfBounds { validator_index })?
        .exit_epoch
        != FAR_FUTURE_EPOCH;

    if already_exiting {
        return Ok(());
    }

    let exit_queue_epoch = exit_queue_epoch(config, state, current_epoch);

    let validator = state
        .validators_mut()
        .get_mut(validator_index as usize)
        .ok_or(Error::ValidatorIndexOutOfBounds { validator_index })?;

    validator.exit_epoch = exit_queue_epoch;
    validator.withdrawable_epoch =
        exit_queue_epoch.saturating_add(config.min_validator_withdrawability_delay);

    Ok(())
}

pub fn slash_validator<P: Preset>(
    config: &Config,
    state: &mut impl BeaconState<P>,
    slashed_index: ValidatorIndex,
    whistleblower_index: Option<ValidatorIndex>,
    proposer_index: ValidatorIndex,
    min_slashing_penalty_quotient: u64,
) -> Result<(), Error> {
    let current_epoch = accessors::get_current_epoch(state);

    initiate_validator_exit(config, state, slashed_index)?;

    let effective_balance;

    {
        let validator = state
            .validators_mut()
            .get_mut(slashed_index as usize)
            .ok_or(Error::ValidatorIndexOutOfBounds {
                validator_index: slashed_index,
            })?;

        validator.slashed = true;
        validator.withdrawable_epoch = validator
            .withdrawable_epoch
            .max(current_epoch.saturating_add(P::epochs_per_slashings_vector()));

        effective_balance = validator.effective_balance;
    }

    let slashings_position = usize::try_from(current_epoch % P::epochs_per_slashings_vector())
        .expect("the remainder is less than the vector length");
    state.slashings_mut()[slashings_position] += effective_balance;

    decrease_balance(
        state,
        slashed_index,
        effective_balance / min_slashing_penalty_quotient.max(1),
    )?;

    let whistleblower_reward = effective_balance / P::WHISTLEBLOWER_REWARD_QUOTIENT;
    let proposer_reward = whistleblower_reward / P::PROPOSER_REWARD_QUOTIENT;
    let whistleblower_index = whistleblower_index.unwrap_or(proposer_index);

    increase_balance(state, proposer_index, proposer_reward)?;
    increase_balance(
        state,
        whistleblower_index,
        whistleblower_reward - proposer_reward,
    )?;

    Ok(())
}

#[must_use]
pub fn validator_churn_limit<P: Preset>(config: &Config, state: &impl BeaconState<P>) -> u64 {
    let active = accessors::get_active_validator_indices(
        state,
        accessors::get_current_epoch(state),
    )
    .len() as u64;

    (active / config.churn_limit_quotient).max(config.min_per_epoch_churn_limit)
}

fn exit_queue_epoch<P: Preset>(
    config: &Config,
    state: &impl BeaconState<P>,
    current_epoch: Epoch,
) -> Epoch {
    let mut exit_queue_epoch = state
        .validators()
        .iter()
        .map(|validator| validator.exit_epoch)
        .filter(|exit_epoch| *exit_epoch != FAR_FUTURE_EPOCH)
        .max()
        .unwrap_or(0)
        .max(misc::compute_activation_exit_epoch::<P>(current_epoch));

    let exit_queue_churn = state
        .validators()
        .iter()
        .filter(|validator| validator.exit_epoch == exit_queue_epoch)
        .count() as u64;

    if exit_queue_churn >= validator_churn_limit::<P>(config, state) {
        exit_queue_epoch += 1;
    }

    exit_queue_epoch
}

fn balance_mut<'state, P: Preset>(
    state: &'state mut impl BeaconState<P>,
    validator_index: ValidatorIndex,
) -> Result<&'state mut Gwei, Error> {
    state
        .balances_mut()
        .get_mut(validator_index as usize)
        .ok_or(Error::ValidatorIndexOutOfBounds { validator_index })
}
