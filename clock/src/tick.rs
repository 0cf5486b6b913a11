use anyhow::Result;
use enum_iterator::Sequence;
use strum::AsRefStr;
use types::{
    config::Config,
    phase0::primitives::{Epoch, Slot, UnixSeconds},
    preset::Preset,
};

use crate::ClockError;

/// A duty deadline within a slot.
///
/// Block proposal is due at the start of the slot, attestations and sync
/// committee messages a third in, aggregates and contributions two thirds in.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Tick {
    pub slot: Slot,
    pub kind: TickKind,
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Sequence, AsRefStr)]
pub enum TickKind {
    Propose,
    Attest,
    Aggregate,
}

impl Tick {
    #[must_use]
    pub const fn new(slot: Slot, kind: TickKind) -> Self {
        Self { slot, kind }
    }

    #[must_use]
    pub const fn start_of_slot(slot: Slot) -> Self {
        Self::new(slot, TickKind::Propose)
    }

    #[must_use]
    pub fn epoch<P: Preset>(self) -> Epoch {
        helper_functions::misc::compute_epoch_at_slot::<P>(self.slot)
    }

    #[must_use]
    pub const fn is_start_of_slot(self) -> bool {
        matches!(self.kind, TickKind::Propose)
    }

    #[must_use]
    pub fn is_start_of_epoch<P: Preset>(self) -> bool {
        helper_functions::misc::is_epoch_start::<P>(self.slot) && self.is_start_of_slot()
    }

    /// The tick in progress at the given Unix time.
    pub fn at_time(config: &Config, time: UnixSeconds, genesis_time: UnixSeconds) -> Self {
        let Some(since_genesis) = time.checked_sub(genesis_time) else {
            return Self::start_of_slot(0);
        };

        let seconds_per_slot = config.seconds_per_slot.get();
        let ticks_per_slot = TickKind::CARDINALITY as u64;

        let slot = since_genesis / seconds_per_slot;
        let within_slot = since_genesis % seconds_per_slot;
        let tick_index = within_slot * ticks_per_slot / seconds_per_slot;

        let kind = enum_iterator::all::<TickKind>()
            .nth(usize::try_from(tick_index).expect("tick indices are below 3"))
            .expect("tick index is below the number of tick kinds");

        Self::new(slot, kind)
    }

    pub(crate) fn next(self) -> Result<Self> {
        let Self { slot, kind } = self;

        let (next_slot, next_kind) = match kind.next() {
            Some(next_kind) => (slot, next_kind),
            None => (
                slot.checked_add(1).ok_or(ClockError::RanOutOfSlots)?,
                TickKind::Propose,
            ),
        };

        Ok(Self::new(next_slot, next_kind))
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case(770 => Tick::new(0, TickKind::Propose); "before genesis")]
    #[test_case(777 => Tick::new(0, TickKind::Propose); "at genesis")]
    #[test_case(780 => Tick::new(0, TickKind::Propose); "3 seconds after genesis")]
    #[test_case(781 => Tick::new(0, TickKind::Attest); "4 seconds after genesis")]
    #[test_case(785 => Tick::new(0, TickKind::Aggregate); "8 seconds after genesis")]
    #[test_case(789 => Tick::new(1, TickKind::Propose); "12 seconds after genesis")]
    #[test_case(801 => Tick::new(2, TickKind::Propose); "24 seconds after genesis")]
    fn tick_at_time_with_mainnet_config(time: UnixSeconds) -> Tick {
        Tick::at_time(&Config::mainnet(), time, 777)
    }

    #[test]
    fn next_wraps_to_the_next_slot() -> Result<()> {
        let tick = Tick::new(5, TickKind::Aggregate);
        assert_eq!(tick.next()?, Tick::new(6, TickKind::Propose));
        Ok(())
    }
}
