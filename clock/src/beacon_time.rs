use core::{
    fmt::{Display, Formatter, Result as FmtResult},
    ops::{Add, Sub},
};

use types::{
    config::Config,
    phase0::{
        consts::{FAR_FUTURE_EPOCH, FAR_FUTURE_SLOT},
        primitives::{Epoch, Slot},
    },
    preset::Preset,
};

pub const FAR_FUTURE_BEACON_TIME: BeaconTime = BeaconTime(i64::MAX);

/// Nanoseconds relative to genesis. Negative values are before genesis.
///
/// Arithmetic saturates at [`FAR_FUTURE_BEACON_TIME`] so that far-future
/// deadlines survive offsetting.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Debug)]
pub struct BeaconTime(i64);

/// A nanosecond delta. May be negative, unlike wall durations.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Debug)]
pub struct TimeDiff(i64);

impl Display for BeaconTime {
    fn fmt(&self, formatter: &mut Formatter) -> FmtResult {
        write!(formatter, "{}ns", self.0)
    }
}

impl Add<TimeDiff> for BeaconTime {
    type Output = Self;

    fn add(self, difference: TimeDiff) -> Self {
        if self.is_far_future() {
            return self;
        }

        Self(self.0.saturating_add(difference.0))
    }
}

impl Sub<TimeDiff> for BeaconTime {
    type Output = Self;

    fn sub(self, difference: TimeDiff) -> Self {
        if self.is_far_future() {
            return self;
        }

        Self(self.0.saturating_sub(difference.0))
    }
}

impl Sub for BeaconTime {
    type Output = TimeDiff;

    fn sub(self, other: Self) -> TimeDiff {
        TimeDiff(self.0.saturating_sub(other.0))
    }
}

impl BeaconTime {
    #[must_use]
    pub const fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    #[must_use]
    pub const fn nanos(self) -> i64 {
        self.0
    }

    #[must_use]
    pub const fn is_far_future(self) -> bool {
        self.0 == FAR_FUTURE_BEACON_TIME.0
    }

    #[must_use]
    pub const fn after_genesis(self) -> bool {
        self.0 >= 0
    }

    /// Whether genesis has passed and how many whole slots fit in the
    /// distance to it, regardless of direction.
    #[must_use]
    pub fn slot_or_remainder(self, config: &Config) -> (bool, Slot) {
        let slot_nanos = slot_nanos(config);

        if self.is_far_future() {
            return (true, FAR_FUTURE_SLOT);
        }

        (self.after_genesis(), self.0.unsigned_abs() / slot_nanos)
    }

    /// The slot in progress at this time. Pre-genesis times map to slot 0.
    #[must_use]
    pub fn to_slot(self, config: &Config) -> Slot {
        let (after_genesis, slot) = self.slot_or_remainder(config);

        if after_genesis {
            slot
        } else {
            0
        }
    }

    #[must_use]
    pub fn to_epoch<P: Preset>(self, config: &Config) -> Epoch {
        let slot = self.to_slot(config);

        if slot == FAR_FUTURE_SLOT {
            return FAR_FUTURE_EPOCH;
        }

        slot / P::SLOTS_PER_EPOCH.get()
    }

    /// The start of a slot. The far-future slot maps back to
    /// [`FAR_FUTURE_BEACON_TIME`].
    #[must_use]
    pub fn start_of_slot(config: &Config, slot: Slot) -> Self {
        if slot == FAR_FUTURE_SLOT {
            return FAR_FUTURE_BEACON_TIME;
        }

        Self(
            i64::try_from(slot)
                .ok()
                .and_then(|slot| slot.checked_mul(i64::try_from(slot_nanos(config)).ok()?))
                .unwrap_or(i64::MAX),
        )
    }
}

impl TimeDiff {
    #[must_use]
    pub const fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    #[must_use]
    pub const fn nanos(self) -> i64 {
        self.0
    }
}

fn slot_nanos(config: &Config) -> u64 {
    config.seconds_per_slot.get().saturating_mul(1_000_000_000)
}

#[cfg(test)]
mod tests {
    use test_case::test_case;
    use types::preset::Mainnet;

    use super::*;

    #[test]
    fn far_future_time_maps_to_far_future_slot() {
        let config = Config::mainnet();

        assert_eq!(FAR_FUTURE_BEACON_TIME.to_slot(&config), FAR_FUTURE_SLOT);
        assert_eq!(
            BeaconTime::start_of_slot(&config, FAR_FUTURE_SLOT),
            FAR_FUTURE_BEACON_TIME,
        );
        assert_eq!(
            FAR_FUTURE_BEACON_TIME.to_epoch::<Mainnet>(&config),
            FAR_FUTURE_EPOCH,
        );
    }

    #[test_case(0 => (true, 0))]
    #[test_case(11_999_999_999 => (true, 0))]
    #[test_case(12_000_000_000 => (true, 1))]
    #[test_case(-1 => (false, 0))]
    #[test_case(-12_000_000_000 => (false, 1); "negative times count whole slots before genesis")]
    #[test_case(-30_000_000_000 => (false, 2))]
    fn slot_or_remainder_with_mainnet_config(nanos: i64) -> (bool, Slot) {
        BeaconTime::from_nanos(nanos).slot_or_remainder(&Config::mainnet())
    }

    #[test]
    fn arithmetic_saturates_at_the_far_future_sentinel() {
        let difference = TimeDiff::from_nanos(1);

        assert_eq!(
            FAR_FUTURE_BEACON_TIME + difference,
            FAR_FUTURE_BEACON_TIME,
        );
        assert_eq!(
            FAR_FUTURE_BEACON_TIME - difference,
            FAR_FUTURE_BEACON_TIME,
        );
    }

    #[test]
    fn start_of_slot_is_consistent_with_to_slot() {
        let config = Config::mainnet();

        for slot in [0, 1, 7, 100_000] {
            assert_eq!(BeaconTime::start_of_slot(&config, slot).to_slot(&config), slot);
        }
    }
}
