//! A [`Stream`]-based timer for beacon chain duties.
//!
//! Built on [`Interval`]. [`Instant`]s are opaque, so the first tick instant
//! is derived by offsetting the current [`Instant`] with the wall-clock
//! distance to the next tick. An [`Interval`] may produce items late, but the
//! delays do not accumulate.
//!
//! [`Interval`]: tokio::time::Interval

pub use crate::{
    beacon_time::{BeaconTime, TimeDiff, FAR_FUTURE_BEACON_TIME},
    tick::{Tick, TickKind},
};

mod beacon_time;
mod tick;

use core::time::Duration;
use std::time::{Instant, SystemTime};

use anyhow::Result;
use enum_iterator::Sequence as _;
use futures::stream::{Stream, StreamExt as _};
use log::warn;
use thiserror::Error;
use tokio_stream::wrappers::IntervalStream;
use types::{
    config::Config,
    phase0::{consts::GENESIS_SLOT, primitives::UnixSeconds},
};

#[derive(Debug, Error)]
#[cfg_attr(test, derive(PartialEq, Eq))]
pub enum ClockError {
    #[error("time of next tick overflowed")]
    NextInstantOverflow,
    #[error("ran out of slots")]
    RanOutOfSlots,
}

/// An endless stream of duty deadlines starting at the next one.
///
/// Pre-genesis the stream idles until the genesis slot starts. A wall clock
/// moved backward across genesis re-enters the pre-genesis branch; that is
/// logged and tolerated, the stream never goes backward itself.
pub fn ticks(
    config: &Config,
    genesis_time: UnixSeconds,
) -> Result<impl Stream<Item = Result<Tick>>> {
    // The `Instant` and `SystemTime` obtained here are assumed to correspond
    // to the same point in time. The error is negligible compared to clock
    // differences between nodes.
    let now_instant = Instant::now();
    let now_system_time = SystemTime::now();

    let (mut next_tick, next_instant) =
        next_tick_with_instant(config, now_instant, now_system_time, genesis_time)?;

    let tick_duration = tick_duration(config);
    let interval = tokio::time::interval_at(next_instant.into(), tick_duration);

    Ok(IntervalStream::new(interval).map(move |_| {
        let current_tick = next_tick;
        next_tick = current_tick.next()?;
        Ok(current_tick)
    }))
}

pub fn next_tick_with_remaining_time(
    config: &Config,
    genesis_time: UnixSeconds,
) -> Result<(Tick, Duration)> {
    let now_instant = Instant::now();
    let now_system_time = SystemTime::now();

    let (next_tick, next_instant) =
        next_tick_with_instant(config, now_instant, now_system_time, genesis_time)?;

    Ok((next_tick, next_instant.duration_since(now_instant)))
}

fn next_tick_with_instant(
    config: &Config,
    now_instant: Instant,
    now_system_time: SystemTime,
    genesis_time: UnixSeconds,
) -> Result<(Tick, Instant)> {
    let unix_epoch_to_now = now_system_time.duration_since(SystemTime::UNIX_EPOCH)?;
    let unix_epoch_to_genesis = Duration::from_secs(genesis_time);

    // Some platforms do not support `Instant`s before their epoch, so
    // `Duration`s are never subtracted from `Instant`s here.

    let next_tick;
    let mut now_to_next_tick;

    if unix_epoch_to_now <= unix_epoch_to_genesis {
        let before_genesis = now_to_beacon_time(unix_epoch_to_now, unix_epoch_to_genesis);
        let slot_nanos = i64::try_from(config.slot_duration().as_nanos()).unwrap_or(i64::MAX);

        if before_genesis.nanos() < -slot_nanos {
            warn!(
                "wall clock is more than a slot before genesis; \
                 waiting for the genesis slot to start",
            );
        }

        next_tick = Tick::start_of_slot(GENESIS_SLOT);
        now_to_next_tick = unix_epoch_to_genesis - unix_epoch_to_now;
    } else {
        let tick_duration = tick_duration(config);
        let genesis_to_now = unix_epoch_to_now - unix_epoch_to_genesis;
        let slots_since_genesis = genesis_to_now.as_nanos()
            / config.slot_duration().as_nanos();
        let genesis_to_current_slot = config
            .slot_duration()
            .saturating_mul(u32::try_from(slots_since_genesis).unwrap_or(u32::MAX));
        let current_slot_to_now = genesis_to_now - genesis_to_current_slot;

        let mut tick = Tick::start_of_slot(GENESIS_SLOT + slots_since_genesis as u64);
        now_to_next_tick = Duration::ZERO;

        while now_to_next_tick < current_slot_to_now {
            tick = tick.next()?;
            now_to_next_tick += tick_duration;
        }

        next_tick = tick;
        now_to_next_tick -= current_slot_to_now;
    }

    let next_instant = now_instant
        .checked_add(now_to_next_tick)
        .ok_or(ClockError::NextInstantOverflow)?;

    Ok((next_tick, next_instant))
}

fn now_to_beacon_time(
    unix_epoch_to_now: Duration,
    unix_epoch_to_genesis: Duration,
) -> BeaconTime {
    if unix_epoch_to_now >= unix_epoch_to_genesis {
        BeaconTime::from_nanos(
            i64::try_from((unix_epoch_to_now - unix_epoch_to_genesis).as_nanos())
                .unwrap_or(i64::MAX),
        )
    } else {
        BeaconTime::from_nanos(
            i64::try_from((unix_epoch_to_genesis - unix_epoch_to_now).as_nanos())
                .map(core::ops::Neg::neg)
                .unwrap_or(i64::MIN),
        )
    }
}

/// Current time relative to genesis.
pub fn beacon_time_now(genesis_time: UnixSeconds) -> Result<BeaconTime> {
    let unix_epoch_to_now = SystemTime::now().duration_since(SystemTime::UNIX_EPOCH)?;
    let unix_epoch_to_genesis = Duration::from_secs(genesis_time);

    Ok(now_to_beacon_time(unix_epoch_to_now, unix_epoch_to_genesis))
}

fn tick_duration(config: &Config) -> Duration {
    let ticks_per_slot =
        u32::try_from(TickKind::CARDINALITY).expect("number of ticks per slot fits in u32");

    config.slot_duration() / ticks_per_slot
}

#[cfg(test)]
mod tests {
    use core::ops::Add as _;

    use futures::future::FutureExt as _;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn ticks_with_mainnet_config_produces_a_tick_every_four_seconds() -> Result<()> {
        let genesis_time = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)?
            .as_secs()
            .add(1);

        let mut ticks = ticks(&Config::mainnet(), genesis_time)?;
        let mut next_tick = || ticks.next().now_or_never().flatten().transpose();

        assert_eq!(next_tick()?, None);

        tokio::time::advance(Duration::from_secs(1)).await;

        assert_eq!(next_tick()?, Some(Tick::new(0, TickKind::Propose)));
        assert_eq!(next_tick()?, None);

        tokio::time::advance(Duration::from_secs(4)).await;

        assert_eq!(next_tick()?, Some(Tick::new(0, TickKind::Attest)));
        assert_eq!(next_tick()?, None);

        tokio::time::advance(Duration::from_secs(4)).await;

        assert_eq!(next_tick()?, Some(Tick::new(0, TickKind::Aggregate)));
        assert_eq!(next_tick()?, None);

        tokio::time::advance(Duration::from_secs(4)).await;

        assert_eq!(next_tick()?, Some(Tick::new(1, TickKind::Propose)));
        assert_eq!(next_tick()?, None);

        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_starts_mid_slot_when_just_past_genesis() -> Result<()> {
        let genesis_time = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)?
            .as_secs()
            .saturating_sub(5);

        let mut ticks = ticks(&Config::mainnet(), genesis_time)?;
        let mut next_tick = || ticks.next().now_or_never().flatten().transpose();

        assert_eq!(next_tick()?, None);

        tokio::time::advance(Duration::from_secs(3)).await;

        assert_eq!(next_tick()?, Some(Tick::new(0, TickKind::Aggregate)));
        assert_eq!(next_tick()?, None);

        Ok(())
    }
}
