use std::collections::BTreeMap;

use log::debug;
use types::phase0::primitives::Slot;

use crate::peer_pool::PeerId;

pub const SLOTS_PER_REQUEST: u64 = 64;

/// Forward sync advances the head; back sync fills in history down to
/// genesis or the weak subjectivity checkpoint.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SyncDirection {
    Forward,
    Back,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct SyncBatch {
    pub direction: SyncDirection,
    pub peer_id: PeerId,
    pub start_slot: Slot,
    pub count: u64,
}

impl SyncBatch {
    const fn end_slot(self) -> Slot {
        self.start_slot + self.count
    }
}

/// A sliding download window.
///
/// Requests go out in fixed-size consecutive chunks. Responses are admitted
/// strictly in window order; whatever arrives early is buffered. A response
/// with out-of-order blocks, or blocks outside its requested range, rewinds
/// the window to the last contiguous slot and everything past it is
/// requested again.
pub struct SyncManager<B> {
    direction: SyncDirection,
    /// Forward: the lowest slot not yet admitted. Back: the lowest slot
    /// already stored.
    contiguous_boundary: Slot,
    /// Forward: the remote head. Back: the backfill termination slot.
    target_slot: Slot,
    next_request_slot: Slot,
    requested: BTreeMap<Slot, SyncBatch>,
    buffered: BTreeMap<Slot, (SyncBatch, Vec<(Slot, B)>)>,
}

impl<B> SyncManager<B> {
    /// A forward sync from the local head toward a remote head.
    #[must_use]
    pub fn forward(local_head_slot: Slot, remote_head_slot: Slot) -> Self {
        Self {
            direction: SyncDirection::Forward,
            contiguous_boundary: local_head_slot + 1,
            target_slot: remote_head_slot,
            next_request_slot: local_head_slot + 1,
            requested: BTreeMap::new(),
            buffered: BTreeMap::new(),
        }
    }

    /// A backfill from the oldest stored slot down to the termination slot,
    /// usually genesis or the weak subjectivity checkpoint.
    #[must_use]
    pub fn back(oldest_stored_slot: Slot, terminate_at_slot: Slot) -> Self {
        Self {
            direction: SyncDirection::Back,
            contiguous_boundary: oldest_stored_slot,
            target_slot: terminate_at_slot,
            next_request_slot: oldest_stored_slot
                .saturating_sub(SLOTS_PER_REQUEST)
                .max(terminate_at_slot),
            requested: BTreeMap::new(),
            buffered: BTreeMap::new(),
        }
    }

    #[must_use]
    pub const fn direction(&self) -> SyncDirection {
        self.direction
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        match self.direction {
            SyncDirection::Forward => self.contiguous_boundary > self.target_slot,
            SyncDirection::Back => self.contiguous_boundary <= self.target_slot,
        }
    }

    /// Hands the next chunk to a peer, or nothing when the whole window is
    /// in flight.
    pub fn next_batch(&mut self, peer_id: PeerId) -> Option<SyncBatch> {
        if self.is_finished() {
            return None;
        }

        let batch = match self.direction {
            SyncDirection::Forward => {
                if self.next_request_slot > self.target_slot {
                    return None;
                }

                let start_slot = self.next_request_slot;
                let count = SLOTS_PER_REQUEST.min(self.target_slot - start_slot + 1);
                self.next_request_slot = start_slot + count;

                SyncBatch {
                    direction: self.direction,
                    peer_id,
                    start_slot,
                    count,
                }
            }
            SyncDirection::Back => {
                let lowest_allocated = self
                    .requested
                    .keys()
                    .chain(self.buffered.keys())
                    .min()
                    .copied()
                    .unwrap_or(self.contiguous_boundary);

                if lowest_allocated <= self.target_slot {
                    return None;
                }

                let start_slot = lowest_allocated
                    .saturating_sub(SLOTS_PER_REQUEST)
                    .max(self.target_slot);
                let count = lowest_allocated - start_slot;

                SyncBatch {
                    direction: self.direction,
                    peer_id,
                    start_slot,
                    count,
                }
            }
        };

        self.requested.insert(batch.start_slot, batch);

        Some(batch)
    }

    /// Admits a batch response.
    ///
    /// Returns the blocks that are now contiguous with everything already
    /// admitted, in processing order. Empty batches are valid; slots may be
    /// skipped on chain.
    pub fn on_batch_response(
        &mut self,
        start_slot: Slot,
        blocks: Vec<(Slot, B)>,
    ) -> Vec<(Slot, B)> {
        let Some(batch) = self.requested.remove(&start_slot) else {
            debug!("discarding response for unrequested batch at slot {start_slot}");
            return vec![];
        };

        let ordered = blocks.windows(2).all(|pair| pair[0].0 < pair[1].0);

        let in_range = blocks
            .iter()
            .all(|(slot, _)| (batch.start_slot..batch.end_slot()).contains(slot));

        if !ordered || !in_range {
            debug!("batch at slot {start_slot} violates ordering; rewinding");
            self.rewind();
            return vec![];
        }

        self.buffered.insert(start_slot, (batch, blocks));

        self.drain_contiguous()
    }

    /// Puts a failed batch's range back into the window.
    pub fn on_batch_failure(&mut self, start_slot: Slot) {
        if self.requested.remove(&start_slot).is_some() {
            self.rewind();
        }
    }

    /// Drops all in-flight bookkeeping and resumes from the last contiguous
    /// slot.
    pub fn rewind(&mut self) {
        self.requested.clear();
        self.buffered.clear();

        self.next_request_slot = match self.direction {
            SyncDirection::Forward => self.contiguous_boundary,
            SyncDirection::Back => self
                .contiguous_boundary
                .saturating_sub(SLOTS_PER_REQUEST)
                .max(self.target_slot),
        };
    }

    fn drain_contiguous(&mut self) -> Vec<(Slot, B)> {
        let mut ready = vec![];

        match self.direction {
            SyncDirection::Forward => {
                while let Some((&start_slot, _)) = self.buffered.first_key_value() {
                    if start_slot != self.contiguous_boundary {
                        break;
                    }

                    let (_, (batch, blocks)) = self
                        .buffered
                        .pop_first()
                        .expect("the map is nonempty inside the loop");

                    self.contiguous_boundary = batch.end_slot();
                    ready.extend(blocks);
                }
            }
            SyncDirection::Back => {
                while let Some((_, (batch, _))) = self.buffered.last_key_value() {
                    if batch.end_slot() != self.contiguous_boundary {
                        break;
                    }

                    let (_, (batch, blocks)) = self
                        .buffered
                        .pop_last()
                        .expect("the map is nonempty inside the loop");

                    self.contiguous_boundary = batch.start_slot;
                    ready.extend(blocks);
                }
            }
        }

        ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer() -> PeerId {
        PeerId([1; 32])
    }

    fn slots(blocks: &[(Slot, &'static str)]) -> Vec<(Slot, &'static str)> {
        blocks.to_vec()
    }

    #[test]
    fn forward_sync_requests_consecutive_chunks() {
        let mut manager = SyncManager::<&str>::forward(99, 300);

        let first = manager.next_batch(peer()).expect("the window is open");
        let second = manager.next_batch(peer()).expect("the window is open");

        assert_eq!((first.start_slot, first.count), (100, 64));
        assert_eq!((second.start_slot, second.count), (164, 64));
    }

    #[test]
    fn responses_are_admitted_in_order_and_buffered_out_of_order() {
        let mut manager = SyncManager::forward(99, 300);

        let first = manager.next_batch(peer()).expect("the window is open");
        let second = manager.next_batch(peer()).expect("the window is open");

        // The second batch arrives first and has to wait.
        let ready = manager.on_batch_response(second.start_slot, slots(&[(170, "b")]));
        assert!(ready.is_empty());

        // The first batch unblocks both.
        let ready = manager.on_batch_response(first.start_slot, slots(&[(101, "a")]));
        assert_eq!(ready, [(101, "a"), (170, "b")]);
    }

    #[test]
    fn unsorted_batches_rewind_the_window() {
        let mut manager = SyncManager::forward(99, 300);

        let first = manager.next_batch(peer()).expect("the window is open");
        let second = manager.next_batch(peer()).expect("the window is open");
        assert_eq!(second.start_slot, 164);

        let ready =
            manager.on_batch_response(first.start_slot, slots(&[(105, "x"), (101, "y")]));
        assert!(ready.is_empty());

        // The window rewound to the last contiguous slot.
        let retried = manager.next_batch(peer()).expect("the window reopened");
        assert_eq!(retried.start_slot, 100);
    }

    #[test]
    fn blocks_outside_the_requested_range_rewind_the_window() {
        let mut manager = SyncManager::forward(99, 300);
        let first = manager.next_batch(peer()).expect("the window is open");

        let ready = manager.on_batch_response(first.start_slot, slots(&[(500, "x")]));

        assert!(ready.is_empty());
        assert_eq!(
            manager.next_batch(peer()).map(|batch| batch.start_slot),
            Some(100),
        );
    }

    #[test]
    fn empty_batches_advance_the_window() {
        let mut manager = SyncManager::<&str>::forward(99, 300);
        let first = manager.next_batch(peer()).expect("the window is open");

        manager.on_batch_response(first.start_slot, vec![]);

        assert!(!manager.is_finished());

        let second = manager.next_batch(peer()).expect("the window is open");
        assert_eq!(second.start_slot, 164);
    }

    #[test]
    fn forward_sync_finishes_at_the_remote_head() {
        let mut manager = SyncManager::<&str>::forward(99, 110);

        let only = manager.next_batch(peer()).expect("the window is open");
        assert_eq!((only.start_slot, only.count), (100, 11));

        manager.on_batch_response(only.start_slot, vec![]);

        assert!(manager.is_finished());
        assert!(manager.next_batch(peer()).is_none());
    }

    #[test]
    fn back_sync_walks_toward_genesis() {
        let mut manager = SyncManager::back(130, 0);

        let first = manager.next_batch(peer()).expect("the window is open");
        assert_eq!((first.start_slot, first.count), (66, 64));

        let second = manager.next_batch(peer()).expect("the window is open");
        assert_eq!((second.start_slot, second.count), (2, 64));

        let ready = manager.on_batch_response(second.start_slot, slots(&[(10, "old")]));
        assert!(ready.is_empty());

        let ready = manager.on_batch_response(first.start_slot, slots(&[(100, "new")]));
        assert_eq!(ready, [(100, "new"), (10, "old")]);

        let third = manager.next_batch(peer()).expect("the window is open");
        assert_eq!((third.start_slot, third.count), (0, 2));

        manager.on_batch_response(third.start_slot, vec![]);

        assert!(manager.is_finished());
    }
}
