use core::num::NonZeroUsize;
use std::collections::{HashMap, HashSet};

use lru::LruCache;
use nonzero_ext::nonzero;
use types::phase0::primitives::{Slot, H256};

pub const DEFAULT_QUARANTINE_CAPACITY: NonZeroUsize = nonzero!(1024_usize);

/// Holds blocks whose parents are not in the DAG yet.
///
/// Bounded with LRU eviction. During sync, parents usually arrive shortly
/// after their children, so evicted blocks are simply re-requested.
pub struct Quarantine<B> {
    by_root: LruCache<H256, PendingBlock<B>>,
    children_by_parent: HashMap<H256, HashSet<H256>>,
}

struct PendingBlock<B> {
    slot: Slot,
    parent_root: H256,
    block: B,
}

impl<B> Quarantine<B> {
    #[must_use]
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            by_root: LruCache::new(capacity),
            children_by_parent: HashMap::new(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_root.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_root.is_empty()
    }

    #[must_use]
    pub fn contains(&self, root: H256) -> bool {
        self.by_root.contains(&root)
    }

    pub fn insert(&mut self, root: H256, slot: Slot, parent_root: H256, block: B) {
        if self.by_root.contains(&root) {
            return;
        }

        let evicted = self.by_root.push(
            root,
            PendingBlock {
                slot,
                parent_root,
                block,
            },
        );

        if let Some((evicted_root, evicted_block)) = evicted {
            if evicted_root != root {
                self.unlink(evicted_root, evicted_block.parent_root);
            }
        }

        self.children_by_parent
            .entry(parent_root)
            .or_default()
            .insert(root);
    }

    /// Removes and returns the blocks waiting on `parent_root` in slot
    /// order, so they can be offered to the DAG causally.
    ///
    /// Only direct children are drained. Grandchildren surface on the next
    /// call once their parent has been admitted.
    pub fn drain_children(&mut self, parent_root: H256) -> Vec<(H256, B)> {
        let Some(children) = self.children_by_parent.remove(&parent_root) else {
            return vec![];
        };

        let mut drained = children
            .into_iter()
            .filter_map(|root| {
                self.by_root
                    .pop(&root)
                    .map(|pending| (pending.slot, root, pending.block))
            })
            .collect::<Vec<_>>();

        drained.sort_by_key(|(slot, root, _)| (*slot, *root));

        drained
            .into_iter()
            .map(|(_, root, block)| (root, block))
            .collect()
    }

    /// Drops every queued descendant of an unviable block and returns their
    /// roots so callers can remember them.
    pub fn mark_unviable(&mut self, root: H256) -> Vec<H256> {
        let mut poisoned = vec![];
        let mut queue = vec![root];

        while let Some(current) = queue.pop() {
            let Some(children) = self.children_by_parent.remove(&current) else {
                continue;
            };

            for child in children {
                self.by_root.pop(&child);
                poisoned.push(child);
                queue.push(child);
            }
        }

        poisoned
    }

    fn unlink(&mut self, root: H256, parent_root: H256) {
        if let Some(children) = self.children_by_parent.get_mut(&parent_root) {
            children.remove(&root);

            if children.is_empty() {
                self.children_by_parent.remove(&parent_root);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root(byte: u8) -> H256 {
        H256::repeat_byte(byte)
    }

    #[test]
    fn children_drain_in_slot_order_once_the_parent_arrives() {
        let mut quarantine = Quarantine::new(DEFAULT_QUARANTINE_CAPACITY);

        quarantine.insert(root(3), 3, root(1), "c");
        quarantine.insert(root(2), 2, root(1), "b");
        quarantine.insert(root(9), 9, root(8), "unrelated");

        let drained = quarantine.drain_children(root(1));

        assert_eq!(drained, [(root(2), "b"), (root(3), "c")]);
        assert_eq!(quarantine.len(), 1);
        assert!(quarantine.contains(root(9)));
    }

    #[test]
    fn inserting_the_same_root_twice_is_idempotent() {
        let mut quarantine = Quarantine::new(DEFAULT_QUARANTINE_CAPACITY);

        quarantine.insert(root(2), 2, root(1), "b");
        quarantine.insert(root(2), 2, root(1), "b again");

        assert_eq!(quarantine.len(), 1);
        assert_eq!(quarantine.drain_children(root(1)), [(root(2), "b")]);
    }

    #[test]
    fn eviction_keeps_the_map_bounded() {
        let capacity = NonZeroUsize::new(2).expect("2 is nonzero");
        let mut quarantine = Quarantine::new(capacity);

        quarantine.insert(root(1), 1, root(0), "a");
        quarantine.insert(root(2), 2, root(0), "b");
        quarantine.insert(root(3), 3, root(0), "c");

        assert_eq!(quarantine.len(), 2);
        assert!(!quarantine.contains(root(1)));
    }

    #[test]
    fn unviable_discoveries_poison_queued_descendants() {
        let mut quarantine = Quarantine::new(DEFAULT_QUARANTINE_CAPACITY);

        quarantine.insert(root(2), 2, root(1), "b");
        quarantine.insert(root(3), 3, root(2), "c");
        quarantine.insert(root(4), 4, root(3), "d");

        let mut poisoned = quarantine.mark_unviable(root(1));
        poisoned.sort();

        assert_eq!(poisoned, [root(2), root(3), root(4)]);
        assert!(quarantine.is_empty());
    }
}
