use core::sync::atomic::{AtomicBool, Ordering};
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use types::{
    nonstandard::BlockSummary,
    phase0::primitives::{Slot, H256},
};

use crate::error::Error;

/// An in-memory node of the block DAG.
///
/// Parent links are strong: a child keeps its whole ancestor chain alive up
/// to the finalized tail. Child links are kept outside the node (in the
/// DAG's root table) as first-child/next-sibling roots so that pruning a
/// branch cannot leak reference cycles.
#[derive(Debug)]
pub struct BlockRef {
    pub root: H256,
    pub slot: Slot,
    pub parent: Option<Arc<BlockRef>>,
    execution_valid: AtomicBool,
}

impl PartialEq for BlockRef {
    fn eq(&self, other: &Self) -> bool {
        self.root == other.root
    }
}

impl Eq for BlockRef {}

impl BlockRef {
    #[must_use]
    pub fn execution_valid(&self) -> bool {
        self.execution_valid.load(Ordering::Acquire)
    }

    pub fn set_execution_valid(&self, valid: bool) {
        self.execution_valid.store(valid, Ordering::Release);
    }

    #[must_use]
    pub fn parent_root(&self) -> Option<H256> {
        self.parent.as_ref().map(|parent| parent.root)
    }
}

#[derive(Default)]
struct ChildLinks {
    first_child: Option<H256>,
    next_sibling: Option<H256>,
}

/// The outcome of offering a block to the DAG.
#[derive(Clone, Debug)]
pub enum BlockAction {
    Admitted(Arc<BlockRef>),
    Duplicate,
    MissingParent,
    Unviable,
}

pub struct BlockDag {
    blocks: HashMap<H256, Arc<BlockRef>>,
    links: HashMap<H256, ChildLinks>,
    /// Roots rejected for diverging from the finalized chain. Remembered so
    /// they are not reprocessed when peers resend them.
    unviable: HashSet<H256>,
    tail: Arc<BlockRef>,
    head: Arc<BlockRef>,
}

impl BlockDag {
    /// A DAG containing only the finalized tail.
    #[must_use]
    pub fn new(tail_root: H256, tail_slot: Slot) -> Self {
        let tail = Arc::new(BlockRef {
            root: tail_root,
            slot: tail_slot,
            parent: None,
            execution_valid: AtomicBool::new(true),
        });

        let mut blocks = HashMap::new();
        blocks.insert(tail_root, tail.clone());

        let mut links = HashMap::new();
        links.insert(tail_root, ChildLinks::default());

        Self {
            blocks,
            links,
            unviable: HashSet::new(),
            head: tail.clone(),
            tail,
        }
    }

    /// Rebuilds the DAG from stored summaries by walking backward from the
    /// head until the tail is reached, then linking children in reverse.
    ///
    /// Must complete before fork choice runs. Missing summaries mean the
    /// database is behind the head pointer; the caller treats that as a cue
    /// to re-sync, not as corruption.
    pub fn rebuild(
        tail_root: H256,
        tail_slot: Slot,
        head_root: H256,
        mut summary_of: impl FnMut(H256) -> Option<BlockSummary>,
    ) -> Result<Self, Error> {
        let mut dag = Self::new(tail_root, tail_slot);

        if head_root == tail_root {
            return Ok(dag);
        }

        let mut backward = vec![];
        let mut current = head_root;

        loop {
            let Some(summary) = summary_of(current) else {
                return Err(Error::RebuildDidNotReachTail);
            };

            backward.push((current, summary));

            if summary.parent_root == tail_root {
                break;
            }

            current = summary.parent_root;
        }

        for (root, summary) in backward.into_iter().rev() {
            match dag.add_block(root, summary.slot, summary.parent_root) {
                BlockAction::Admitted(_) | BlockAction::Duplicate => {}
                BlockAction::MissingParent | BlockAction::Unviable => {
                    return Err(Error::RebuildDidNotReachTail);
                }
            }
        }

        dag.update_head(head_root)?;

        Ok(dag)
    }

    pub fn add_block(&mut self, root: H256, slot: Slot, parent_root: H256) -> BlockAction {
        if self.blocks.contains_key(&root) {
            return BlockAction::Duplicate;
        }

        if self.unviable.contains(&root) || self.unviable.contains(&parent_root) {
            self.unviable.insert(root);
            return BlockAction::Unviable;
        }

        let Some(parent) = self.blocks.get(&parent_root).cloned() else {
            // A parent below the tail that is not the tail itself can never
            // be admitted, so the block can never become viable.
            if slot <= self.tail.slot {
                self.unviable.insert(root);
                return BlockAction::Unviable;
            }

            return BlockAction::MissingParent;
        };

        if parent.slot >= slot {
            self.unviable.insert(root);
            return BlockAction::Unviable;
        }

        let block = Arc::new(BlockRef {
            root,
            slot,
            parent: Some(parent),
            execution_valid: AtomicBool::new(true),
        });

        self.blocks.insert(root, block.clone());

        let previous_first = self
            .links
            .get(&parent_root)
            .and_then(|links| links.first_child);

        self.links.insert(
            root,
            ChildLinks {
                first_child: None,
                next_sibling: previous_first,
            },
        );

        self.links
            .entry(parent_root)
            .or_default()
            .first_child = Some(root);

        BlockAction::Admitted(block)
    }

    #[must_use]
    pub fn get(&self, root: H256) -> Option<&Arc<BlockRef>> {
        self.blocks.get(&root)
    }

    #[must_use]
    pub fn contains(&self, root: H256) -> bool {
        self.blocks.contains_key(&root)
    }

    #[must_use]
    pub fn is_known_unviable(&self, root: H256) -> bool {
        self.unviable.contains(&root)
    }

    #[must_use]
    pub const fn head(&self) -> &Arc<BlockRef> {
        &self.head
    }

    #[must_use]
    pub const fn tail(&self) -> &Arc<BlockRef> {
        &self.tail
    }

    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn update_head(&mut self, root: H256) -> Result<(), Error> {
        self.head = self
            .blocks
            .get(&root)
            .cloned()
            .ok_or(Error::UnknownBlock { root })?;

        Ok(())
    }

    /// The ancestor of `block` at `slot`, or `block` itself if its slot is
    /// not greater.
    #[must_use]
    pub fn get_ancestor_at_slot(&self, block: &Arc<BlockRef>, slot: Slot) -> Arc<BlockRef> {
        let mut current = block.clone();

        while current.slot > slot {
            match &current.parent {
                Some(parent) => current = parent.clone(),
                None => break,
            }
        }

        current
    }

    #[must_use]
    pub fn is_ancestor_of(&self, ancestor: &Arc<BlockRef>, descendant: &Arc<BlockRef>) -> bool {
        self.get_ancestor_at_slot(descendant, ancestor.slot).root == ancestor.root
    }

    pub fn children(&self, root: H256) -> impl Iterator<Item = &Arc<BlockRef>> {
        let mut next = self
            .links
            .get(&root)
            .and_then(|links| links.first_child);

        core::iter::from_fn(move || {
            let current = next?;
            next = self.links.get(&current).and_then(|links| links.next_sibling);
            self.blocks.get(&current)
        })
    }

    /// Blocks with no children.
    #[must_use]
    pub fn heads(&self) -> Vec<Arc<BlockRef>> {
        self.blocks
            .values()
            .filter(|block| {
                self.links
                    .get(&block.root)
                    .is_none_or(|links| links.first_child.is_none())
            })
            .cloned()
            .collect()
    }

    /// Marks a block and all its known descendants unviable and drops them.
    pub fn mark_unviable(&mut self, root: H256) -> Vec<H256> {
        let mut poisoned = vec![root];
        let mut queue = vec![root];

        while let Some(current) = queue.pop() {
            let children = self
                .children(current)
                .map(|child| child.root)
                .collect::<Vec<_>>();

            poisoned.extend(children.iter().copied());
            queue.extend(children);
        }

        for root in &poisoned {
            self.remove(*root);
            self.unviable.insert(*root);
        }

        poisoned
    }

    /// Drops everything not descended from the new finalized block and makes
    /// it the tail. Walks the finalized chain and drops siblings branch by
    /// branch. Returns the pruned roots.
    pub fn prune_to(&mut self, finalized_root: H256) -> Result<Vec<H256>, Error> {
        let finalized = self
            .blocks
            .get(&finalized_root)
            .cloned()
            .ok_or(Error::UnknownBlock {
                root: finalized_root,
            })?;

        let mut retained = HashSet::new();
        retained.insert(finalized_root);

        let mut queue = vec![finalized_root];
        while let Some(current) = queue.pop() {
            for child in self.children(current).map(|child| child.root).collect::<Vec<_>>() {
                retained.insert(child);
                queue.push(child);
            }
        }

        let pruned = self
            .blocks
            .keys()
            .copied()
            .filter(|root| !retained.contains(root))
            .collect::<Vec<_>>();

        for root in &pruned {
            self.remove(*root);
        }

        // Detach the new tail from its ancestors so the pruned chain can be
        // dropped.
        let new_tail = Arc::new(BlockRef {
            root: finalized.root,
            slot: finalized.slot,
            parent: None,
            execution_valid: AtomicBool::new(finalized.execution_valid()),
        });

        self.blocks.insert(finalized_root, new_tail.clone());
        self.reparent_children_of(finalized_root, &new_tail);
        self.tail = new_tail;

        if !self.blocks.contains_key(&self.head.root) {
            self.head = self.tail.clone();
        }

        Ok(pruned)
    }

    fn reparent_children_of(&mut self, parent_root: H256, new_parent: &Arc<BlockRef>) {
        let mut queue = vec![(parent_root, new_parent.clone())];

        while let Some((current_root, current_parent)) = queue.pop() {
            let children = self
                .children(current_root)
                .map(|child| child.root)
                .collect::<Vec<_>>();

            for child_root in children {
                if let Some(child) = self.blocks.get(&child_root) {
                    let replacement = Arc::new(BlockRef {
                        root: child.root,
                        slot: child.slot,
                        parent: Some(current_parent.clone()),
                        execution_valid: AtomicBool::new(child.execution_valid()),
                    });

                    self.blocks.insert(child_root, replacement.clone());
                    queue.push((child_root, replacement));
                }
            }
        }
    }

    fn remove(&mut self, root: H256) {
        let Some(block) = self.blocks.remove(&root) else {
            return;
        };

        // Unlink from the parent's child list.
        if let Some(parent_root) = block.parent_root() {
            let next_sibling = self
                .links
                .get(&root)
                .and_then(|links| links.next_sibling);

            if let Some(parent_links) = self.links.get_mut(&parent_root) {
                if parent_links.first_child == Some(root) {
                    parent_links.first_child = next_sibling;
                } else {
                    let mut current = parent_links.first_child;

                    while let Some(sibling_root) = current {
                        let sibling_next = self
                            .links
                            .get(&sibling_root)
                            .and_then(|links| links.next_sibling);

                        if sibling_next == Some(root) {
                            if let Some(sibling_links) = self.links.get_mut(&sibling_root) {
                                sibling_links.next_sibling = next_sibling;
                            }
                            break;
                        }

                        current = sibling_next;
                    }
                }
            }
        }

        self.links.remove(&root);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root(byte: u8) -> H256 {
        H256::repeat_byte(byte)
    }

    fn sample_dag() -> BlockDag {
        // 0 ── 1 ── 2 ── 4
        //           └─── 3
        let mut dag = BlockDag::new(root(0), 0);
        assert!(matches!(
            dag.add_block(root(1), 1, root(0)),
            BlockAction::Admitted(_),
        ));
        assert!(matches!(
            dag.add_block(root(2), 2, root(1)),
            BlockAction::Admitted(_),
        ));
        assert!(matches!(
            dag.add_block(root(3), 3, root(2)),
            BlockAction::Admitted(_),
        ));
        assert!(matches!(
            dag.add_block(root(4), 3, root(2)),
            BlockAction::Admitted(_),
        ));
        dag
    }

    #[test]
    fn adding_a_block_twice_reports_a_duplicate_and_leaves_the_dag_unchanged() {
        let mut dag = sample_dag();
        let count = dag.block_count();

        assert!(matches!(
            dag.add_block(root(3), 3, root(2)),
            BlockAction::Duplicate,
        ));
        assert_eq!(dag.block_count(), count);
    }

    #[test]
    fn blocks_with_unknown_parents_are_reported_as_missing() {
        let mut dag = sample_dag();

        assert!(matches!(
            dag.add_block(root(9), 9, root(8)),
            BlockAction::MissingParent,
        ));
    }

    #[test]
    fn blocks_not_after_their_parents_are_unviable() {
        let mut dag = sample_dag();

        assert!(matches!(
            dag.add_block(root(9), 2, root(2)),
            BlockAction::Unviable,
        ));
        assert!(dag.is_known_unviable(root(9)));
    }

    #[test]
    fn blocks_below_the_tail_are_unviable() {
        let mut dag = sample_dag();
        dag.prune_to(root(2)).expect("root 2 is in the DAG");

        assert!(matches!(
            dag.add_block(root(9), 1, root(8)),
            BlockAction::Unviable,
        ));
    }

    #[test]
    fn descendants_of_unviable_blocks_are_unviable() {
        let mut dag = sample_dag();

        assert!(matches!(
            dag.add_block(root(9), 2, root(2)),
            BlockAction::Unviable,
        ));
        assert!(matches!(
            dag.add_block(root(10), 4, root(9)),
            BlockAction::Unviable,
        ));
    }

    #[test]
    fn ancestor_walks_follow_parent_links() {
        let dag = sample_dag();
        let tip = dag.get(root(4)).expect("root 4 is in the DAG").clone();

        assert_eq!(dag.get_ancestor_at_slot(&tip, 1).root, root(1));
        assert_eq!(dag.get_ancestor_at_slot(&tip, 0).root, root(0));

        let ancestor = dag.get(root(1)).expect("root 1 is in the DAG").clone();
        assert!(dag.is_ancestor_of(&ancestor, &tip));
        assert!(!dag.is_ancestor_of(&tip, &ancestor));
    }

    #[test]
    fn sibling_tips_are_both_heads() {
        let dag = sample_dag();

        let mut heads = dag
            .heads()
            .into_iter()
            .map(|block| block.root)
            .collect::<Vec<_>>();
        heads.sort();

        assert_eq!(heads, [root(3), root(4)]);
    }

    #[test]
    fn pruning_drops_branches_not_descended_from_the_new_tail() {
        let mut dag = sample_dag();
        assert!(matches!(
            dag.add_block(root(5), 2, root(1)),
            BlockAction::Admitted(_),
        ));

        let mut pruned = dag.prune_to(root(2)).expect("root 2 is in the DAG");
        pruned.sort();

        assert_eq!(pruned, [root(0), root(1), root(5)]);
        assert_eq!(dag.tail().root, root(2));
        assert!(dag.get(root(3)).is_some());
        assert!(dag.get(root(4)).is_some());
        assert!(dag.get(root(5)).is_none());
    }

    #[test]
    fn rebuild_walks_summaries_backward_from_the_head() {
        let summaries = [
            (root(1), BlockSummary { slot: 1, parent_root: root(0) }),
            (root(2), BlockSummary { slot: 2, parent_root: root(1) }),
            (root(3), BlockSummary { slot: 3, parent_root: root(2) }),
        ]
        .into_iter()
        .collect::<HashMap<_, _>>();

        let dag = BlockDag::rebuild(root(0), 0, root(3), |block_root| {
            summaries.get(&block_root).copied()
        })
        .expect("all summaries up to the tail are present");

        assert_eq!(dag.block_count(), 4);
        assert_eq!(dag.head().root, root(3));

        let head = dag.head().clone();
        assert_eq!(dag.get_ancestor_at_slot(&head, 0).root, root(0));
    }

    #[test]
    fn rebuild_fails_when_a_summary_is_missing() {
        let summaries = [(root(3), BlockSummary { slot: 3, parent_root: root(2) })]
            .into_iter()
            .collect::<HashMap<_, _>>();

        let result = BlockDag::rebuild(root(0), 0, root(3), |block_root| {
            summaries.get(&block_root).copied()
        });

        assert_eq!(result.err(), Some(Error::RebuildDidNotReachTail));
    }
}
