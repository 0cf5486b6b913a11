use std::{collections::HashMap, sync::Arc};

use types::phase0::{
    containers::Checkpoint,
    primitives::{Epoch, Gwei, ValidatorIndex, H256},
};

use crate::{
    block_dag::{BlockDag, BlockRef},
    error::Error,
};

/// A validator's most recent accepted vote.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct LatestVote {
    pub root: H256,
    pub epoch: Epoch,
    pub balance: Gwei,
}

/// LMD-GHOST over the block DAG.
///
/// The weight of a block is the sum of effective balances of validators
/// whose latest vote is for it or one of its descendants. Weights are kept
/// as per-node subtree sums and adjusted along ancestor paths when votes
/// move, so `get_head` only inspects children.
pub struct Store {
    justified_checkpoint: Checkpoint,
    finalized_checkpoint: Checkpoint,
    latest_votes: HashMap<ValidatorIndex, LatestVote>,
    weights: HashMap<H256, Gwei>,
}

impl Store {
    #[must_use]
    pub fn new(justified_checkpoint: Checkpoint, finalized_checkpoint: Checkpoint) -> Self {
        Self {
            justified_checkpoint,
            finalized_checkpoint,
            latest_votes: HashMap::new(),
            weights: HashMap::new(),
        }
    }

    #[must_use]
    pub const fn justified_checkpoint(&self) -> Checkpoint {
        self.justified_checkpoint
    }

    #[must_use]
    pub const fn finalized_checkpoint(&self) -> Checkpoint {
        self.finalized_checkpoint
    }

    #[must_use]
    pub fn latest_vote(&self, validator_index: ValidatorIndex) -> Option<LatestVote> {
        self.latest_votes.get(&validator_index).copied()
    }

    /// Registers a block. Blocks start with no weight of their own.
    pub fn apply_block(&mut self, block: &Arc<BlockRef>) {
        self.weights.entry(block.root).or_insert(0);
    }

    /// Updates a validator's latest vote and moves its balance from the old
    /// vote's path to the new one.
    ///
    /// Votes for unknown blocks are rejected; votes older than the current
    /// latest are ignored without effect.
    pub fn apply_attestation(
        &mut self,
        dag: &BlockDag,
        validator_index: ValidatorIndex,
        target_root: H256,
        target_epoch: Epoch,
        balance: Gwei,
    ) -> Result<(), Error> {
        let Some(target) = dag.get(target_root).cloned() else {
            return Err(Error::UnknownVoteTarget { root: target_root });
        };

        if let Some(previous) = self.latest_votes.get(&validator_index).copied() {
            if previous.epoch >= target_epoch {
                return Ok(());
            }

            if let Some(previous_target) = dag.get(previous.root).cloned() {
                self.adjust_branch(dag, &previous_target, |weight| {
                    *weight = weight.saturating_sub(previous.balance);
                });
            }
        }

        self.latest_votes.insert(
            validator_index,
            LatestVote {
                root: target_root,
                epoch: target_epoch,
                balance,
            },
        );

        self.adjust_branch(dag, &target, |weight| {
            *weight = weight.saturating_add(balance);
        });

        Ok(())
    }

    fn adjust_branch(
        &mut self,
        dag: &BlockDag,
        from: &Arc<BlockRef>,
        mut adjust: impl FnMut(&mut Gwei),
    ) {
        let mut current = Some(from.clone());

        while let Some(block) = current {
            adjust(self.weights.entry(block.root).or_insert(0));

            if block.root == dag.tail().root {
                break;
            }

            current = block.parent.clone();
        }
    }

    #[must_use]
    pub fn weight(&self, root: H256) -> Gwei {
        self.weights.get(&root).copied().unwrap_or(0)
    }

    /// Walks from the justified block to the heaviest leaf.
    ///
    /// Ties break toward the larger root so that all nodes converge on the
    /// same head regardless of arrival order.
    pub fn get_head(&self, dag: &BlockDag) -> Result<Arc<BlockRef>, Error> {
        let start_root = if self.justified_checkpoint.root.is_zero() {
            dag.tail().root
        } else {
            self.justified_checkpoint.root
        };

        let mut current = dag
            .get(start_root)
            .cloned()
            .ok_or(Error::UnknownBlock { root: start_root })?;

        loop {
            let best_child = dag
                .children(current.root)
                .filter(|child| child.execution_valid())
                .max_by_key(|child| (self.weight(child.root), child.root));

            match best_child {
                Some(child) => current = child.clone(),
                None => return Ok(current),
            }
        }
    }

    /// Advances the tracked checkpoints. Finalization never moves backward.
    pub fn update_checkpoints(&mut self, justified: Checkpoint, finalized: Checkpoint) {
        if justified.epoch > self.justified_checkpoint.epoch {
            self.justified_checkpoint = justified;
        }

        if finalized.epoch > self.finalized_checkpoint.epoch {
            self.finalized_checkpoint = finalized;
        }
    }

    /// Drops bookkeeping for pruned blocks and votes below the finalized
    /// root.
    pub fn prune(&mut self, pruned_roots: &[H256]) {
        for root in pruned_roots {
            self.weights.remove(root);
        }

        self.latest_votes
            .retain(|_, vote| !pruned_roots.contains(&vote.root));
    }
}

#[cfg(test)]
mod tests {
    use itertools::Itertools as _;

    use crate::block_dag::BlockAction;

    use super::*;

    fn root(byte: u8) -> H256 {
        H256::repeat_byte(byte)
    }

    fn checkpoint(epoch: Epoch, byte: u8) -> Checkpoint {
        Checkpoint {
            epoch,
            root: root(byte),
        }
    }

    /// ```text
    /// 0 ── 9 ── A(10)
    ///      └─── B(10)
    /// ```
    fn forked_dag() -> BlockDag {
        let mut dag = BlockDag::new(root(0), 0);

        for (block_root, slot, parent) in [
            (root(9), 9, root(0)),
            (root(0xaa), 10, root(9)),
            (root(0xbb), 10, root(9)),
        ] {
            assert!(matches!(
                dag.add_block(block_root, slot, parent),
                BlockAction::Admitted(_),
            ));
        }

        dag
    }

    #[test]
    fn head_follows_the_heavier_sibling_through_reorgs() {
        let dag = forked_dag();
        let mut store = Store::new(checkpoint(0, 0), checkpoint(0, 0));

        // 100 Gwei on A.
        store
            .apply_attestation(&dag, 1, root(0xaa), 1, 100)
            .expect("the vote target is known");

        assert_eq!(
            store.get_head(&dag).expect("the DAG is nonempty").root,
            root(0xaa),
        );

        // 110 Gwei on B. Head reorgs to B.
        store
            .apply_attestation(&dag, 2, root(0xbb), 1, 110)
            .expect("the vote target is known");

        assert_eq!(
            store.get_head(&dag).expect("the DAG is nonempty").root,
            root(0xbb),
        );

        // A accumulates 120 in total. Head returns to A.
        store
            .apply_attestation(&dag, 3, root(0xaa), 1, 20)
            .expect("the vote target is known");

        assert_eq!(
            store.get_head(&dag).expect("the DAG is nonempty").root,
            root(0xaa),
        );
    }

    #[test]
    fn head_is_permutation_invariant_over_disjoint_validators() {
        let votes = [
            (1, root(0xaa), 100),
            (2, root(0xbb), 60),
            (3, root(0xbb), 50),
            (4, root(0xaa), 20),
        ];

        let heads = votes
            .iter()
            .copied()
            .permutations(votes.len())
            .map(|ordering| {
                let dag = forked_dag();
                let mut store = Store::new(checkpoint(0, 0), checkpoint(0, 0));

                for (validator_index, target, balance) in ordering {
                    store
                        .apply_attestation(&dag, validator_index, target, 1, balance)
                        .expect("the vote target is known");
                }

                store.get_head(&dag).expect("the DAG is nonempty").root
            })
            .unique()
            .collect::<Vec<_>>();

        assert_eq!(heads, [root(0xaa)]);
    }

    #[test]
    fn ties_break_toward_the_larger_root() {
        let dag = forked_dag();
        let mut store = Store::new(checkpoint(0, 0), checkpoint(0, 0));

        store
            .apply_attestation(&dag, 1, root(0xaa), 1, 100)
            .expect("the vote target is known");
        store
            .apply_attestation(&dag, 2, root(0xbb), 1, 100)
            .expect("the vote target is known");

        assert_eq!(
            store.get_head(&dag).expect("the DAG is nonempty").root,
            root(0xbb),
        );
    }

    #[test]
    fn a_new_vote_replaces_the_validators_previous_vote() {
        let dag = forked_dag();
        let mut store = Store::new(checkpoint(0, 0), checkpoint(0, 0));

        store
            .apply_attestation(&dag, 1, root(0xaa), 1, 100)
            .expect("the vote target is known");
        store
            .apply_attestation(&dag, 1, root(0xbb), 2, 100)
            .expect("the vote target is known");

        assert_eq!(store.weight(root(0xaa)), 0);
        assert_eq!(store.weight(root(0xbb)), 100);
    }

    #[test]
    fn stale_votes_are_ignored() {
        let dag = forked_dag();
        let mut store = Store::new(checkpoint(0, 0), checkpoint(0, 0));

        store
            .apply_attestation(&dag, 1, root(0xaa), 5, 100)
            .expect("the vote target is known");
        store
            .apply_attestation(&dag, 1, root(0xbb), 4, 100)
            .expect("the vote target is known");

        assert_eq!(store.weight(root(0xaa)), 100);
        assert_eq!(store.weight(root(0xbb)), 0);
    }

    #[test]
    fn finalization_is_monotone() {
        let mut store = Store::new(checkpoint(1, 1), checkpoint(1, 1));

        store.update_checkpoints(checkpoint(3, 3), checkpoint(2, 2));
        assert_eq!(store.finalized_checkpoint().epoch, 2);

        store.update_checkpoints(checkpoint(2, 9), checkpoint(1, 9));
        assert_eq!(store.justified_checkpoint(), checkpoint(3, 3));
        assert_eq!(store.finalized_checkpoint(), checkpoint(2, 2));
    }
}
