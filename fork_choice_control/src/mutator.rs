use std::{
    collections::HashMap,
    sync::{mpsc::Receiver, Arc},
};

use anyhow::Result;
use fork_choice_store::{BlockAction, BlockDag, Quarantine, Store};
use log::{debug, info, warn};
use transition_functions::{combined, SignatureStrategy, StateRootPolicy};
use types::{
    combined::{BeaconState, SignedBeaconBlock},
    phase0::primitives::{Epoch, H256},
    preset::Preset,
};

use crate::{
    messages::{BlockOrigin, MutatorEvent, MutatorMessage},
    storage::Storage,
};

/// The event loop that owns all consensus state.
///
/// Messages are handled one at a time. Within one handler, database writes
/// are transactional, a block lands in the DAG before any of its
/// attestations are credited, and the head is recomputed only after the
/// state transition has been committed.
pub struct Mutator<P: Preset> {
    dag: BlockDag,
    store: Store,
    quarantine: Quarantine<Arc<SignedBeaconBlock<P>>>,
    storage: Storage<P>,
    /// Post-states of unfinalized blocks by block root. Pruned at
    /// finalization; missing entries are reloaded from storage.
    state_cache: HashMap<H256, Arc<BeaconState<P>>>,
    receiver: Receiver<MutatorMessage<P>>,
    on_event: Box<dyn FnMut(MutatorEvent<P>) + Send>,
}

impl<P: Preset> Mutator<P> {
    pub fn new(
        dag: BlockDag,
        store: Store,
        storage: Storage<P>,
        anchor_state: Arc<BeaconState<P>>,
        receiver: Receiver<MutatorMessage<P>>,
        on_event: Box<dyn FnMut(MutatorEvent<P>) + Send>,
    ) -> Self {
        let anchor_root = dag.tail().root;

        let mut state_cache = HashMap::new();
        state_cache.insert(anchor_root, anchor_state);

        Self {
            dag,
            store,
            quarantine: Quarantine::new(fork_choice_store::DEFAULT_QUARANTINE_CAPACITY),
            storage,
            state_cache,
            receiver,
            on_event,
        }
    }

    /// Runs until the channel closes or a [`MutatorMessage::Stop`] arrives.
    pub fn run(mut self) -> Result<()> {
        while let Ok(message) = self.receiver.recv() {
            match message {
                MutatorMessage::Block { block, origin } => {
                    self.handle_block(block, origin);
                }
                MutatorMessage::Attestation {
                    validator_index,
                    target_root,
                    target_epoch,
                    balance,
                } => {
                    self.handle_attestation(validator_index, target_root, target_epoch, balance);
                }
                MutatorMessage::Tick(tick) => {
                    if tick.is_start_of_epoch::<P>() {
                        if let Err(error) = self.advance_finality() {
                            warn!("failed to advance finality: {error:#}");
                        }
                    }
                }
                MutatorMessage::Stop => break,
            }
        }

        Ok(())
    }

    fn handle_block(&mut self, block: Arc<SignedBeaconBlock<P>>, origin: BlockOrigin) {
        let root = block.block_root();

        match self.offer_block(block.clone(), origin) {
            Ok(admitted) => {
                if admitted {
                    self.drain_quarantined_children(root);
                }
            }
            Err(error) => {
                debug!("block {root:?} rejected: {error:#}");

                let poisoned = self.dag.mark_unviable(root);
                self.store.prune(&poisoned);

                for descendant in self.quarantine.mark_unviable(root) {
                    debug!("quarantined descendant {descendant:?} poisoned");
                }

                (self.on_event)(MutatorEvent::BlockRejected {
                    root,
                    rejected_by_peer_fault: true,
                });
            }
        }
    }

    /// Returns whether the block was newly admitted to the DAG.
    fn offer_block(
        &mut self,
        block: Arc<SignedBeaconBlock<P>>,
        origin: BlockOrigin,
    ) -> Result<bool> {
        let root = block.block_root();
        let slot = block.slot();
        let parent_root = block.parent_root();

        if self.dag.contains(root) {
            return Ok(false);
        }

        if self.dag.is_known_unviable(root) || self.dag.is_known_unviable(parent_root) {
            anyhow::bail!(fork_choice_store::Error::Unviable { root, slot });
        }

        if !self.dag.contains(parent_root) {
            debug!("block {root:?} at slot {slot} is waiting for parent {parent_root:?}");
            self.quarantine.insert(root, slot, parent_root, block);
            return Ok(false);
        }

        let parent_state = self.state_of(parent_root)?;

        let mut state = parent_state.as_ref().clone();

        let signature_strategy = if origin.verify_signatures() {
            SignatureStrategy::VerifyAll
        } else {
            SignatureStrategy::Skip
        };

        combined::state_transition(
            self.storage.config(),
            &mut state,
            &block,
            signature_strategy,
            StateRootPolicy::Verify,
        )?;

        let state = Arc::new(state);

        // Persist before exposing. A crash after this point replays the
        // block from the database instead of the network.
        self.storage.with_many_writes(|storage, batch| {
            storage.queue_unfinalized_block(batch, &block)?;
            storage.queue_state(batch, &state, root)?;
            Ok(())
        })?;

        match self.dag.add_block(root, slot, parent_root) {
            BlockAction::Admitted(block_ref) => {
                self.store.apply_block(&block_ref);
            }
            BlockAction::Duplicate => return Ok(false),
            BlockAction::MissingParent | BlockAction::Unviable => {
                anyhow::bail!(fork_choice_store::Error::Unviable { root, slot });
            }
        }

        self.state_cache.insert(root, state.clone());

        self.store.update_checkpoints(
            state.as_unphased().current_justified_checkpoint(),
            state.as_unphased().finalized_checkpoint(),
        );

        (self.on_event)(MutatorEvent::BlockAdmitted {
            root,
            slot,
            block,
        });

        self.update_head()?;

        Ok(true)
    }

    fn drain_quarantined_children(&mut self, parent_root: H256) {
        let mut parents = vec![parent_root];

        while let Some(parent) = parents.pop() {
            for (child_root, child_block) in self.quarantine.drain_children(parent) {
                match self.offer_block(child_block, BlockOrigin::Requested) {
                    Ok(true) => parents.push(child_root),
                    Ok(false) => {}
                    Err(error) => {
                        debug!("quarantined block {child_root:?} rejected: {error:#}");

                        let poisoned = self.dag.mark_unviable(child_root);
                        self.store.prune(&poisoned);
                        self.quarantine.mark_unviable(child_root);
                    }
                }
            }
        }
    }

    fn handle_attestation(
        &mut self,
        validator_index: types::phase0::primitives::ValidatorIndex,
        target_root: H256,
        target_epoch: Epoch,
        balance: types::phase0::primitives::Gwei,
    ) {
        let result = self.store.apply_attestation(
            &self.dag,
            validator_index,
            target_root,
            target_epoch,
            balance,
        );

        match result {
            Ok(()) => {
                if let Err(error) = self.update_head() {
                    warn!("failed to update head: {error:#}");
                }
            }
            Err(error) => debug!(
                "attestation by validator {validator_index} not applied: {error:#}"
            ),
        }
    }

    fn update_head(&mut self) -> Result<()> {
        let head = self.store.get_head(&self.dag)?;

        if head.root == self.dag.head().root {
            return Ok(());
        }

        self.dag.update_head(head.root)?;

        self.storage.with_many_writes(|storage, batch| {
            storage.queue_head_block_root(batch, head.root);
            Ok(())
        })?;

        (self.on_event)(MutatorEvent::HeadChanged {
            root: head.root,
            slot: head.slot,
        });

        Ok(())
    }

    /// Prunes to the newest finalized block and advances the tail.
    fn advance_finality(&mut self) -> Result<()> {
        let finalized_checkpoint = self.store.finalized_checkpoint();

        if finalized_checkpoint.root.is_zero()
            || finalized_checkpoint.root == self.dag.tail().root
        {
            return Ok(());
        }

        let Some(finalized) = self.dag.get(finalized_checkpoint.root).cloned() else {
            // Finalization data can reference blocks this node has not
            // backfilled yet. Nothing to prune in that case.
            return Ok(());
        };

        info!(
            "finalized checkpoint advanced to {:?} at epoch {}",
            finalized.root, finalized_checkpoint.epoch,
        );

        // Move newly finalized blocks into the dense index.
        let mut current = finalized.clone();
        let mut newly_finalized = vec![];

        while current.root != self.dag.tail().root {
            if let Some(block) = self.storage.block_by_root(current.root)? {
                newly_finalized.push(block);
            }

            match &current.parent {
                Some(parent) => current = parent.clone(),
                None => break,
            }
        }

        self.storage.with_many_writes(|storage, batch| {
            for block in &newly_finalized {
                storage.queue_finalization_of(batch, block)?;
            }

            storage.queue_tail_block_root(batch, finalized.root);
            Ok(())
        })?;

        let pruned = self.dag.prune_to(finalized.root)?;
        self.store.prune(&pruned);

        for root in &pruned {
            self.state_cache.remove(root);
            self.storage.delete_block(*root)?;
        }

        // Stragglers below the new tail that never made it into the DAG.
        self.storage.prune_unfinalized_before(finalized.slot)?;

        self.state_cache
            .retain(|root, _| self.dag.contains(*root));

        (self.on_event)(MutatorEvent::Finalized {
            root: finalized.root,
            epoch: finalized_checkpoint.epoch,
        });

        Ok(())
    }

    fn state_of(&mut self, block_root: H256) -> Result<Arc<BeaconState<P>>> {
        if let Some(state) = self.state_cache.get(&block_root) {
            return Ok(state.clone());
        }

        let block = self
            .storage
            .block_by_root(block_root)?
            .ok_or(fork_choice_store::Error::UnknownBlock { root: block_root })?;

        let state_root = block.state_root();

        let state = self
            .storage
            .state_by_state_root(state_root)?
            .map(Arc::new)
            .ok_or(fork_choice_store::Error::UnknownBlock { root: block_root })?;

        self.state_cache.insert(block_root, state.clone());

        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use database::Database;
    use types::{config::Config, preset::Minimal};

    use super::*;

    fn test_mutator() -> Mutator<Minimal> {
        let anchor_state = Arc::new(BeaconState::Phase0(Default::default()));
        let anchor_root = H256::zero();

        let dag = BlockDag::new(anchor_root, 0);
        let store = Store::new(Default::default(), Default::default());
        let storage = Storage::new(Arc::new(Config::minimal()), Database::in_memory());

        let (_sender, receiver) = mpsc::channel();

        Mutator::new(
            dag,
            store,
            storage,
            anchor_state,
            receiver,
            Box::new(|_| {}),
        )
    }

    #[test]
    fn blocks_with_unknown_parents_wait_in_quarantine() {
        let mut mutator = test_mutator();

        let mut block = types::phase0::containers::SignedBeaconBlock::<Minimal>::default();
        block.message.slot = 3;
        block.message.parent_root = H256::repeat_byte(0x77);

        let block = Arc::new(SignedBeaconBlock::Phase0(block));
        let root = block.block_root();

        mutator.handle_block(block, BlockOrigin::Requested);

        assert!(mutator.quarantine.contains(root));
        assert!(!mutator.dag.contains(root));
    }

    #[test]
    fn block_origins_control_signature_verification() {
        assert!(BlockOrigin::Gossip.verify_signatures());
        assert!(BlockOrigin::Requested.verify_signatures());
        assert!(!BlockOrigin::Own.verify_signatures());
    }
}
