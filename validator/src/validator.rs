use std::{collections::HashMap, sync::Arc};

use anyhow::Result;
use bls::{PublicKeyBytes, SecretKey, SignatureBytes};
use clock::{Tick, TickKind};
use helper_functions::{accessors, misc, signing};
use log::{debug, info, warn};
use operation_pools::AttestationAggPool;
use slashing_protection::{
    AttestationVote, BlockProposal, SlashingProtector, SlashingValidationOutcome,
};
use ssz_types::{typenum::Unsigned as _, BitList, BitVector};
use tree_hash::TreeHash as _;
use types::{
    altair::{
        consts::{
            DOMAIN_CONTRIBUTION_AND_PROOF, DOMAIN_SYNC_COMMITTEE,
            DOMAIN_SYNC_COMMITTEE_SELECTION_PROOF,
        },
        containers::{
            ContributionAndProof, SignedContributionAndProof, SyncAggregate,
            SyncAggregatorSelectionData, SyncCommitteeContribution, SyncCommitteeMessage,
        },
    },
    bellatrix::containers::ExecutionPayload,
    combined::{BeaconBlock, BeaconState, SignedBeaconBlock},
    config::Config,
    nonstandard::Phase,
    phase0::{
        consts::{
            DOMAIN_AGGREGATE_AND_PROOF, DOMAIN_BEACON_ATTESTER, DOMAIN_BEACON_PROPOSER,
            DOMAIN_RANDAO, DOMAIN_SELECTION_PROOF,
        },
        containers::{
            AggregateAndProof, Attestation, AttestationData, Checkpoint,
            SignedAggregateAndProof,
        },
        primitives::{Epoch, ExecutionAddress, Slot, ValidatorIndex, H256},
    },
    preset::Preset,
    traits::BeaconState as UnphasedBeaconState,
};

use crate::misc::{AttesterDuty, ProposerDuty};

/// The execution layer, reduced to the one call block production needs.
pub trait ExecutionEngine<P: Preset>: Send + Sync {
    fn produce_payload(
        &self,
        parent_hash: H256,
        timestamp: u64,
        prev_randao: H256,
    ) -> Result<ExecutionPayload<P>>;
}

/// Where produced messages go. The network service implements this over its
/// gossip topics.
pub trait Publisher<P: Preset>: Send {
    fn publish_block(&mut self, block: Arc<SignedBeaconBlock<P>>);
    fn publish_attestation(&mut self, attestation: Attestation<P>);
    fn publish_aggregate(&mut self, aggregate: SignedAggregateAndProof<P>);
    fn publish_sync_committee_message(&mut self, message: SyncCommitteeMessage);
    fn publish_contribution(&mut self, contribution: SignedContributionAndProof<P>);
}

pub struct ValidatorConfig {
    pub graffiti: H256,
    pub fee_recipient: ExecutionAddress,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            graffiti: H256::zero(),
            fee_recipient: ExecutionAddress::zero(),
        }
    }
}

/// Computes duties for local validators and produces their messages at the
/// clock's deadlines.
///
/// Every signature is preceded by a durable slashing protection write. A
/// refusal there silently drops the duty; producing nothing is always safe.
pub struct Validator<P: Preset, E, Pub> {
    chain_config: Arc<Config>,
    validator_config: ValidatorConfig,
    own_validators: HashMap<PublicKeyBytes, Arc<SecretKey>>,
    slashing_protector: SlashingProtector,
    execution_engine: E,
    publisher: Pub,
    phantom: core::marker::PhantomData<P>,
}

impl<P: Preset, E: ExecutionEngine<P>, Pub: Publisher<P>> Validator<P, E, Pub> {
    pub fn new(
        chain_config: Arc<Config>,
        validator_config: ValidatorConfig,
        keys: impl IntoIterator<Item = SecretKey>,
        mut slashing_protector: SlashingProtector,
        execution_engine: E,
        publisher: Pub,
    ) -> Result<Self> {
        let own_validators = keys
            .into_iter()
            .map(|secret_key| {
                (
                    secret_key.to_public_key().to_bytes(),
                    Arc::new(secret_key),
                )
            })
            .collect::<HashMap<_, _>>();

        for pubkey in own_validators.keys() {
            slashing_protector.register_validator(*pubkey)?;
        }

        info!("loaded {} validator keys", own_validators.len());

        Ok(Self {
            chain_config,
            validator_config,
            own_validators,
            slashing_protector,
            execution_engine,
            publisher,
            phantom: core::marker::PhantomData,
        })
    }

    /// Handles one clock tick against a head snapshot.
    ///
    /// Each tick stands alone: a missed or failed duty never blocks a later
    /// slot.
    pub fn handle_tick(
        &mut self,
        tick: Tick,
        head_state: &BeaconState<P>,
        head_root: H256,
        pool: &mut AttestationAggPool<P>,
    ) {
        let result = match tick.kind {
            TickKind::Propose => self.propose(tick.slot, head_state, pool),
            TickKind::Attest => self
                .attest(tick.slot, head_state, head_root, pool)
                .and_then(|()| self.sync_committee_message(tick.slot, head_state, head_root)),
            TickKind::Aggregate => self
                .aggregate(tick.slot, head_state, head_root, pool)
                .and_then(|()| self.contribute(tick.slot, head_state, head_root)),
        };

        if let Err(error) = result {
            warn!("duty at slot {} failed: {error:#}", tick.slot);
        }
    }

    /// Attester duties for local validators, computed one epoch ahead so
    /// subnet subscriptions can be set up in time.
    pub fn attester_duties(
        &self,
        state: &BeaconState<P>,
        epoch: Epoch,
    ) -> Result<Vec<AttesterDuty>> {
        let own_indices = self.own_validator_indices(state);
        let unphased = state.as_unphased();
        let mut duties = vec![];

        let committees_per_slot = accessors::get_committee_count_per_slot(unphased, epoch);
        let start_slot = misc::compute_start_slot_at_epoch::<P>(epoch);

        for slot in start_slot..start_slot + P::SLOTS_PER_EPOCH.get() {
            for committee_index in 0..committees_per_slot {
                let committee = accessors::beacon_committee(unphased, slot, committee_index)?;

                for (position, validator_index) in committee.iter().enumerate() {
                    if own_indices.contains_key(validator_index) {
                        duties.push(AttesterDuty {
                            validator_index: *validator_index,
                            slot,
                            committee_index,
                            committee_position: position,
                            committee_size: committee.len(),
                        });
                    }
                }
            }
        }

        Ok(duties)
    }

    pub fn proposer_duty(&self, state: &BeaconState<P>) -> Result<Option<ProposerDuty>> {
        let proposer_index = accessors::get_beacon_proposer_index(state.as_unphased())?;

        let own = self
            .own_validator_indices(state)
            .contains_key(&proposer_index);

        Ok(own.then_some(ProposerDuty {
            validator_index: proposer_index,
            slot: state.slot(),
        }))
    }

    fn propose(
        &mut self,
        slot: Slot,
        head_state: &BeaconState<P>,
        pool: &mut AttestationAggPool<P>,
    ) -> Result<()> {
        let state = state_at_slot(&self.chain_config, head_state, slot)?;

        let proposer_index = accessors::get_beacon_proposer_index(state.as_unphased())?;

        let Some((pubkey, secret_key)) = self.key_for_index(&state, proposer_index) else {
            return Ok(());
        };

        let epoch = misc::compute_epoch_at_slot::<P>(slot);

        let randao_domain =
            accessors::get_domain(&self.chain_config, state.as_unphased(), DOMAIN_RANDAO, None);
        let randao_reveal = signing::sign(&secret_key, &epoch, randao_domain);

        let block = self.build_block(slot, proposer_index, &state, randao_reveal, pool)?;

        // The slashing protection record must be durable before any
        // signature exists.
        let outcome = self.slashing_protector.validate_and_store_proposal(
            pubkey,
            BlockProposal {
                slot,
                signing_root: Some(block.hash_tree_root()),
            },
        )?;

        match outcome {
            SlashingValidationOutcome::Accept => {}
            SlashingValidationOutcome::Ignore => return Ok(()),
            SlashingValidationOutcome::Reject(error) => {
                warn!("refusing to sign block proposal at slot {slot}: {error}");
                return Ok(());
            }
        }

        let proposer_domain = accessors::get_domain(
            &self.chain_config,
            state.as_unphased(),
            DOMAIN_BEACON_PROPOSER,
            None,
        );

        let signing_root =
            signing::compute_signing_root_from_root(block.hash_tree_root(), proposer_domain);
        let signature = secret_key.sign(signing_root).to_bytes();
        let signed_block = Arc::new(block.with_signature(signature));

        info!("proposing block at slot {slot}");
        self.publisher.publish_block(signed_block);

        Ok(())
    }

    fn build_block(
        &self,
        slot: Slot,
        proposer_index: ValidatorIndex,
        state: &BeaconState<P>,
        randao_reveal: SignatureBytes,
        pool: &mut AttestationAggPool<P>,
    ) -> Result<BeaconBlock<P>> {
        // Slot processing already filled in the parent header's state root.
        let parent_root = state.as_unphased().latest_block_header().tree_hash_root();

        let attestations = ssz_types::VariableList::new(pool.best_aggregates_for_block(slot))
            .expect("the pool limits aggregates to the protocol maximum");

        let eth1_data = state.as_unphased().eth1_data();
        let graffiti = self.validator_config.graffiti;

        let block = match self.chain_config.phase_at_slot::<P>(slot) {
            Phase::Phase0 => BeaconBlock::Phase0(types::phase0::containers::BeaconBlock {
                slot,
                proposer_index,
                parent_root,
                state_root: H256::zero(),
                body: types::phase0::containers::BeaconBlockBody {
                    randao_reveal,
                    eth1_data,
                    graffiti,
                    attestations,
                    ..Default::default()
                },
            }),
            Phase::Altair => BeaconBlock::Altair(types::altair::containers::BeaconBlock {
                slot,
                proposer_index,
                parent_root,
                state_root: H256::zero(),
                body: types::altair::containers::BeaconBlockBody {
                    randao_reveal,
                    eth1_data,
                    graffiti,
                    attestations,
                    sync_aggregate: empty_sync_aggregate::<P>(),
                    ..Default::default()
                },
            }),
            Phase::Bellatrix => {
                let (parent_hash, prev_randao, timestamp) = match state {
                    BeaconState::Bellatrix(state) => (
                        state.latest_execution_payload_header.block_hash,
                        accessors::get_randao_mix(state, misc::compute_epoch_at_slot::<P>(slot)),
                        state.genesis_time + slot * self.chain_config.seconds_per_slot.get(),
                    ),
                    _ => anyhow::bail!("bellatrix blocks require a bellatrix state"),
                };

                let execution_payload = self.execution_engine.produce_payload(
                    parent_hash,
                    timestamp,
                    prev_randao,
                )?;

                BeaconBlock::Bellatrix(types::bellatrix::containers::BeaconBlock {
                    slot,
                    proposer_index,
                    parent_root,
                    state_root: H256::zero(),
                    body: types::bellatrix::containers::BeaconBlockBody {
                        randao_reveal,
                        eth1_data,
                        graffiti,
                        attestations,
                        sync_aggregate: empty_sync_aggregate::<P>(),
                        execution_payload,
                        ..Default::default()
                    },
                })
            }
        };

        Ok(block)
    }

    fn attest(
        &mut self,
        slot: Slot,
        head_state: &BeaconState<P>,
        head_root: H256,
        pool: &mut AttestationAggPool<P>,
    ) -> Result<()> {
        let state = state_at_slot(&self.chain_config, head_state, slot)?;
        let epoch = misc::compute_epoch_at_slot::<P>(slot);

        let duties = self
            .attester_duties(&state, epoch)?
            .into_iter()
            .filter(|duty| duty.slot == slot)
            .collect::<Vec<_>>();

        if duties.is_empty() {
            return Ok(());
        }

        let attester_domain = accessors::get_domain(
            &self.chain_config,
            state.as_unphased(),
            DOMAIN_BEACON_ATTESTER,
            Some(epoch),
        );

        for duty in duties {
            let Some((pubkey, secret_key)) = self.key_for_index(&state, duty.validator_index)
            else {
                continue;
            };

            let data = self.attestation_data(&state, head_root, slot, epoch, duty)?;

            let outcome = self.slashing_protector.validate_and_store_attestation(
                pubkey,
                AttestationVote {
                    source_epoch: data.source.epoch,
                    target_epoch: data.target.epoch,
                    signing_root: Some(signing::compute_signing_root(&data, attester_domain)),
                },
            )?;

            match outcome {
                SlashingValidationOutcome::Accept => {}
                SlashingValidationOutcome::Ignore => continue,
                SlashingValidationOutcome::Reject(error) => {
                    warn!(
                        "refusing to sign attestation by validator {}: {error}",
                        duty.validator_index,
                    );
                    continue;
                }
            }

            let signature = signing::sign(&secret_key, &data, attester_domain);

            let mut aggregation_bits = BitList::with_capacity(duty.committee_size)
                .expect("the committee size is below the maximum");
            aggregation_bits
                .set(duty.committee_position, true)
                .expect("the committee position is below the committee size");

            let attestation = Attestation {
                aggregation_bits,
                data,
                signature,
            };

            debug!(
                "attesting at slot {slot} in committee {} as validator {}",
                duty.committee_index, duty.validator_index,
            );

            pool.add_attestation(attestation.clone());
            self.publisher.publish_attestation(attestation);
        }

        Ok(())
    }

    fn aggregate(
        &mut self,
        slot: Slot,
        head_state: &BeaconState<P>,
        head_root: H256,
        pool: &mut AttestationAggPool<P>,
    ) -> Result<()> {
        let state = state_at_slot(&self.chain_config, head_state, slot)?;
        let epoch = misc::compute_epoch_at_slot::<P>(slot);

        let selection_domain = accessors::get_domain(
            &self.chain_config,
            state.as_unphased(),
            DOMAIN_SELECTION_PROOF,
            Some(epoch),
        );

        let aggregate_domain = accessors::get_domain(
            &self.chain_config,
            state.as_unphased(),
            DOMAIN_AGGREGATE_AND_PROOF,
            Some(epoch),
        );

        for duty in self
            .attester_duties(&state, epoch)?
            .into_iter()
            .filter(|duty| duty.slot == slot)
        {
            let Some((_, secret_key)) = self.key_for_index(&state, duty.validator_index) else {
                continue;
            };

            let selection_proof = signing::sign(&secret_key, &slot, selection_domain);

            if !is_aggregator::<P>(duty.committee_size, selection_proof) {
                continue;
            }

            let data = self.attestation_data(&state, head_root, slot, epoch, duty)?;

            let Some(aggregate) = pool.aggregate_for(data) else {
                continue;
            };

            let message = AggregateAndProof {
                aggregator_index: duty.validator_index,
                aggregate,
                selection_proof,
            };

            let signature = signing::sign(&secret_key, &message, aggregate_domain);

            debug!(
                "publishing aggregate for committee {} at slot {slot}",
                duty.committee_index,
            );

            self.publisher.publish_aggregate(SignedAggregateAndProof {
                message,
                signature,
            });
        }

        Ok(())
    }

    fn attestation_data(
        &self,
        state: &BeaconState<P>,
        head_root: H256,
        slot: Slot,
        epoch: Epoch,
        duty: AttesterDuty,
    ) -> Result<AttestationData> {
        Ok(AttestationData {
            slot,
            index: duty.committee_index,
            beacon_block_root: head_root,
            source: state.as_unphased().current_justified_checkpoint(),
            target: Checkpoint {
                epoch,
                root: target_root(state, head_root, epoch)?,
            },
        })
    }

    fn sync_committee_message(
        &mut self,
        slot: Slot,
        head_state: &BeaconState<P>,
        head_root: H256,
    ) -> Result<()> {
        let members = self.own_sync_committee_members(head_state);

        if members.is_empty() {
            return Ok(());
        }

        let domain = accessors::get_domain(
            &self.chain_config,
            head_state.as_unphased(),
            DOMAIN_SYNC_COMMITTEE,
            None,
        );

        for (validator_index, _, secret_key) in members {
            let signature = signing::sign(&secret_key, &head_root, domain);

            self.publisher
                .publish_sync_committee_message(SyncCommitteeMessage {
                    slot,
                    beacon_block_root: head_root,
                    validator_index,
                    signature,
                });
        }

        Ok(())
    }

    fn contribute(
        &mut self,
        slot: Slot,
        head_state: &BeaconState<P>,
        head_root: H256,
    ) -> Result<()> {
        let members = self.own_sync_committee_members(head_state);

        if members.is_empty() {
            return Ok(());
        }

        let unphased = head_state.as_unphased();

        let message_domain =
            accessors::get_domain(&self.chain_config, unphased, DOMAIN_SYNC_COMMITTEE, None);
        let selection_domain = accessors::get_domain(
            &self.chain_config,
            unphased,
            DOMAIN_SYNC_COMMITTEE_SELECTION_PROOF,
            None,
        );
        let contribution_domain = accessors::get_domain(
            &self.chain_config,
            unphased,
            DOMAIN_CONTRIBUTION_AND_PROOF,
            None,
        );

        let subcommittee_size = P::SyncSubcommitteeSize::to_usize();

        for (validator_index, committee_position, secret_key) in members {
            let subcommittee_index = (committee_position / subcommittee_size) as u64;

            let selection_data = SyncAggregatorSelectionData {
                slot,
                subcommittee_index,
            };

            let selection_proof =
                signing::sign(&secret_key, &selection_data, selection_domain);

            if !is_sync_aggregator::<P>(selection_proof) {
                continue;
            }

            let mut aggregation_bits = BitVector::default();
            aggregation_bits
                .set(committee_position % subcommittee_size, true)
                .expect("the position is below the subcommittee size");

            let contribution = SyncCommitteeContribution {
                slot,
                beacon_block_root: head_root,
                subcommittee_index,
                aggregation_bits,
                signature: signing::sign(&secret_key, &head_root, message_domain),
            };

            let message = ContributionAndProof {
                aggregator_index: validator_index,
                contribution,
                selection_proof,
            };

            let signature = signing::sign(&secret_key, &message, contribution_domain);

            self.publisher
                .publish_contribution(SignedContributionAndProof { message, signature });
        }

        Ok(())
    }

    fn own_sync_committee_members(
        &self,
        state: &BeaconState<P>,
    ) -> Vec<(ValidatorIndex, usize, Arc<SecretKey>)> {
        let committee_pubkeys = match state {
            BeaconState::Phase0(_) => return vec![],
            BeaconState::Altair(state) => &state.current_sync_committee.pubkeys,
            BeaconState::Bellatrix(state) => &state.current_sync_committee.pubkeys,
        };

        let own_indices = self.own_validator_indices(state);
        let indices_by_pubkey = own_indices
            .iter()
            .map(|(index, pubkey)| (*pubkey, *index))
            .collect::<HashMap<_, _>>();

        committee_pubkeys
            .iter()
            .enumerate()
            .filter_map(|(position, pubkey)| {
                let validator_index = *indices_by_pubkey.get(pubkey)?;
                let secret_key = self.own_validators.get(pubkey)?.clone();
                Some((validator_index, position, secret_key))
            })
            .collect()
    }

    /// Local validators resolved to their registry indices.
    fn own_validator_indices(
        &self,
        state: &BeaconState<P>,
    ) -> HashMap<ValidatorIndex, PublicKeyBytes> {
        state
            .as_unphased()
            .validators()
            .iter()
            .enumerate()
            .filter(|(_, validator)| self.own_validators.contains_key(&validator.pubkey))
            .map(|(index, validator)| (index as ValidatorIndex, validator.pubkey))
            .collect()
    }

    fn key_for_index(
        &self,
        state: &BeaconState<P>,
        validator_index: ValidatorIndex,
    ) -> Option<(PublicKeyBytes, Arc<SecretKey>)> {
        let pubkey = state
            .as_unphased()
            .validators()
            .get(validator_index as usize)
            .map(|validator| validator.pubkey)?;

        let secret_key = self.own_validators.get(&pubkey)?.clone();

        Some((pubkey, secret_key))
    }
}

fn empty_sync_aggregate<P: Preset>() -> SyncAggregate<P> {
    SyncAggregate {
        sync_committee_bits: BitVector::default(),
        sync_committee_signature: bls::AggregateSignatureBytes::empty(),
    }
}

fn is_aggregator<P: Preset>(committee_size: usize, selection_proof: SignatureBytes) -> bool {
    let modulo = (committee_size as u64 / P::TARGET_AGGREGATORS_PER_COMMITTEE.get()).max(1);

    selection_value(selection_proof) % modulo == 0
}

fn is_sync_aggregator<P: Preset>(selection_proof: SignatureBytes) -> bool {
    let modulo = (P::sync_committee_size()
        / P::SYNC_COMMITTEE_SUBNET_COUNT.get()
        / P::TARGET_AGGREGATORS_PER_COMMITTEE.get())
    .max(1);

    selection_value(selection_proof) % modulo == 0
}

fn selection_value(selection_proof: SignatureBytes) -> u64 {
    let digest = hashing::hash_256(selection_proof.as_bytes());

    u64::from_le_bytes(
        digest.as_bytes()[..8]
            .try_into()
            .expect("the slice is exactly 8 bytes long"),
    )
}

/// Advances a copy of the head state to `slot` when it is behind.
fn state_at_slot<P: Preset>(
    config: &Config,
    head_state: &BeaconState<P>,
    slot: Slot,
) -> Result<BeaconState<P>> {
    let mut state = head_state.clone();

    if state.slot() < slot {
        transition_functions::combined::process_slots(config, &mut state, slot)?;
    }

    Ok(state)
}

/// The epoch boundary root for attestation targets; the head itself when
/// the epoch starts at or after the head.
fn target_root<P: Preset>(
    state: &BeaconState<P>,
    head_root: H256,
    epoch: Epoch,
) -> Result<H256> {
    let start_slot = misc::compute_start_slot_at_epoch::<P>(epoch);

    if start_slot >= state.slot() {
        return Ok(head_root);
    }

    accessors::get_block_root(state.as_unphased(), epoch).map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use types::preset::Mainnet;

    use super::*;

    #[test]
    fn the_empty_sync_aggregate_carries_the_infinity_signature() {
        let aggregate = empty_sync_aggregate::<Mainnet>();

        assert!(aggregate.sync_committee_signature.is_empty());
        assert_eq!(aggregate.sync_committee_bits.num_set_bits(), 0);
    }

    #[test]
    fn aggregator_selection_is_deterministic() {
        let proof = SignatureBytes::repeat_byte(3);

        assert_eq!(
            is_aggregator::<Mainnet>(128, proof),
            is_aggregator::<Mainnet>(128, proof),
        );
    }
}
