use core::marker::PhantomData;
use std::{borrow::Cow, sync::Arc};

use anyhow::{Error as AnyhowError, Result};
use bls::UncompressedPublicKeyBytes;
use database::Database;
use derive_more::Display;
use ssz::{Decode, Encode as _};
use thiserror::Error;
use types::{
    combined::{BeaconState, SignedBeaconBlock},
    config::Config,
    nonstandard::{BlockSummary, ImmutableValidator, Phase},
    phase0::{
        containers::DepositContractState,
        primitives::{Slot, ValidatorIndex, H256},
    },
    preset::Preset,
};

/// The schema with split state storage. The previous schema stored whole
/// states keyed by block root; it is read through for one release cycle and
/// never written.
pub const CURRENT_SCHEMA_VERSION: u64 = 2;
pub const LEGACY_SCHEMA_VERSION: u64 = 1;

/// Logical tables over one [`Database`], keyed by short printable prefixes.
///
/// Slots in keys are zero-padded decimal so lexicographic scans ascend by
/// slot. Block values are snappy-compressed: frame-less for phase0 and
/// altair, framed for bellatrix onward, matching how the same bytes travel
/// on the wire.
#[derive(Clone)]
pub struct Storage<P> {
    config: Arc<Config>,
    pub(crate) database: Arc<Database>,
    phantom: PhantomData<P>,
}

/// Pending writes that will land in one database transaction.
///
/// A body that returns an error commits nothing.
#[derive(Default)]
pub struct WriteBatch {
    pairs: Vec<(String, Vec<u8>)>,
}

impl WriteBatch {
    fn push(&mut self, key: impl core::fmt::Display, value: Vec<u8>) {
        self.pairs.push((key.to_string(), value));
    }
}

impl<P: Preset> Storage<P> {
    #[must_use]
    pub fn new(config: Arc<Config>, database: Database) -> Self {
        Self {
            config,
            database: Arc::new(database),
            phantom: PhantomData,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &Arc<Config> {
        &self.config
    }

    pub fn with_many_writes(
        &self,
        body: impl FnOnce(&Self, &mut WriteBatch) -> Result<()>,
    ) -> Result<()> {
        let mut batch = WriteBatch::default();
        body(self, &mut batch)?;
        self.database.put_batch(batch.pairs)
    }

    // Schema

    pub fn schema_version(&self) -> Result<u64> {
        match self.database.get(SchemaVersion.to_string())? {
            Some(bytes) => Ok(u64::from_ssz_bytes(&bytes).map_err(|_| Error::Corrupted {
                key: SchemaVersion.to_string(),
            })?),
            None => Ok(LEGACY_SCHEMA_VERSION),
        }
    }

    /// Stamps an empty or current-schema database. An older schema is left
    /// in place; its blocks and snapshot states remain readable while new
    /// writes target the current layout.
    pub fn initialize_schema(&self) -> Result<u64> {
        let is_empty = self.genesis_block_root()?.is_none()
            && self.database.get(SchemaVersion.to_string())?.is_none();

        if is_empty {
            self.database.put(
                SchemaVersion.to_string(),
                CURRENT_SCHEMA_VERSION.as_ssz_bytes(),
            )?;
            return Ok(CURRENT_SCHEMA_VERSION);
        }

        self.schema_version()
    }

    // Pointers

    pub fn head_block_root(&self) -> Result<Option<H256>> {
        self.get_pointer(HeadBlockRoot)
    }

    pub fn tail_block_root(&self) -> Result<Option<H256>> {
        self.get_pointer(TailBlockRoot)
    }

    pub fn genesis_block_root(&self) -> Result<Option<H256>> {
        self.get_pointer(GenesisBlockRoot)
    }

    pub fn queue_head_block_root(&self, batch: &mut WriteBatch, root: H256) {
        batch.push(HeadBlockRoot, root.as_bytes().to_vec());
    }

    pub fn queue_tail_block_root(&self, batch: &mut WriteBatch, root: H256) {
        batch.push(TailBlockRoot, root.as_bytes().to_vec());
    }

    pub fn queue_genesis_block_root(&self, batch: &mut WriteBatch, root: H256) {
        batch.push(GenesisBlockRoot, root.as_bytes().to_vec());
    }

    pub fn finalized_deposits_checkpoint(&self) -> Result<Option<DepositContractState>> {
        self.database
            .get(FinalizedDepositsCheckpoint.to_string())?
            .map(|bytes| {
                DepositContractState::from_ssz_bytes(&bytes).map_err(|_| {
                    Error::Corrupted {
                        key: FinalizedDepositsCheckpoint.to_string(),
                    }
                    .into()
                })
            })
            .transpose()
    }

    pub fn queue_finalized_deposits_checkpoint(
        &self,
        batch: &mut WriteBatch,
        checkpoint: DepositContractState,
    ) {
        batch.push(FinalizedDepositsCheckpoint, checkpoint.as_ssz_bytes());
    }

    fn get_pointer(&self, key: impl core::fmt::Display) -> Result<Option<H256>> {
        self.database
            .get(key.to_string())?
            .map(|bytes| {
                if bytes.len() == H256::len_bytes() {
                    Ok(H256::from_slice(&bytes))
                } else {
                    Err(Error::Corrupted {
                        key: key.to_string(),
                    }
                    .into())
                }
            })
            .transpose()
    }

    // Blocks

    pub fn queue_unfinalized_block(
        &self,
        batch: &mut WriteBatch,
        block: &SignedBeaconBlock<P>,
    ) -> Result<H256> {
        let root = block.block_root();

        batch.push(
            UnfinalizedBlockByRoot(root),
            compress_block_bytes(block.phase(), block.to_ssz())?,
        );
        self.queue_summary(batch, root, block);

        Ok(root)
    }

    pub fn queue_finalized_block(
        &self,
        batch: &mut WriteBatch,
        block: &SignedBeaconBlock<P>,
    ) -> Result<H256> {
        let root = block.block_root();

        batch.push(
            FinalizedBlockByRoot(root),
            compress_block_bytes(block.phase(), block.to_ssz())?,
        );
        batch.push(BlockRootBySlot(block.slot()), root.as_bytes().to_vec());
        self.queue_summary(batch, root, block);

        Ok(root)
    }

    fn queue_summary(&self, batch: &mut WriteBatch, root: H256, block: &SignedBeaconBlock<P>) {
        let summary = BlockSummary {
            slot: block.slot(),
            parent_root: block.parent_root(),
        };

        batch.push(SummaryByRoot(root), summary.as_ssz_bytes());
    }

    pub fn contains_block(&self, root: H256) -> Result<bool> {
        Ok(self
            .database
            .contains_key(FinalizedBlockByRoot(root).to_string())?
            || self
                .database
                .contains_key(UnfinalizedBlockByRoot(root).to_string())?)
    }

    pub fn block_by_root(&self, root: H256) -> Result<Option<SignedBeaconBlock<P>>> {
        let compressed = match self
            .database
            .get(FinalizedBlockByRoot(root).to_string())?
        {
            Some(bytes) => Some(bytes),
            None => self
                .database
                .get(UnfinalizedBlockByRoot(root).to_string())?,
        };

        compressed
            .map(|bytes| {
                let ssz_bytes = decompress_block_bytes(&bytes).map_err(|_| Error::Corrupted {
                    key: FinalizedBlockByRoot(root).to_string(),
                })?;

                SignedBeaconBlock::from_ssz(&self.config, &ssz_bytes).map_err(|_| {
                    Error::Corrupted {
                        key: FinalizedBlockByRoot(root).to_string(),
                    }
                    .into()
                })
            })
            .transpose()
    }

    pub fn delete_block(&self, root: H256) -> Result<()> {
        self.database
            .delete(FinalizedBlockByRoot(root).to_string())?;
        self.database
            .delete(UnfinalizedBlockByRoot(root).to_string())?;
        self.database.delete(SummaryByRoot(root).to_string())
    }

    /// Moves an unfinalized block into the dense finalized index.
    pub fn queue_finalization_of(
        &self,
        batch: &mut WriteBatch,
        block: &SignedBeaconBlock<P>,
    ) -> Result<()> {
        let root = block.block_root();

        batch.push(
            FinalizedBlockByRoot(root),
            compress_block_bytes(block.phase(), block.to_ssz())?,
        );
        batch.push(BlockRootBySlot(block.slot()), root.as_bytes().to_vec());

        Ok(())
    }

    pub fn finalized_block_root_by_slot(&self, slot: Slot) -> Result<Option<H256>> {
        self.database
            .get(BlockRootBySlot(slot).to_string())?
            .map(|bytes| {
                if bytes.len() == H256::len_bytes() {
                    Ok(H256::from_slice(&bytes))
                } else {
                    Err(Error::Corrupted {
                        key: BlockRootBySlot(slot).to_string(),
                    }
                    .into())
                }
            })
            .transpose()
    }

    // Summaries

    pub fn summary(&self, root: H256) -> Result<Option<BlockSummary>> {
        self.database
            .get(SummaryByRoot(root).to_string())?
            .map(|bytes| {
                BlockSummary::from_ssz_bytes(&bytes).map_err(|_| {
                    Error::Corrupted {
                        key: SummaryByRoot(root).to_string(),
                    }
                    .into()
                })
            })
            .transpose()
    }

    // States

    /// Stores a state under its hash tree root, splitting out immutable
    /// validator fields.
    ///
    /// A typical state is mostly validator public keys. New validators are
    /// appended to a shared table once; the stored state carries only the
    /// mutable fields.
    pub fn queue_state(
        &self,
        batch: &mut WriteBatch,
        state: &BeaconState<P>,
        block_root: H256,
    ) -> Result<H256> {
        let state_root = state.hash_tree_root();

        self.queue_missing_immutable_validators(batch, state)?;

        let stripped = strip_immutable_validator_fields(state.clone());

        batch.push(
            StateByStateRoot(state_root),
            compress_raw(&stripped.to_ssz()),
        );
        batch.push(
            StateRootBySlotAndBlockRoot(state.slot(), block_root),
            state_root.as_bytes().to_vec(),
        );

        Ok(state_root)
    }

    fn queue_missing_immutable_validators(
        &self,
        batch: &mut WriteBatch,
        state: &BeaconState<P>,
    ) -> Result<()> {
        let stored_count = self.immutable_validator_count()?;
        let unphased = state.as_unphased();

        for (index, validator) in unphased
            .validators()
            .iter()
            .enumerate()
            .skip(usize::try_from(stored_count).expect("validator counts fit in usize"))
        {
            let uncompressed = validator
                .pubkey
                .decompress()
                .map(UncompressedPublicKeyBytes::from)
                .map_err(|_| Error::Corrupted {
                    key: ImmutableValidatorByIndex(index as u64).to_string(),
                })?;

            let record = ImmutableValidator {
                pubkey_uncompressed: uncompressed,
                withdrawal_credentials: validator.withdrawal_credentials,
            };

            batch.push(
                ImmutableValidatorByIndex(index as u64),
                record.as_ssz_bytes(),
            );
        }

        Ok(())
    }

    fn immutable_validator_count(&self) -> Result<u64> {
        // The table is append-only and dense, so the last key is the count.
        let last = self
            .database
            .iterator_descending(..=ImmutableValidatorByIndex(u64::MAX).to_string())?
            .next()
            .transpose()?;

        match last {
            Some((key, _)) if key.starts_with(ImmutableValidatorByIndex::PREFIX.as_bytes()) => {
                let index = ImmutableValidatorByIndex::try_from(Cow::Borrowed(key.as_ref()))?;
                Ok(index.0 + 1)
            }
            _ => Ok(0),
        }
    }

    pub fn immutable_validator(&self, index: ValidatorIndex) -> Result<Option<ImmutableValidator>> {
        self.database
            .get(ImmutableValidatorByIndex(index).to_string())?
            .map(|bytes| {
                ImmutableValidator::from_ssz_bytes(&bytes).map_err(|_| {
                    Error::Corrupted {
                        key: ImmutableValidatorByIndex(index).to_string(),
                    }
                    .into()
                })
            })
            .transpose()
    }

    pub fn contains_state(&self, state_root: H256) -> Result<bool> {
        self.database
            .contains_key(StateByStateRoot(state_root).to_string())
    }

    /// Loads a state, restoring immutable validator fields positionally.
    ///
    /// Falls back to the legacy whole-state snapshot layout so databases
    /// written by the previous schema stay readable.
    pub fn state_by_state_root(&self, state_root: H256) -> Result<Option<BeaconState<P>>> {
        if let Some(bytes) = self
            .database
            .get(StateByStateRoot(state_root).to_string())?
        {
            let ssz_bytes = decompress_raw(&bytes).map_err(|_| Error::Corrupted {
                key: StateByStateRoot(state_root).to_string(),
            })?;

            let stripped =
                BeaconState::from_ssz(&self.config, &ssz_bytes).map_err(|_| Error::Corrupted {
                    key: StateByStateRoot(state_root).to_string(),
                })?;

            return Ok(Some(self.restore_immutable_validator_fields(stripped)?));
        }

        self.legacy_state_by_state_root(state_root)
    }

    fn legacy_state_by_state_root(&self, state_root: H256) -> Result<Option<BeaconState<P>>> {
        self.database
            .get(LegacySnapshotStateByStateRoot(state_root).to_string())?
            .map(|bytes| {
                let ssz_bytes = decompress_raw(&bytes).map_err(|_| Error::Corrupted {
                    key: LegacySnapshotStateByStateRoot(state_root).to_string(),
                })?;

                BeaconState::from_ssz(&self.config, &ssz_bytes).map_err(|_| {
                    Error::Corrupted {
                        key: LegacySnapshotStateByStateRoot(state_root).to_string(),
                    }
                    .into()
                })
            })
            .transpose()
    }

    fn restore_immutable_validator_fields(
        &self,
        mut state: BeaconState<P>,
    ) -> Result<BeaconState<P>> {
        let validator_count = state.validator_count();
        let unphased = state.as_unphased_mut();

        for index in 0..validator_count {
            let record = self.immutable_validator(index as ValidatorIndex)?.ok_or(
                Error::MissingImmutableValidator {
                    index: index as ValidatorIndex,
                },
            )?;

            let compressed = record
                .pubkey_uncompressed
                .deserialize()
                .map_err(|_| Error::Corrupted {
                    key: ImmutableValidatorByIndex(index as u64).to_string(),
                })?
                .to_bytes();

            let validator = unphased
                .validators_mut()
                .get_mut(index)
                .expect("the index is below the validator count");

            validator.pubkey = compressed;
            validator.withdrawal_credentials = record.withdrawal_credentials;
        }

        Ok(state)
    }

    pub fn state_root_by_slot_and_block_root(
        &self,
        slot: Slot,
        block_root: H256,
    ) -> Result<Option<H256>> {
        self.get_pointer(StateRootBySlotAndBlockRoot(slot, block_root))
    }

    // State diffs

    pub fn queue_state_diff(
        &self,
        batch: &mut WriteBatch,
        state_root: H256,
        diff: &StateDiff,
    ) {
        batch.push(StateDiffByStateRoot(state_root), diff.as_ssz_bytes());
    }

    pub fn state_diff(&self, state_root: H256) -> Result<Option<StateDiff>> {
        self.database
            .get(StateDiffByStateRoot(state_root).to_string())?
            .map(|bytes| {
                StateDiff::from_ssz_bytes(&bytes).map_err(|_| {
                    Error::Corrupted {
                        key: StateDiffByStateRoot(state_root).to_string(),
                    }
                    .into()
                })
            })
            .transpose()
    }

    // Pruning

    /// Removes blocks and states older than the tail that are not on the
    /// finalized chain.
    pub fn prune_unfinalized_before(&self, tail_slot: Slot) -> Result<usize> {
        let mut pruned = 0;

        let doomed = self
            .database
            .iterator_ascending(UnfinalizedBlockByRoot::PREFIX.to_owned()..)?
            .take_while(|result| {
                result.as_ref().is_ok_and(|(key, _)| {
                    key.starts_with(UnfinalizedBlockByRoot::PREFIX.as_bytes())
                })
            })
            .collect::<Result<Vec<_>>>()?;

        for (key, value) in doomed {
            let ssz_bytes = match decompress_block_bytes(&value) {
                Ok(bytes) => bytes,
                Err(_) => continue,
            };

            let Ok(block) = SignedBeaconBlock::<P>::from_ssz(&self.config, &ssz_bytes) else {
                continue;
            };

            if block.slot() < tail_slot {
                self.database.delete(key)?;
                pruned += 1;
            }
        }

        Ok(pruned)
    }
}

/// Stored states reference validators positionally, so the mutable fields
/// stay and the rest is zeroed.
fn strip_immutable_validator_fields<P: Preset>(mut state: BeaconState<P>) -> BeaconState<P> {
    let unphased = state.as_unphased_mut();

    for validator in unphased.validators_mut().iter_mut() {
        validator.pubkey = bls::PublicKeyBytes::zero();
        validator.withdrawal_credentials = H256::zero();
    }

    state
}

/// A byte-level delta against a prior epoch state.
///
/// States are append-mostly, so the bytes that change between epochs are
/// usually a small contiguous region; everything outside the shared prefix
/// and suffix is stored verbatim.
#[derive(Clone, PartialEq, Eq, Debug, ssz_derive::Encode, ssz_derive::Decode)]
pub struct StateDiff {
    pub base_state_root: H256,
    pub shared_prefix: u64,
    pub shared_suffix: u64,
    pub replacement: Vec<u8>,
    pub new_length: u64,
}

impl StateDiff {
    #[must_use]
    pub fn between(base_state_root: H256, base: &[u8], new: &[u8]) -> Self {
        let shared_prefix = base
            .iter()
            .zip(new)
            .take_while(|(base_byte, new_byte)| base_byte == new_byte)
            .count();

        let remaining = base.len().min(new.len()) - shared_prefix;

        let shared_suffix = base
            .iter()
            .rev()
            .zip(new.iter().rev())
            .take(remaining)
            .take_while(|(base_byte, new_byte)| base_byte == new_byte)
            .count();

        Self {
            base_state_root,
            shared_prefix: shared_prefix as u64,
            shared_suffix: shared_suffix as u64,
            replacement: new[shared_prefix..new.len() - shared_suffix].to_vec(),
            new_length: new.len() as u64,
        }
    }

    pub fn apply(&self, base: &[u8]) -> Result<Vec<u8>> {
        let prefix = usize::try_from(self.shared_prefix)?;
        let suffix = usize::try_from(self.shared_suffix)?;
        let new_length = usize::try_from(self.new_length)?;

        if prefix > base.len() || suffix > base.len() || prefix + suffix > new_length {
            return Err(Error::InvalidStateDiff.into());
        }

        let mut new = Vec::with_capacity(new_length);
        new.extend_from_slice(&base[..prefix]);
        new.extend_from_slice(&self.replacement);
        new.extend_from_slice(&base[base.len() - suffix..]);

        if new.len() != new_length {
            return Err(Error::InvalidStateDiff.into());
        }

        Ok(new)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("stored value under key {key} is corrupted")]
    Corrupted { key: String },
    #[error("immutable validator record {index} is missing")]
    MissingImmutableValidator { index: ValidatorIndex },
    #[error("state diff does not apply to its base state")]
    InvalidStateDiff,
    #[error("storage key has incorrect prefix: {bytes:?}")]
    IncorrectPrefix { bytes: Vec<u8> },
}

pub trait PrefixableKey {
    const PREFIX: &'static str;
}

#[derive(Display)]
#[display("{}{_0:020}", Self::PREFIX)]
pub struct BlockRootBySlot(pub Slot);

impl PrefixableKey for BlockRootBySlot {
    const PREFIX: &'static str = "r";
}

#[derive(Display)]
#[display("{}{_0:x}", Self::PREFIX)]
pub struct FinalizedBlockByRoot(pub H256);

impl PrefixableKey for FinalizedBlockByRoot {
    const PREFIX: &'static str = "b";
}

#[derive(Display)]
#[display("{}{_0:x}", Self::PREFIX)]
pub struct UnfinalizedBlockByRoot(pub H256);

impl PrefixableKey for UnfinalizedBlockByRoot {
    const PREFIX: &'static str = "n";
}

#[derive(Display)]
#[display("{}{_0:x}", Self::PREFIX)]
pub struct SummaryByRoot(pub H256);

impl PrefixableKey for SummaryByRoot {
    const PREFIX: &'static str = "m";
}

#[derive(Display)]
#[display("{}{_0:x}", Self::PREFIX)]
pub struct StateByStateRoot(pub H256);

impl PrefixableKey for StateByStateRoot {
    const PREFIX: &'static str = "s";
}

#[derive(Display)]
#[display("{}{_0:x}", Self::PREFIX)]
pub struct StateDiffByStateRoot(pub H256);

impl PrefixableKey for StateDiffByStateRoot {
    const PREFIX: &'static str = "d";
}

#[derive(Display)]
#[display("{}{_0:020}{_1:x}", Self::PREFIX)]
pub struct StateRootBySlotAndBlockRoot(pub Slot, pub H256);

impl PrefixableKey for StateRootBySlotAndBlockRoot {
    const PREFIX: &'static str = "t";
}

#[derive(Display)]
#[display("{}{_0:020}", Self::PREFIX)]
pub struct ImmutableValidatorByIndex(pub u64);

impl PrefixableKey for ImmutableValidatorByIndex {
    const PREFIX: &'static str = "v";
}

impl TryFrom<Cow<'_, [u8]>> for ImmutableValidatorByIndex {
    type Error = AnyhowError;

    fn try_from(bytes: Cow<[u8]>) -> Result<Self> {
        let payload = bytes
            .strip_prefix(Self::PREFIX.as_bytes())
            .ok_or_else(|| Error::IncorrectPrefix {
                bytes: bytes.to_vec(),
            })?;

        let string = core::str::from_utf8(payload)?;
        Ok(Self(string.parse()?))
    }
}

#[derive(Display)]
#[display("{}{_0:x}", Self::PREFIX)]
pub struct LegacySnapshotStateByStateRoot(pub H256);

impl PrefixableKey for LegacySnapshotStateByStateRoot {
    const PREFIX: &'static str = "cstate";
}

#[derive(Display)]
#[display("phead")]
struct HeadBlockRoot;

#[derive(Display)]
#[display("ptail")]
struct TailBlockRoot;

#[derive(Display)]
#[display("pgenesis")]
struct GenesisBlockRoot;

#[derive(Display)]
#[display("pdeposits")]
struct FinalizedDepositsCheckpoint;

#[derive(Display)]
#[display("pschema")]
struct SchemaVersion;

fn compress_block_bytes(phase: Phase, ssz_bytes: Vec<u8>) -> Result<Vec<u8>> {
    match phase {
        Phase::Phase0 | Phase::Altair => Ok(compress_raw(&ssz_bytes)),
        Phase::Bellatrix => compress_framed(&ssz_bytes),
    }
}

fn decompress_block_bytes(bytes: &[u8]) -> Result<Vec<u8>> {
    // Framed snappy always begins with the stream identifier chunk, which is
    // not a valid frame-less snappy length prefix for values this large.
    if bytes.starts_with(FRAMED_SNAPPY_STREAM_IDENTIFIER) {
        decompress_framed(bytes)
    } else {
        decompress_raw(bytes)
    }
}

const FRAMED_SNAPPY_STREAM_IDENTIFIER: &[u8] = b"\xff\x06\x00\x00sNaPpY";

fn compress_raw(data: &[u8]) -> Vec<u8> {
    snap::raw::Encoder::new()
        .compress_vec(data)
        .expect("snappy compression does not fail on in-memory buffers")
}

fn decompress_raw(data: &[u8]) -> Result<Vec<u8>> {
    snap::raw::Decoder::new()
        .decompress_vec(data)
        .map_err(Into::into)
}

fn compress_framed(data: &[u8]) -> Result<Vec<u8>> {
    use std::io::Write as _;

    let mut encoder = snap::write::FrameEncoder::new(vec![]);
    encoder.write_all(data)?;
    encoder.into_inner().map_err(|error| error.into_error().into())
}

fn decompress_framed(data: &[u8]) -> Result<Vec<u8>> {
    use std::io::Read as _;

    let mut decoded = vec![];
    snap::read::FrameDecoder::new(data).read_to_end(&mut decoded)?;
    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use bytesize::ByteSize;
    use database::DatabaseMode;
    use tempfile::TempDir;
    use test_case::test_case;
    use types::{
        phase0::containers::{
            BeaconBlock as Phase0BeaconBlock, Checkpoint,
            SignedBeaconBlock as Phase0SignedBeaconBlock, Validator,
        },
        preset::Minimal,
    };

    use super::*;

    type TestStorage = Storage<Minimal>;

    fn in_memory_storage() -> TestStorage {
        Storage::new(Arc::new(Config::minimal()), Database::in_memory())
    }

    fn persistent_storage() -> TestStorage {
        let database = Database::persistent(
            "test_db",
            TempDir::new().expect("temporary directories are creatable"),
            ByteSize::mib(16),
            DatabaseMode::ReadWrite,
        )
        .expect("the database opens in a fresh directory");

        Storage::new(Arc::new(Config::minimal()), database)
    }

    fn block_at_slot(slot: Slot) -> SignedBeaconBlock<Minimal> {
        let mut block = Phase0SignedBeaconBlock::<Minimal>::default();
        block.message.slot = slot;
        SignedBeaconBlock::Phase0(block)
    }

    #[test_case(in_memory_storage())]
    #[test_case(persistent_storage())]
    fn block_add_get_delete_roundtrip(storage: TestStorage) {
        let block = block_at_slot(7);
        let root = block.block_root();

        storage
            .with_many_writes(|storage, batch| {
                storage.queue_unfinalized_block(batch, &block)?;
                Ok(())
            })
            .expect("the batch commits");

        assert!(storage.contains_block(root).expect("lookups succeed"));
        assert_eq!(
            storage.block_by_root(root).expect("lookups succeed"),
            Some(block),
        );

        storage.delete_block(root).expect("deletion succeeds");

        assert!(!storage.contains_block(root).expect("lookups succeed"));
        assert_eq!(storage.block_by_root(root).expect("lookups succeed"), None);
    }

    #[test_case(in_memory_storage())]
    #[test_case(persistent_storage())]
    fn state_roundtrips_through_the_split_layout(storage: TestStorage) {
        let validator_count = 64;

        // Real public keys so the uncompressed form in the immutable table
        // can be reconstructed.
        let validators = (1..=validator_count)
            .map(|seed| {
                let secret_key =
                    bls::SecretKey::derive(&[seed; 32]).expect("key material is acceptable");

                Validator {
                    pubkey: secret_key.to_public_key().to_bytes(),
                    withdrawal_credentials: H256::repeat_byte(seed),
                    effective_balance: 32_000_000_000,
                    ..Validator::default()
                }
            })
            .collect::<Vec<_>>();

        let mut phase0_state = types::phase0::beacon_state::BeaconState::<Minimal>::default();
        phase0_state.validators =
            ssz_types::VariableList::new(validators).expect("the validator list is in bounds");
        phase0_state.balances =
            ssz_types::VariableList::new(vec![32_000_000_000; validator_count as usize])
                .expect("the balances list is in bounds");
        phase0_state.slot = 3;

        let state = BeaconState::Phase0(phase0_state);
        let state_root = state.hash_tree_root();
        let block_root = H256::repeat_byte(0xbe);

        storage
            .with_many_writes(|storage, batch| {
                storage.queue_state(batch, &state, block_root)?;
                Ok(())
            })
            .expect("the batch commits");

        assert!(storage.contains_state(state_root).expect("lookups succeed"));
        assert_eq!(
            storage
                .state_root_by_slot_and_block_root(3, block_root)
                .expect("lookups succeed"),
            Some(state_root),
        );

        let restored = storage
            .state_by_state_root(state_root)
            .expect("lookups succeed")
            .expect("the state was stored");

        assert_eq!(restored.hash_tree_root(), state_root);
        assert_eq!(restored, state);
    }

    #[test_case(in_memory_storage())]
    #[test_case(persistent_storage())]
    fn finalized_index_is_dense_by_slot(storage: TestStorage) {
        storage
            .with_many_writes(|storage, batch| {
                for slot in 1..=3 {
                    storage.queue_finalized_block(batch, &block_at_slot(slot))?;
                }
                Ok(())
            })
            .expect("the batch commits");

        for slot in 1..=3 {
            assert_eq!(
                storage
                    .finalized_block_root_by_slot(slot)
                    .expect("lookups succeed"),
                Some(block_at_slot(slot).block_root()),
            );
        }
    }

    #[test]
    fn a_failing_batch_body_commits_nothing() {
        let storage = in_memory_storage();
        let block = block_at_slot(7);
        let root = block.block_root();

        let result = storage.with_many_writes(|storage, batch| {
            storage.queue_unfinalized_block(batch, &block)?;
            anyhow::bail!("stop")
        });

        assert!(result.is_err());
        assert!(!storage.contains_block(root).expect("lookups succeed"));
    }

    #[test]
    fn schema_starts_at_the_current_version_for_empty_databases() {
        let storage = in_memory_storage();

        assert_eq!(
            storage.initialize_schema().expect("the schema initializes"),
            CURRENT_SCHEMA_VERSION,
        );
        assert_eq!(
            storage.schema_version().expect("the version is readable"),
            CURRENT_SCHEMA_VERSION,
        );
    }

    #[test]
    fn state_diffs_roundtrip() {
        let base = b"aaaa-bbbb-cccc".to_vec();
        let new = b"aaaa-BBBB+-cccc".to_vec();

        let diff = StateDiff::between(H256::zero(), &base, &new);
        assert_eq!(diff.apply(&base).expect("the diff applies"), new);

        let encoded = diff.as_ssz_bytes();
        let decoded = StateDiff::from_ssz_bytes(&encoded).expect("the diff decodes");
        assert_eq!(decoded, diff);
    }

    #[test]
    fn pointers_roundtrip() {
        let storage = in_memory_storage();
        let root = H256::repeat_byte(5);

        storage
            .with_many_writes(|storage, batch| {
                storage.queue_head_block_root(batch, root);
                storage.queue_tail_block_root(batch, root);
                storage.queue_genesis_block_root(batch, root);
                Ok(())
            })
            .expect("the batch commits");

        assert_eq!(storage.head_block_root().expect("lookups succeed"), Some(root));
        assert_eq!(storage.tail_block_root().expect("lookups succeed"), Some(root));
        assert_eq!(
            storage.genesis_block_root().expect("lookups succeed"),
            Some(root),
        );
    }
}
