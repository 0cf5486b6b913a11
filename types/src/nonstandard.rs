use bls::UncompressedPublicKeyBytes;
use enum_iterator::Sequence;
use serde::{Deserialize, Serialize};
use ssz_derive::{Decode, Encode};
use strum::AsRefStr;
use tree_hash_derive::TreeHash;

use crate::phase0::primitives::{Slot, H256};

/// Which fork a block or state belongs to.
///
/// Fork transitions are explicit constructor functions on the `combined`
/// enums. There are no implicit upcasts.
#[derive(
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Debug,
    Sequence,
    AsRefStr,
    Deserialize,
    Serialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Phase0,
    Altair,
    Bellatrix,
}

/// The minimum needed to reconstruct the block DAG at startup without loading
/// full block bodies.
#[derive(
    Clone, Copy, PartialEq, Eq, Debug, Deserialize, Serialize, Encode, Decode, TreeHash,
)]
pub struct BlockSummary {
    #[serde(with = "ethereum_serde_utils::quoted_u64")]
    pub slot: Slot,
    pub parent_root: H256,
}

/// Immutable validator fields, deduplicated in storage.
///
/// A typical state is mostly validator public keys. Storing them once in an
/// append-only table cuts per-state write amplification by two orders of
/// magnitude.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Encode, Decode)]
pub struct ImmutableValidator {
    pub pubkey_uncompressed: UncompressedPublicKeyBytes,
    pub withdrawal_credentials: H256,
}
