//! Fork-choice-aware bookkeeping for unfinalized blocks.
//!
//! [`BlockDag`] indexes every known block by root and keeps the reference
//! graph rooted at the finalized tail. [`Store`] lays attestation weights
//! over that graph and picks the canonical head. [`Quarantine`] holds blocks
//! whose parents have not arrived yet.
//!
//! Everything here is in-memory only. The store can always be rebuilt from
//! block summaries and a per-validator latest-vote table, so none of it is
//! persisted.

pub use crate::{
    block_dag::{BlockAction, BlockDag, BlockRef},
    error::Error,
    quarantine::{Quarantine, DEFAULT_QUARANTINE_CAPACITY},
    store::{LatestVote, Store},
};

mod block_dag;
mod error;
mod quarantine;
mod store;
