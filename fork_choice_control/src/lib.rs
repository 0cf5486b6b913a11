//! The single-owner consensus core.
//!
//! One [`Mutator`] owns the block DAG, the fork choice store, the orphan
//! quarantine, and the database write path. Everything else communicates
//! with it through messages, so all mutation is serialized without locks.

pub use crate::{
    messages::{MutatorEvent, MutatorMessage},
    mutator::Mutator,
    storage::{
        PrefixableKey, StateDiff, Storage, WriteBatch, CURRENT_SCHEMA_VERSION,
        LEGACY_SCHEMA_VERSION,
    },
    thread_pool::ThreadPool,
};

mod messages;
mod mutator;
mod storage;
mod thread_pool;
