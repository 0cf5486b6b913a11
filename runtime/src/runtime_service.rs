//! Node assembly.
//!
//! The consensus core runs on one dedicated thread that owns the mutator.
//! The tokio runtime drives the clock and the network-facing services;
//! CPU-heavy work goes to the off-load pool. The database is the only
//! shared mutable resource and serializes its own writes.

use std::sync::{mpsc, Arc};

use anyhow::{Context as _, Result};
use clock::Tick;
use database::{Database, DatabaseMode};
use fork_choice_control::{Mutator, MutatorEvent, MutatorMessage, Storage};
use fork_choice_store::{BlockDag, Store};
use futures::StreamExt as _;
use log::{info, warn};
use types::{
    combined::{BeaconState, SignedBeaconBlock},
    preset::Preset,
};

use crate::{network_key::NetworkKey, runtime_config::RuntimeConfig};

const DATABASE_NAME: &str = "bora";

/// Runs the node until the process is interrupted.
///
/// `anchor` is the trusted starting point: genesis for a fresh chain or a
/// recent finalized checkpoint from trusted-node sync. An existing database
/// takes precedence over it.
pub fn run<P: Preset>(
    runtime_config: RuntimeConfig,
    anchor: Option<(Arc<SignedBeaconBlock<P>>, Arc<BeaconState<P>>)>,
) -> Result<()> {
    let chain_config = runtime_config.chain_config();
    chain_config.validate()?;

    fs_err::create_dir_all(&runtime_config.data_dir)
        .context("failed to create the data directory")?;

    let network_key = NetworkKey::load_or_generate(
        &runtime_config.network_key_file,
        &runtime_config.network_key_password,
        runtime_config.network_key_kdf_iterations,
        runtime_config.network_key_insecure_password,
    )
    .context("failed to load the network key")?;

    info!("peer id: {}", network_key.peer_id());

    let database = Database::persistent(
        DATABASE_NAME,
        runtime_config.data_dir.join("db"),
        runtime_config.database_size,
        DatabaseMode::ReadWrite,
    )
    .context("failed to open the database")?;

    let storage = Storage::<P>::new(chain_config.clone(), database);
    let schema_version = storage.initialize_schema()?;

    info!("database schema version {schema_version}");

    let (anchor_block, anchor_state) = load_anchor(&storage, anchor)?;

    let anchor_root = anchor_block.block_root();
    let anchor_slot = anchor_block.slot();

    let genesis_time = anchor_state.genesis_time();

    // The DAG must be rebuilt before fork choice runs. Missing summaries
    // mean the head pointer outran the stored chain; the node falls back to
    // the anchor and re-syncs the difference.
    let head_root = storage.head_block_root()?.unwrap_or(anchor_root);

    let dag = match BlockDag::rebuild(anchor_root, anchor_slot, head_root, |root| {
        storage.summary(root).ok().flatten()
    }) {
        Ok(dag) => dag,
        Err(error) => {
            warn!("DAG rebuild incomplete ({error}); resuming from the anchor");
            BlockDag::new(anchor_root, anchor_slot)
        }
    };

    info!(
        "loaded chain (head: {:?}, blocks: {})",
        dag.head().root,
        dag.block_count(),
    );

    let store = Store::new(
        anchor_state.as_unphased().current_justified_checkpoint(),
        anchor_state.as_unphased().finalized_checkpoint(),
    );

    let (mutator_sender, mutator_receiver) = mpsc::channel();

    let mutator = Mutator::new(
        dag,
        store,
        storage,
        anchor_state,
        mutator_receiver,
        Box::new(|event| {
            if let MutatorEvent::HeadChanged { root, slot } = event {
                info!("head changed to {root:?} at slot {slot}");
            }
        }),
    );

    let mutator_handle = std::thread::Builder::new()
        .name("mutator".to_owned())
        .spawn(move || mutator.run())?;

    // The tick loop owns the tokio runtime; the mutator thread outlives it
    // only during shutdown.
    let tick_sender = mutator_sender.clone();

    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?
        .block_on(async move {
            let mut ticks = clock::ticks(&chain_config, genesis_time)?;

            loop {
                tokio::select! {
                    tick = ticks.next() => {
                        let Some(tick) = tick else { break };
                        let tick: Tick = tick?;

                        if tick_sender.send(MutatorMessage::Tick(tick)).is_err() {
                            break;
                        }
                    }
                    result = tokio::signal::ctrl_c() => {
                        result?;
                        info!("shutting down");
                        break;
                    }
                }
            }

            Ok::<_, anyhow::Error>(())
        })?;

    mutator_sender.send(MutatorMessage::Stop).ok();
    mutator_handle
        .join()
        .map_err(|_| anyhow::anyhow!("the mutator thread panicked"))??;

    Ok(())
}

fn load_anchor<P: Preset>(
    storage: &Storage<P>,
    anchor: Option<(Arc<SignedBeaconBlock<P>>, Arc<BeaconState<P>>)>,
) -> Result<(Arc<SignedBeaconBlock<P>>, Arc<BeaconState<P>>)> {
    if let Some(tail_root) = storage.tail_block_root()? {
        if let Some(block) = storage.block_by_root(tail_root)? {
            let state_root = block.state_root();

            if let Some(state) = storage.state_by_state_root(state_root)? {
                return Ok((Arc::new(block), Arc::new(state)));
            }
        }

        warn!("stored anchor is incomplete; falling back to the provided one");
    }

    let (block, state) = anchor.context(
        "no stored chain and no anchor; start from genesis or use trusted-node-sync",
    )?;

    storage.with_many_writes(|storage, batch| {
        let root = block.block_root();

        storage.queue_finalized_block(batch, &block)?;
        storage.queue_state(batch, &state, root)?;
        storage.queue_genesis_block_root(batch, root);
        storage.queue_tail_block_root(batch, root);
        storage.queue_head_block_root(batch, root);
        Ok(())
    })?;

    Ok((block, state))
}
