use std::sync::Arc;

use anyhow::{Context as _, Result};
use types::{
    combined::{BeaconState, SignedBeaconBlock},
    preset::Mainnet,
};

use crate::{
    bora_args::{BoraArgs, BoraCommand, DepositsCommand, RecordCommand},
    deposits, records,
};

pub fn dispatch(args: BoraArgs) -> Result<()> {
    let BoraArgs {
        node_options,
        command,
    } = args;

    match command.unwrap_or(BoraCommand::Run) {
        BoraCommand::Run => runtime::run::<Mainnet>(node_options.runtime_config(), None),
        BoraCommand::Deposits(deposits_command) => match deposits_command {
            DepositsCommand::CreateTestnetDeposits { count, output_file } => {
                let chain_config = node_options.runtime_config().chain_config();
                deposits::create_testnet_deposits(&chain_config, count, &output_file)
            }
            DepositsCommand::Send { deposit_file } => deposits::print_calldata(&deposit_file),
        },
        BoraCommand::Record(record_command) => match record_command {
            RecordCommand::Create {
                ip,
                tcp_port,
                udp_port,
            } => {
                let config = node_options.runtime_config();

                let network_key = runtime::NetworkKey::load_or_generate(
                    &config.network_key_file,
                    &config.network_key_password,
                    config.network_key_kdf_iterations,
                    config.network_key_insecure_password,
                )?;

                let record = records::create(&network_key, ip, tcp_port, udp_port)?;
                println!("{record}");

                Ok(())
            }
            RecordCommand::Print { record } => {
                let decoded = records::decode(&record)?;
                println!("{}", serde_json::to_string_pretty(&decoded)?);

                Ok(())
            }
        },
        BoraCommand::TrustedNodeSync {
            block_file,
            state_file,
        } => {
            let runtime_config = node_options.runtime_config();
            let chain_config = runtime_config.chain_config();

            let block_bytes = fs_err::read(block_file).context("failed to read the block file")?;
            let state_bytes = fs_err::read(state_file).context("failed to read the state file")?;

            let block = SignedBeaconBlock::<Mainnet>::from_ssz(&chain_config, &block_bytes)
                .map_err(|error| anyhow::anyhow!("invalid anchor block: {error:?}"))?;
            let state = BeaconState::<Mainnet>::from_ssz(&chain_config, &state_bytes)
                .map_err(|error| anyhow::anyhow!("invalid anchor state: {error:?}"))?;

            anyhow::ensure!(
                block.state_root() == state.hash_tree_root(),
                "the anchor block does not commit to the anchor state",
            );

            runtime::run(
                runtime_config,
                Some((Arc::new(block), Arc::new(state))),
            )
        }
    }
}
