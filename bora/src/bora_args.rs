use core::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use bora_version::{APPLICATION_NAME, APPLICATION_VERSION};
use clap::{Args, Parser, Subcommand};
use runtime::{NetworkProfile, RuntimeConfig};

#[derive(Parser)]
#[command(name = APPLICATION_NAME, version = APPLICATION_VERSION)]
pub struct BoraArgs {
    #[command(flatten)]
    pub node_options: NodeOptions,

    #[command(subcommand)]
    pub command: Option<BoraCommand>,
}

#[derive(Args)]
pub struct NodeOptions {
    /// Chain to join. Selects the genesis parameters and fork schedule.
    #[arg(long, value_enum, default_value_t = NetworkProfileArg::Mainnet)]
    pub network_profile: NetworkProfileArg,

    #[arg(long, default_value = "~/.bora")]
    pub data_dir: PathBuf,

    #[arg(long, default_value = "0.0.0.0")]
    pub listen_address: IpAddr,

    #[arg(long, default_value_t = 9000)]
    pub tcp_port: u16,

    #[arg(long, default_value_t = 9000)]
    pub udp_port: u16,

    /// Disable peer discovery and rely on direct peers only.
    #[arg(long)]
    pub disable_discovery: bool,

    /// Peers to stay connected to regardless of scoring.
    #[arg(long)]
    pub direct_peers: Vec<String>,

    /// Target number of peers.
    #[arg(long, default_value_t = runtime::DEFAULT_TARGET_PEERS)]
    pub max_peers: usize,

    /// Kick peers above this. Defaults to 1.5 times the target.
    #[arg(long)]
    pub hard_max_peers: Option<usize>,

    /// Path to the encrypted network key file. Defaults to
    /// `network_key.json` inside the data directory.
    #[arg(long)]
    pub network_key_file: Option<PathBuf>,

    /// Accept the well-known insecure network key password. Only for test
    /// networks.
    #[arg(long)]
    pub network_key_insecure_password: bool,

    #[arg(long)]
    pub metrics_enabled: bool,

    #[arg(long)]
    pub metrics_address: Option<SocketAddr>,

    #[arg(long)]
    pub serve_light_client_data: bool,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, clap::ValueEnum)]
pub enum NetworkProfileArg {
    Mainnet,
    Minimal,
    LocalTestnet,
}

impl From<NetworkProfileArg> for NetworkProfile {
    fn from(profile: NetworkProfileArg) -> Self {
        match profile {
            NetworkProfileArg::Mainnet => Self::Mainnet,
            NetworkProfileArg::Minimal => Self::Minimal,
            NetworkProfileArg::LocalTestnet => Self::LocalTestnet,
        }
    }
}

#[derive(Subcommand)]
pub enum BoraCommand {
    /// Run the node. This is the default when no command is given.
    Run,
    /// Deposit tooling.
    #[command(subcommand)]
    Deposits(DepositsCommand),
    /// Discovery record tooling.
    #[command(subcommand)]
    Record(RecordCommand),
    /// Bootstrap from a recent finalized checkpoint instead of syncing from
    /// genesis.
    TrustedNodeSync {
        /// Files holding the SSZ-encoded anchor exported by a trusted node.
        #[arg(long)]
        block_file: PathBuf,
        #[arg(long)]
        state_file: PathBuf,
    },
}

#[derive(Subcommand)]
pub enum DepositsCommand {
    /// Generate validator keys and deposit data for a test network.
    CreateTestnetDeposits {
        #[arg(long)]
        count: u64,
        #[arg(long)]
        output_file: PathBuf,
    },
    /// Print deposit contract calldata for prepared deposits.
    Send {
        #[arg(long)]
        deposit_file: PathBuf,
    },
}

#[derive(Subcommand)]
pub enum RecordCommand {
    /// Create a discovery record for this node.
    Create {
        #[arg(long)]
        ip: IpAddr,
        #[arg(long)]
        tcp_port: u16,
        #[arg(long)]
        udp_port: u16,
    },
    /// Decode and print a discovery record.
    Print { record: String },
}

impl NodeOptions {
    pub fn runtime_config(&self) -> RuntimeConfig {
        let mut config = RuntimeConfig::with_data_dir(self.data_dir.clone());

        config.network_profile = self.network_profile.into();
        config.listen_address = self.listen_address;
        config.tcp_port = self.tcp_port;
        config.udp_port = self.udp_port;
        config.discovery_enabled = !self.disable_discovery;
        config.direct_peers = self.direct_peers.clone();
        config.max_peers = self.max_peers;
        config.hard_max_peers = self
            .hard_max_peers
            .unwrap_or(self.max_peers + self.max_peers / 2);
        config.network_key_insecure_password = self.network_key_insecure_password;
        config.metrics_enabled = self.metrics_enabled;
        config.metrics_address = self.metrics_address;
        config.serve_light_client_data = self.serve_light_client_data;

        if let Some(network_key_file) = &self.network_key_file {
            config.network_key_file = network_key_file.clone();
        }

        config
    }
}
