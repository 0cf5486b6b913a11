use core::net::IpAddr;
use std::{path::PathBuf, sync::Arc};

use serde::Deserialize;
use types::config::Config;

use crate::network_key::DEFAULT_KDF_ITERATIONS;

/// Which chain to join. Selects the genesis parameters and the fork
/// schedule.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NetworkProfile {
    #[default]
    Mainnet,
    Minimal,
    /// Mainnet preset with every fork active from genesis.
    LocalTestnet,
}

impl NetworkProfile {
    #[must_use]
    pub fn chain_config(self) -> Config {
        match self {
            Self::Mainnet => Config::mainnet(),
            Self::Minimal => Config::minimal(),
            Self::LocalTestnet => Config::mainnet_all_forks(),
        }
    }
}

/// Everything configurable about a running node.
pub struct RuntimeConfig {
    pub network_profile: NetworkProfile,
    pub data_dir: PathBuf,

    pub listen_address: IpAddr,
    pub tcp_port: u16,
    pub udp_port: u16,
    pub discovery_enabled: bool,
    pub direct_peers: Vec<String>,
    pub max_peers: usize,
    /// The trimmer kicks down to this. Defaults to 1.5 times `max_peers`.
    pub hard_max_peers: usize,

    pub network_key_file: PathBuf,
    pub network_key_password: String,
    pub network_key_insecure_password: bool,
    pub network_key_kdf_iterations: u32,

    pub metrics_enabled: bool,
    pub metrics_address: Option<core::net::SocketAddr>,
    pub serve_light_client_data: bool,

    pub database_size: bytesize::ByteSize,
}

impl RuntimeConfig {
    #[must_use]
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        let network_key_file = data_dir.join(crate::DEFAULT_NETWORK_KEY_FILE);

        Self {
            network_profile: NetworkProfile::Mainnet,
            data_dir,
            listen_address: IpAddr::from([0, 0, 0, 0]),
            tcp_port: 9000,
            udp_port: 9000,
            discovery_enabled: true,
            direct_peers: vec![],
            max_peers: crate::DEFAULT_TARGET_PEERS,
            hard_max_peers: crate::DEFAULT_TARGET_PEERS + crate::DEFAULT_TARGET_PEERS / 2,
            network_key_file,
            network_key_password: crate::INSECURE_NETWORK_KEY_PASSWORD.to_owned(),
            network_key_insecure_password: false,
            network_key_kdf_iterations: DEFAULT_KDF_ITERATIONS,
            metrics_enabled: false,
            metrics_address: None,
            serve_light_client_data: false,
            database_size: crate::DEFAULT_DATABASE_SIZE,
        }
    }

    #[must_use]
    pub fn chain_config(&self) -> Arc<Config> {
        Arc::new(self.network_profile.chain_config())
    }
}
