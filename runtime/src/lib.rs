pub use crate::{
    network_key::{NetworkKey, INSECURE_NETWORK_KEY_PASSWORD},
    runtime_config::{NetworkProfile, RuntimeConfig},
    runtime_service::run,
};

mod network_key;
mod runtime_config;
mod runtime_service;

pub const DEFAULT_TARGET_PEERS: usize = 80;
pub const DEFAULT_NETWORK_KEY_FILE: &str = "network_key.json";
pub const DEFAULT_DATABASE_SIZE: bytesize::ByteSize = bytesize::ByteSize::gib(256);
