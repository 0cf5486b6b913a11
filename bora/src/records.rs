use core::net::IpAddr;

use anyhow::{Context as _, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use runtime::NetworkKey;
use serde::{Deserialize, Serialize};

const RECORD_PREFIX: &str = "bora:";

/// A self-describing discovery record: the node's identity and where to
/// reach it.
#[derive(Deserialize, Serialize)]
pub struct Record {
    pub seq: u64,
    pub peer_id: String,
    pub ip: IpAddr,
    pub tcp_port: u16,
    pub udp_port: u16,
}

pub fn create(
    network_key: &NetworkKey,
    ip: IpAddr,
    tcp_port: u16,
    udp_port: u16,
) -> Result<String> {
    let record = Record {
        seq: 1,
        peer_id: network_key.peer_id().to_string(),
        ip,
        tcp_port,
        udp_port,
    };

    let encoded = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&record)?);

    Ok(format!("{RECORD_PREFIX}{encoded}"))
}

pub fn decode(record: &str) -> Result<Record> {
    let encoded = record
        .strip_prefix(RECORD_PREFIX)
        .context("discovery records start with the bora: prefix")?;

    let bytes = URL_SAFE_NO_PAD
        .decode(encoded)
        .context("discovery record is not valid base64")?;

    serde_json::from_slice(&bytes).context("discovery record is not valid JSON")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_roundtrip() -> Result<()> {
        let network_key = NetworkKey::generate();

        let encoded = create(&network_key, IpAddr::from([192, 168, 1, 7]), 9000, 9001)?;
        let decoded = decode(&encoded)?;

        assert_eq!(decoded.peer_id, network_key.peer_id().to_string());
        assert_eq!(decoded.ip, IpAddr::from([192, 168, 1, 7]));
        assert_eq!(decoded.tcp_port, 9000);
        assert_eq!(decoded.udp_port, 9001);

        Ok(())
    }

    #[test]
    fn foreign_strings_are_rejected() {
        assert!(decode("enr:abcdef").is_err());
        assert!(decode("bora:!!!").is_err());
    }
}
