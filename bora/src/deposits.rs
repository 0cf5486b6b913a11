use std::path::Path;

use anyhow::Result;
use bls::SecretKey;
use helper_functions::{misc, signing};
use hex_literal::hex;
use log::info;
use rand::RngCore as _;
use serde::{Deserialize, Serialize};
use tree_hash::TreeHash as _;
use types::{
    config::Config,
    phase0::{
        consts::DOMAIN_DEPOSIT,
        containers::{DepositData, DepositMessage},
        primitives::Gwei,
    },
    preset::{Mainnet, Preset as _},
};

/// `deposit(bytes,bytes,bytes,bytes32)`
const DEPOSIT_FUNCTION_SELECTOR: [u8; 4] = hex!("22895118");

#[derive(Deserialize, Serialize)]
struct DepositFile {
    deposits: Vec<DepositData>,
}

/// Generates validator keys and matching deposit data for a test network.
///
/// Key material comes from the OS random number generator; the secret keys
/// are written alongside the deposits, which is only acceptable for throwaway
/// networks.
pub fn create_testnet_deposits(
    config: &Config,
    count: u64,
    output_file: &Path,
) -> Result<()> {
    let amount: Gwei = Mainnet::MAX_EFFECTIVE_BALANCE;
    let domain = misc::compute_domain(config, DOMAIN_DEPOSIT, None, None);

    let mut deposits = vec![];
    let mut secret_keys = vec![];

    for _ in 0..count {
        let mut key_material = [0; 32];
        rand::thread_rng().fill_bytes(&mut key_material);

        let secret_key = SecretKey::derive(&key_material)?;
        let pubkey = secret_key.to_public_key().to_bytes();

        // Withdrawal credentials of the BLS form, derived from the same key.
        let mut withdrawal_credentials = hashing::hash_256(pubkey.as_bytes());
        withdrawal_credentials.as_bytes_mut()[0] = 0;

        let message = DepositMessage {
            pubkey,
            withdrawal_credentials,
            amount,
        };

        let signature = signing::sign(&secret_key, &message, domain);

        deposits.push(DepositData {
            pubkey,
            withdrawal_credentials,
            amount,
            signature,
        });

        secret_keys.push(hex::encode(key_material));
    }

    fs_err::write(
        output_file,
        serde_json::to_string_pretty(&DepositFile { deposits })?,
    )?;

    fs_err::write(
        output_file.with_extension("keys.json"),
        serde_json::to_string_pretty(&secret_keys)?,
    )?;

    info!("wrote {count} deposits to {}", output_file.display());

    Ok(())
}

/// Prints the deposit contract calldata for each prepared deposit, ready to
/// be submitted through any execution layer wallet.
pub fn print_calldata(deposit_file: &Path) -> Result<()> {
    let contents = fs_err::read_to_string(deposit_file)?;
    let file = serde_json::from_str::<DepositFile>(&contents)?;

    for deposit in file.deposits {
        println!("0x{}", hex::encode(encode_deposit_call(&deposit)));
    }

    Ok(())
}

/// ABI encoding of `deposit(bytes pubkey, bytes withdrawal_credentials,
/// bytes signature, bytes32 deposit_data_root)`.
fn encode_deposit_call(deposit: &DepositData) -> Vec<u8> {
    let deposit_data_root = deposit.tree_hash_root();

    let mut calldata = DEPOSIT_FUNCTION_SELECTOR.to_vec();

    // Three dynamic arguments (offsets) and one static bytes32.
    let pubkey_offset = 4 * 32;
    let credentials_offset = pubkey_offset + 32 + padded_length(48);
    let signature_offset = credentials_offset + 32 + padded_length(32);

    append_uint(&mut calldata, pubkey_offset);
    append_uint(&mut calldata, credentials_offset);
    append_uint(&mut calldata, signature_offset);
    calldata.extend_from_slice(deposit_data_root.as_bytes());

    append_bytes(&mut calldata, deposit.pubkey.as_bytes());
    append_bytes(&mut calldata, deposit.withdrawal_credentials.as_bytes());
    append_bytes(&mut calldata, deposit.signature.as_bytes());

    calldata
}

fn append_uint(calldata: &mut Vec<u8>, value: usize) {
    let mut word = [0; 32];
    word[24..].copy_from_slice(&(value as u64).to_be_bytes());
    calldata.extend_from_slice(&word);
}

fn append_bytes(calldata: &mut Vec<u8>, bytes: &[u8]) {
    append_uint(calldata, bytes.len());
    calldata.extend_from_slice(bytes);
    calldata.resize(calldata.len() + padded_length(bytes.len()) - bytes.len(), 0);
}

const fn padded_length(length: usize) -> usize {
    length.div_ceil(32) * 32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deposit_calldata_has_the_expected_layout() {
        let deposit = DepositData::default();
        let calldata = encode_deposit_call(&deposit);

        assert_eq!(&calldata[..4], DEPOSIT_FUNCTION_SELECTOR);

        // selector + 4 head words + 3 length-prefixed padded arguments
        let expected_length = 4 + 4 * 32 + (32 + 64) + (32 + 32) + (32 + 96);
        assert_eq!(calldata.len(), expected_length);
    }

    #[test]
    fn generated_deposits_roundtrip_through_the_file_format() -> Result<()> {
        let directory = tempfile::TempDir::new()?;
        let output_file = directory.path().join("deposits.json");

        create_testnet_deposits(&Config::mainnet(), 2, &output_file)?;

        let contents = fs_err::read_to_string(&output_file)?;
        let file = serde_json::from_str::<DepositFile>(&contents)?;

        assert_eq!(file.deposits.len(), 2);

        Ok(())
    }
}
