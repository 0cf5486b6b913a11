//! The encrypted network identity key.
//!
//! Stored next to the database and encrypted with a password-derived key so
//! a copied data directory does not leak the node's identity. The scheme is
//! the keystore one: PBKDF2-HMAC-SHA256 for key derivation, AES-128-CTR for
//! the cipher, and a SHA-256 checksum binding the two.

use aes::{
    cipher::{KeyIvInit as _, StreamCipher as _},
    Aes128,
};
use anyhow::Result;
use hmac::Hmac;
use log::info;
use p2p::PeerId;
use rand::RngCore as _;
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use std::path::Path;
use thiserror::Error;
use zeroize::Zeroizing;

type Aes128Ctr = ctr::Ctr32BE<Aes128>;

/// Only accepted when explicitly enabled, for throwaway test networks.
pub const INSECURE_NETWORK_KEY_PASSWORD: &str = "bora-insecure-network-key";

pub const DEFAULT_KDF_ITERATIONS: u32 = 262_144;

const KEY_LENGTH: usize = 32;
const DERIVED_KEY_LENGTH: usize = 32;

/// The node's network identity.
pub struct NetworkKey(Zeroizing<[u8; KEY_LENGTH]>);

impl NetworkKey {
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = Zeroizing::new([0; KEY_LENGTH]);
        rand::thread_rng().fill_bytes(bytes.as_mut());
        Self(bytes)
    }

    /// The identity the transport derives from this key.
    #[must_use]
    pub fn peer_id(&self) -> PeerId {
        let digest = Sha256::digest(self.0.as_ref());
        PeerId(digest.into())
    }

    /// Loads the key, creating and persisting a fresh one on first start.
    pub fn load_or_generate(
        path: impl AsRef<Path>,
        password: &str,
        kdf_iterations: u32,
        allow_insecure_password: bool,
    ) -> Result<Self> {
        if password == INSECURE_NETWORK_KEY_PASSWORD && !allow_insecure_password {
            return Err(Error::InsecurePassword.into());
        }

        if path.as_ref().exists() {
            let contents = fs_err::read_to_string(&path)?;
            let keystore = serde_json::from_str::<Keystore>(&contents)?;
            let key = keystore.decrypt(password)?;

            info!("loaded network key (peer id: {})", key.peer_id());

            return Ok(key);
        }

        let key = Self::generate();
        let keystore = Keystore::encrypt(&key, password, kdf_iterations)?;

        fs_err::write(&path, serde_json::to_string_pretty(&keystore)?)?;

        info!("generated new network key (peer id: {})", key.peer_id());

        Ok(key)
    }
}

#[derive(Deserialize, Serialize)]
struct Keystore {
    crypto: Crypto,
    version: u64,
}

#[derive(Deserialize, Serialize)]
struct Crypto {
    kdf: Kdf,
    checksum: Checksum,
    cipher: Cipher,
}

#[derive(Deserialize, Serialize)]
struct Kdf {
    function: String,
    #[serde(with = "hex::serde")]
    salt: Vec<u8>,
    iterations: u32,
}

#[derive(Deserialize, Serialize)]
struct Checksum {
    function: String,
    #[serde(with = "hex::serde")]
    message: Vec<u8>,
}

#[derive(Deserialize, Serialize)]
struct Cipher {
    function: String,
    #[serde(with = "hex::serde")]
    iv: Vec<u8>,
    #[serde(with = "hex::serde")]
    message: Vec<u8>,
}

impl Keystore {
    fn encrypt(key: &NetworkKey, password: &str, iterations: u32) -> Result<Self> {
        let mut salt = vec![0; 32];
        let mut iv = vec![0; 16];
        rand::thread_rng().fill_bytes(&mut salt);
        rand::thread_rng().fill_bytes(&mut iv);

        let derived = derive_key(password, &salt, iterations);
        let (encryption_key, checksum_key) = derived.split_at(DERIVED_KEY_LENGTH / 2);

        let mut message = key.0.to_vec();
        cipher(encryption_key, &iv)?.apply_keystream(&mut message);

        let checksum = checksum(checksum_key, &message);

        Ok(Self {
            crypto: Crypto {
                kdf: Kdf {
                    function: "pbkdf2".to_owned(),
                    salt,
                    iterations,
                },
                checksum: Checksum {
                    function: "sha256".to_owned(),
                    message: checksum,
                },
                cipher: Cipher {
                    function: "aes-128-ctr".to_owned(),
                    iv,
                    message,
                },
            },
            version: 1,
        })
    }

    fn decrypt(self, password: &str) -> Result<NetworkKey> {
        let Self { crypto, version } = self;

        anyhow::ensure!(version == 1, Error::UnsupportedVersion { version });

        let derived = derive_key(password, &crypto.kdf.salt, crypto.kdf.iterations);
        let (encryption_key, checksum_key) = derived.split_at(DERIVED_KEY_LENGTH / 2);

        anyhow::ensure!(
            checksum(checksum_key, &crypto.cipher.message) == crypto.checksum.message,
            Error::ChecksumMismatch,
        );

        let mut message = crypto.cipher.message;
        cipher(encryption_key, &crypto.cipher.iv)?.apply_keystream(&mut message);

        let bytes: [u8; KEY_LENGTH] = message
            .as_slice()
            .try_into()
            .map_err(|_| Error::InvalidKeyLength)?;

        Ok(NetworkKey(Zeroizing::new(bytes)))
    }
}

fn derive_key(password: &str, salt: &[u8], iterations: u32) -> Zeroizing<[u8; DERIVED_KEY_LENGTH]> {
    let mut derived = Zeroizing::new([0; DERIVED_KEY_LENGTH]);

    pbkdf2::pbkdf2::<Hmac<Sha256>>(
        password.as_bytes(),
        salt,
        iterations,
        derived.as_mut(),
    );

    derived
}

fn cipher(encryption_key: &[u8], iv: &[u8]) -> Result<Aes128Ctr> {
    Aes128Ctr::new_from_slices(encryption_key, iv).map_err(|_| Error::InvalidKeyLength.into())
}

fn checksum(checksum_key: &[u8], cipher_message: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(checksum_key);
    hasher.update(cipher_message);
    hasher.finalize().to_vec()
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("the insecure network key password is only allowed in test networks")]
    InsecurePassword,
    #[error("network key checksum mismatch; wrong password or corrupted file")]
    ChecksumMismatch,
    #[error("network key file version {version} is not supported")]
    UnsupportedVersion { version: u64 },
    #[error("network key has an invalid length")]
    InvalidKeyLength,
}

#[cfg(test)]
mod tests {
    use super::*;

    // Test iteration counts are low on purpose; the default makes every
    // test run take seconds.
    const TEST_ITERATIONS: u32 = 16;

    #[test]
    fn the_same_key_is_loaded_across_restarts() -> Result<()> {
        let directory = tempfile::TempDir::new()?;
        let path = directory.path().join("network_key.json");

        let first = NetworkKey::load_or_generate(&path, "password", TEST_ITERATIONS, false)?;
        let second = NetworkKey::load_or_generate(&path, "password", TEST_ITERATIONS, false)?;

        assert_eq!(first.peer_id(), second.peer_id());

        Ok(())
    }

    #[test]
    fn wrong_passwords_are_rejected() -> Result<()> {
        let directory = tempfile::TempDir::new()?;
        let path = directory.path().join("network_key.json");

        NetworkKey::load_or_generate(&path, "password", TEST_ITERATIONS, false)?;

        let result = NetworkKey::load_or_generate(&path, "hunter2", TEST_ITERATIONS, false);

        assert!(result.is_err());

        Ok(())
    }

    #[test]
    fn the_insecure_password_requires_explicit_opt_in() -> Result<()> {
        let directory = tempfile::TempDir::new()?;
        let path = directory.path().join("network_key.json");

        let denied = NetworkKey::load_or_generate(
            &path,
            INSECURE_NETWORK_KEY_PASSWORD,
            TEST_ITERATIONS,
            false,
        );
        assert!(denied.is_err());

        let allowed = NetworkKey::load_or_generate(
            &path,
            INSECURE_NETWORK_KEY_PASSWORD,
            TEST_ITERATIONS,
            true,
        );
        assert!(allowed.is_ok());

        Ok(())
    }
}
