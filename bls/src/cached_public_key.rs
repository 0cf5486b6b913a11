use std::sync::OnceLock;

use crate::{Error, PublicKey, PublicKeyBytes};

/// A public key that is decompressed at most once.
///
/// Decompression dominates signature verification when done repeatedly, and
/// validator registries reference the same keys for the life of the process.
#[derive(Default, Debug)]
pub struct CachedPublicKey {
    bytes: PublicKeyBytes,
    decompressed: OnceLock<PublicKey>,
}

impl Clone for CachedPublicKey {
    fn clone(&self) -> Self {
        let decompressed = OnceLock::new();

        if let Some(public_key) = self.decompressed.get() {
            decompressed
                .set(*public_key)
                .expect("the cell was just created");
        }

        Self {
            bytes: self.bytes,
            decompressed,
        }
    }
}

impl PartialEq for CachedPublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl Eq for CachedPublicKey {}

impl From<PublicKeyBytes> for CachedPublicKey {
    fn from(bytes: PublicKeyBytes) -> Self {
        Self {
            bytes,
            decompressed: OnceLock::new(),
        }
    }
}

impl CachedPublicKey {
    #[must_use]
    pub const fn as_bytes(&self) -> &PublicKeyBytes {
        &self.bytes
    }

    pub fn decompress(&self) -> Result<&PublicKey, Error> {
        if let Some(public_key) = self.decompressed.get() {
            return Ok(public_key);
        }

        let public_key = self.bytes.decompress()?;
        Ok(self.decompressed.get_or_init(|| public_key))
    }
}
