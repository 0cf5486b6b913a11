use zeroize::{Zeroize, ZeroizeOnDrop};

pub const SIZE: usize = 32;

/// A secret key in byte form.
///
/// Deliberately does not implement `Clone`, `Debug`, `Display`, or `serde`
/// traits. The contents are wiped on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SecretKeyBytes(pub [u8; SIZE]);

impl AsRef<[u8]> for SecretKeyBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
