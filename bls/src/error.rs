use thiserror::Error;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Error)]
pub enum Error {
    #[error("failed to decompress public key")]
    DecompressionFailed,
    #[error("public key is invalid")]
    InvalidPublicKey,
    #[error("secret key is invalid")]
    InvalidSecretKey,
    #[error("signature is invalid")]
    InvalidSignature,
}
