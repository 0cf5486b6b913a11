use blst::{
    min_pk::{AggregateSignature as RawAggregateSignature, Signature as RawSignature},
    BLST_ERROR,
};

use crate::{Error, PublicKey, SignatureBytes, DOMAIN_SEPARATION_TAG};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Signature(pub(crate) RawSignature);

impl TryFrom<SignatureBytes> for Signature {
    type Error = Error;

    fn try_from(bytes: SignatureBytes) -> Result<Self, Self::Error> {
        RawSignature::uncompress(bytes.as_bytes())
            .map(Self)
            .map_err(|_| Error::DecompressionFailed)
    }
}

impl Signature {
    #[must_use]
    pub fn to_bytes(self) -> SignatureBytes {
        SignatureBytes(self.0.compress())
    }

    #[must_use]
    pub fn verify(self, message: impl AsRef<[u8]>, public_key: &PublicKey) -> bool {
        self.0.verify(
            true,
            message.as_ref(),
            DOMAIN_SEPARATION_TAG,
            &[],
            public_key.as_raw(),
            true,
        ) == BLST_ERROR::BLST_SUCCESS
    }

    /// Verifies an aggregate signature over a single message.
    ///
    /// All committee members attest to the same data, so this is the only
    /// aggregate verification the application needs.
    #[must_use]
    pub fn fast_aggregate_verify<'keys>(
        self,
        message: impl AsRef<[u8]>,
        public_keys: impl IntoIterator<Item = &'keys PublicKey>,
    ) -> bool {
        let raw_keys = public_keys
            .into_iter()
            .map(PublicKey::as_raw)
            .collect::<Vec<_>>();

        self.0.fast_aggregate_verify(
            true,
            message.as_ref(),
            DOMAIN_SEPARATION_TAG,
            raw_keys.as_slice(),
        ) == BLST_ERROR::BLST_SUCCESS
    }

    pub fn aggregate_in_place(&mut self, other: Self) {
        let mut aggregate = RawAggregateSignature::from_signature(&self.0);

        // The subgroup check is skipped because both operands came from
        // signatures that were already decompressed with validation.
        if aggregate.add_signature(&other.0, false).is_ok() {
            self.0 = aggregate.to_signature();
        }
    }
}
