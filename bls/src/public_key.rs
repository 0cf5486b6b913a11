use blst::min_pk::{AggregatePublicKey as RawAggregatePublicKey, PublicKey as RawPublicKey};

use crate::{Error, PublicKeyBytes};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct PublicKey(pub(crate) RawPublicKey);

impl TryFrom<PublicKeyBytes> for PublicKey {
    type Error = Error;

    fn try_from(bytes: PublicKeyBytes) -> Result<Self, Self::Error> {
        RawPublicKey::uncompress(bytes.as_bytes())
            .map(Self)
            .map_err(|_| Error::DecompressionFailed)
    }
}

impl PublicKey {
    #[must_use]
    pub fn to_bytes(self) -> PublicKeyBytes {
        PublicKeyBytes(self.0.compress())
    }

    pub fn aggregate_nonempty(
        public_keys: impl IntoIterator<Item = Self>,
    ) -> Result<Self, Error> {
        let raw_keys = public_keys.into_iter().map(|key| key.0).collect::<Vec<_>>();
        let raw_refs = raw_keys.iter().collect::<Vec<_>>();

        RawAggregatePublicKey::aggregate(raw_refs.as_slice(), true)
            .map(|aggregate| Self(aggregate.to_public_key()))
            .map_err(|_| Error::InvalidPublicKey)
    }

    pub(crate) const fn as_raw(&self) -> &RawPublicKey {
        &self.0
    }
}
