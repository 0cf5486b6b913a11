use std::collections::HashMap;

use hashing::hash_256;
use types::{
    config::Config,
    phase0::primitives::{ForkDigest, SubnetId, H256},
};

/// Gossip topics, named `/eth2/<fork_digest>/<topic>/ssz_snappy`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum TopicKind {
    BeaconBlock,
    BeaconAggregateAndProof,
    BeaconAttestation(SubnetId),
    VoluntaryExit,
    ProposerSlashing,
    AttesterSlashing,
    SyncCommitteeContributionAndProof,
    SyncCommittee(SubnetId),
}

impl TopicKind {
    #[must_use]
    pub fn topic_name(self, fork_digest: ForkDigest) -> String {
        let name = match self {
            Self::BeaconBlock => "beacon_block".to_owned(),
            Self::BeaconAggregateAndProof => "beacon_aggregate_and_proof".to_owned(),
            Self::BeaconAttestation(subnet_id) => format!("beacon_attestation_{subnet_id}"),
            Self::VoluntaryExit => "voluntary_exit".to_owned(),
            Self::ProposerSlashing => "proposer_slashing".to_owned(),
            Self::AttesterSlashing => "attester_slashing".to_owned(),
            Self::SyncCommitteeContributionAndProof => {
                "sync_committee_contribution_and_proof".to_owned()
            }
            Self::SyncCommittee(subnet_id) => format!("sync_committee_{subnet_id}"),
        };

        format!("/eth2/{}/{name}/ssz_snappy", hex::encode(fork_digest))
    }
}

/// The verdict of a topic validator.
///
/// `Reject` penalizes the sender's score; `Ignore` drops the message
/// without penalty.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum GossipOutcome {
    Accept,
    Ignore,
    Reject,
}

type Validator = Box<dyn Fn(&[u8]) -> GossipOutcome + Send + Sync>;

/// Topic validators registered as values in a table keyed by topic name.
#[derive(Default)]
pub struct GossipValidators {
    validators: HashMap<String, Validator>,
}

impl GossipValidators {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        topic: String,
        validator: impl Fn(&[u8]) -> GossipOutcome + Send + Sync + 'static,
    ) {
        self.validators.insert(topic, Box::new(validator));
    }

    /// Messages on topics with no validator are ignored, not rejected;
    /// subscribing and validating are decided independently.
    #[must_use]
    pub fn validate(&self, topic: &str, decoded_data: &[u8]) -> GossipOutcome {
        match self.validators.get(topic) {
            Some(validator) => validator(decoded_data),
            None => GossipOutcome::Ignore,
        }
    }
}

/// The post-altair message id: the first 20 bytes of
/// `SHA256(domain || topic length || topic || decoded data)`.
///
/// Messages that fail decompression are identified with the
/// invalid-snappy domain over the raw data instead, so peers cannot craft
/// colliding ids by mixing valid and invalid compression.
#[must_use]
pub fn message_id(config: &Config, topic: &str, decoded_data: Option<&[u8]>) -> [u8; 20] {
    let (domain, data) = match decoded_data {
        Some(data) => (config.message_domain_valid_snappy, data),
        None => (config.message_domain_invalid_snappy, &[][..]),
    };

    let mut input = vec![];
    input.extend_from_slice(domain.as_bytes());
    input.extend_from_slice(&(topic.len() as u64).to_le_bytes());
    input.extend_from_slice(topic.as_bytes());
    input.extend_from_slice(data);

    truncate_to_id(hash_256(input))
}

/// The pre-altair message id: the first 20 bytes of
/// `SHA256(domain || decoded data)`, with no topic mixed in.
#[must_use]
pub fn legacy_message_id(config: &Config, decoded_data: Option<&[u8]>) -> [u8; 20] {
    let (domain, data) = match decoded_data {
        Some(data) => (config.message_domain_valid_snappy, data),
        None => (config.message_domain_invalid_snappy, &[][..]),
    };

    let mut input = vec![];
    input.extend_from_slice(domain.as_bytes());
    input.extend_from_slice(data);

    truncate_to_id(hash_256(input))
}

fn truncate_to_id(digest: H256) -> [u8; 20] {
    digest.as_bytes()[..20]
        .try_into()
        .expect("the digest is longer than 20 bytes")
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case(
        TopicKind::BeaconBlock
        => "/eth2/01020304/beacon_block/ssz_snappy"
    )]
    #[test_case(
        TopicKind::BeaconAttestation(7)
        => "/eth2/01020304/beacon_attestation_7/ssz_snappy"
    )]
    #[test_case(
        TopicKind::SyncCommittee(2)
        => "/eth2/01020304/sync_committee_2/ssz_snappy"
    )]
    fn topic_names_follow_the_naming_scheme(kind: TopicKind) -> String {
        kind.topic_name(ForkDigest::from_slice(&[1, 2, 3, 4]))
    }

    #[test]
    fn message_ids_depend_on_the_topic() {
        let config = Config::mainnet();

        let first = message_id(&config, "/eth2/00000000/beacon_block/ssz_snappy", Some(b"m"));
        let second =
            message_id(&config, "/eth2/00000000/voluntary_exit/ssz_snappy", Some(b"m"));

        assert_ne!(first, second);
    }

    #[test]
    fn legacy_message_ids_do_not_depend_on_the_topic() {
        let config = Config::mainnet();

        assert_eq!(
            legacy_message_id(&config, Some(b"m")),
            legacy_message_id(&config, Some(b"m")),
        );
        assert_ne!(
            legacy_message_id(&config, Some(b"m")),
            legacy_message_id(&config, None),
        );
    }

    #[test]
    fn validators_dispatch_by_topic() {
        let mut validators = GossipValidators::new();

        validators.register("a".to_owned(), |_| GossipOutcome::Accept);
        validators.register("b".to_owned(), |data| {
            if data.is_empty() {
                GossipOutcome::Reject
            } else {
                GossipOutcome::Accept
            }
        });

        assert_eq!(validators.validate("a", b""), GossipOutcome::Accept);
        assert_eq!(validators.validate("b", b""), GossipOutcome::Reject);
        assert_eq!(validators.validate("b", b"x"), GossipOutcome::Accept);
        assert_eq!(validators.validate("c", b""), GossipOutcome::Ignore);
    }
}
