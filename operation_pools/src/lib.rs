pub use crate::attestation_agg_pool::{AddOutcome, AttestationAggPool};

mod attestation_agg_pool;
