//! The authoritative record of what local validators have signed.
//!
//! Every proposal and attestation is recorded here **before** its signature
//! is emitted, in the same transaction that validates it against the
//! history. A crash between the write and the broadcast loses a duty, never
//! produces a slashable message.

use std::path::Path;

use anyhow::Result;
use bls::PublicKeyBytes;
use log::info;
use rusqlite::{Connection, OptionalExtension as _, TransactionBehavior};
use thiserror::Error;
use types::phase0::primitives::{Epoch, Slot, H256};

pub use crate::interchange_format::{
    InterchangeAttestation, InterchangeBlock, InterchangeData, InterchangeFormat,
};

pub mod interchange_format;

#[expect(clippy::str_to_string, reason = "`refinery::embed_migrations` output")]
mod schema {
    use refinery::embed_migrations;
    embed_migrations!();
}

pub const DEFAULT_SLASHING_PROTECTION_HISTORY_LIMIT: u64 = 256;

const DB_PATH: &str = "slashing_protection.sqlite";

type ValidatorId = i64;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct BlockProposal {
    pub slot: Slot,
    pub signing_root: Option<H256>,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct AttestationVote {
    pub source_epoch: Epoch,
    pub target_epoch: Epoch,
    pub signing_root: Option<H256>,
}

#[derive(Debug, Error)]
#[cfg_attr(test, derive(PartialEq, Eq))]
pub enum SlashingValidationError {
    #[error(
        "double proposal at slot {slot} \
         (stored signing root: {stored_signing_root:?})"
    )]
    DoubleProposal {
        slot: Slot,
        stored_signing_root: Option<H256>,
    },
    #[error("proposal at slot {slot} is not after the last signed slot {last_signed_slot}")]
    PastProposal { slot: Slot, last_signed_slot: Slot },
    #[error(
        "double vote for target epoch {target_epoch} \
         (stored signing root: {stored_signing_root:?})"
    )]
    DoubleVote {
        target_epoch: Epoch,
        stored_signing_root: Option<H256>,
    },
    #[error("attestation surrounds a previously signed attestation")]
    SurroundingVote,
    #[error("attestation is surrounded by a previously signed attestation")]
    SurroundedVote,
}

#[derive(Debug)]
#[cfg_attr(test, derive(PartialEq, Eq))]
pub enum SlashingValidationOutcome {
    /// Safe to sign. The record is already durable.
    Accept,
    /// Already signed with the same signing root; signing again is safe but
    /// pointless.
    Ignore,
    Reject(SlashingValidationError),
}

pub struct SlashingProtector {
    connection: Connection,
    history_limit: u64,
}

impl SlashingProtector {
    pub fn persistent(
        validator_directory: impl AsRef<Path>,
        history_limit: u64,
        genesis_validators_root: H256,
    ) -> Result<Self> {
        fs_err::create_dir_all(&validator_directory)?;

        let path = validator_directory.as_ref().join(DB_PATH);
        let connection = Connection::open(path)?;

        Self::initialize(connection, history_limit, genesis_validators_root)
    }

    pub fn in_memory(history_limit: u64, genesis_validators_root: H256) -> Result<Self> {
        Self::initialize(
            Connection::open_in_memory()?,
            history_limit,
            genesis_validators_root,
        )
    }

    fn initialize(
        mut connection: Connection,
        history_limit: u64,
        genesis_validators_root: H256,
    ) -> Result<Self> {
        schema::migrations::runner().run(&mut connection)?;

        let stored_root: Option<Vec<u8>> = connection
            .query_row(
                "SELECT value FROM metadata WHERE key = 'genesis_validators_root'",
                [],
                |row| row.get(0),
            )
            .optional()?;

        match stored_root {
            Some(stored) => {
                anyhow::ensure!(
                    stored == genesis_validators_root.as_bytes(),
                    Error::GenesisValidatorsRootMismatch,
                );
            }
            None => {
                connection.execute(
                    "INSERT INTO metadata (key, value) VALUES ('genesis_validators_root', ?1)",
                    [genesis_validators_root.as_bytes()],
                )?;
                info!("initialized slashing protection database");
            }
        }

        Ok(Self {
            connection,
            history_limit,
        })
    }

    pub fn register_validator(&mut self, pubkey: PublicKeyBytes) -> Result<()> {
        self.connection.execute(
            "INSERT OR IGNORE INTO validators (pubkey) VALUES (?1)",
            [pubkey.as_bytes()],
        )?;

        Ok(())
    }

    /// Validates a proposal against the history and records it in the same
    /// transaction. On [`SlashingValidationOutcome::Accept`] the record is
    /// durable before this returns.
    pub fn validate_and_store_proposal(
        &mut self,
        pubkey: PublicKeyBytes,
        proposal: BlockProposal,
    ) -> Result<SlashingValidationOutcome> {
        let transaction = self
            .connection
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let validator_id = validator_id(&transaction, pubkey)?;

        let stored: Option<(Slot, Option<Vec<u8>>)> = transaction
            .query_row(
                "SELECT slot, signing_root FROM blocks \
                 WHERE validator_id = ?1 ORDER BY slot DESC LIMIT 1",
                [validator_id],
                |row| Ok((row.get::<_, i64>(0)? as Slot, row.get(1)?)),
            )
            .optional()?;

        if let Some((last_signed_slot, stored_signing_root)) = stored {
            if proposal.slot < last_signed_slot {
                return Ok(SlashingValidationOutcome::Reject(
                    SlashingValidationError::PastProposal {
                        slot: proposal.slot,
                        last_signed_slot,
                    },
                ));
            }

            if proposal.slot == last_signed_slot {
                let stored_signing_root = stored_signing_root.map(|bytes| H256::from_slice(&bytes));

                if stored_signing_root.is_some() && stored_signing_root == proposal.signing_root {
                    return Ok(SlashingValidationOutcome::Ignore);
                }

                return Ok(SlashingValidationOutcome::Reject(
                    SlashingValidationError::DoubleProposal {
                        slot: proposal.slot,
                        stored_signing_root,
                    },
                ));
            }
        }

        transaction.execute(
            "INSERT INTO blocks (validator_id, slot, signing_root) VALUES (?1, ?2, ?3)",
            rusqlite::params![
                validator_id,
                proposal.slot as i64,
                proposal.signing_root.map(|root| root.as_bytes().to_vec()),
            ],
        )?;

        prune_proposals(&transaction, validator_id, self.history_limit)?;

        transaction.commit()?;

        Ok(SlashingValidationOutcome::Accept)
    }

    /// Validates an attestation against the history and records it in the
    /// same transaction.
    ///
    /// Rejected are double votes (same target, different data) and votes
    /// that surround or are surrounded by an existing one. A rejection
    /// leaves the store unchanged.
    pub fn validate_and_store_attestation(
        &mut self,
        pubkey: PublicKeyBytes,
        attestation: AttestationVote,
    ) -> Result<SlashingValidationOutcome> {
        let transaction = self
            .connection
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let validator_id = validator_id(&transaction, pubkey)?;

        let same_target: Option<Option<Vec<u8>>> = transaction
            .query_row(
                "SELECT signing_root FROM attestations \
                 WHERE validator_id = ?1 AND target_epoch = ?2",
                rusqlite::params![validator_id, attestation.target_epoch as i64],
                |row| row.get(0),
            )
            .optional()?;

        if let Some(stored_signing_root) = same_target {
            let stored_signing_root = stored_signing_root.map(|bytes| H256::from_slice(&bytes));

            if stored_signing_root.is_some() && stored_signing_root == attestation.signing_root {
                return Ok(SlashingValidationOutcome::Ignore);
            }

            return Ok(SlashingValidationOutcome::Reject(
                SlashingValidationError::DoubleVote {
                    target_epoch: attestation.target_epoch,
                    stored_signing_root,
                },
            ));
        }

        let surrounds: bool = transaction.query_row(
            "SELECT EXISTS ( \
                 SELECT 1 FROM attestations \
                 WHERE validator_id = ?1 AND source_epoch > ?2 AND target_epoch < ?3 \
             )",
            rusqlite::params![
                validator_id,
                attestation.source_epoch as i64,
                attestation.target_epoch as i64,
            ],
            |row| row.get(0),
        )?;

        if surrounds {
            return Ok(SlashingValidationOutcome::Reject(
                SlashingValidationError::SurroundingVote,
            ));
        }

        let surrounded: bool = transaction.query_row(
            "SELECT EXISTS ( \
                 SELECT 1 FROM attestations \
                 WHERE validator_id = ?1 AND source_epoch < ?2 AND target_epoch > ?3 \
             )",
            rusqlite::params![
                validator_id,
                attestation.source_epoch as i64,
                attestation.target_epoch as i64,
            ],
            |row| row.get(0),
        )?;

        if surrounded {
            return Ok(SlashingValidationOutcome::Reject(
                SlashingValidationError::SurroundedVote,
            ));
        }

        transaction.execute(
            "INSERT INTO attestations \
             (validator_id, source_epoch, target_epoch, signing_root) \
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
                validator_id,
                attestation.source_epoch as i64,
                attestation.target_epoch as i64,
                attestation.signing_root.map(|root| root.as_bytes().to_vec()),
            ],
        )?;

        prune_attestations(&transaction, validator_id, self.history_limit)?;

        transaction.commit()?;

        Ok(SlashingValidationOutcome::Accept)
    }

    pub fn export_interchange(&self, genesis_validators_root: H256) -> Result<InterchangeFormat> {
        interchange_format::export(&self.connection, genesis_validators_root)
    }

    pub fn import_interchange(&mut self, interchange: &InterchangeFormat) -> Result<usize> {
        interchange_format::import(&mut self.connection, interchange)
    }
}

fn validator_id(transaction: &rusqlite::Transaction, pubkey: PublicKeyBytes) -> Result<ValidatorId> {
    transaction.execute(
        "INSERT OR IGNORE INTO validators (pubkey) VALUES (?1)",
        [pubkey.as_bytes()],
    )?;

    let id = transaction.query_row(
        "SELECT id FROM validators WHERE pubkey = ?1",
        [pubkey.as_bytes()],
        |row| row.get(0),
    )?;

    Ok(id)
}

fn prune_proposals(
    transaction: &rusqlite::Transaction,
    validator_id: ValidatorId,
    history_limit: u64,
) -> Result<()> {
    transaction.execute(
        "DELETE FROM blocks WHERE validator_id = ?1 AND slot < ( \
             SELECT MAX(slot) FROM blocks WHERE validator_id = ?1 \
         ) - ?2",
        rusqlite::params![validator_id, history_limit as i64],
    )?;

    Ok(())
}

fn prune_attestations(
    transaction: &rusqlite::Transaction,
    validator_id: ValidatorId,
    history_limit: u64,
) -> Result<()> {
    transaction.execute(
        "DELETE FROM attestations WHERE validator_id = ?1 AND target_epoch < ( \
             SELECT MAX(target_epoch) FROM attestations WHERE validator_id = ?1 \
         ) - ?2",
        rusqlite::params![validator_id, history_limit as i64],
    )?;

    Ok(())
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("slashing protection database belongs to a different chain")]
    GenesisValidatorsRootMismatch,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn protector() -> SlashingProtector {
        SlashingProtector::in_memory(
            DEFAULT_SLASHING_PROTECTION_HISTORY_LIMIT,
            H256::repeat_byte(1),
        )
        .expect("an in-memory database always opens")
    }

    fn pubkey() -> PublicKeyBytes {
        PublicKeyBytes::repeat_byte(0xab)
    }

    fn vote(source_epoch: Epoch, target_epoch: Epoch) -> AttestationVote {
        AttestationVote {
            source_epoch,
            target_epoch,
            signing_root: Some(H256::repeat_byte(target_epoch as u8)),
        }
    }

    #[test]
    fn proposals_must_advance_the_slot() -> Result<()> {
        let mut protector = protector();

        let first = BlockProposal {
            slot: 10,
            signing_root: Some(H256::repeat_byte(1)),
        };

        assert_eq!(
            protector.validate_and_store_proposal(pubkey(), first)?,
            SlashingValidationOutcome::Accept,
        );

        // The same proposal again is harmless.
        assert_eq!(
            protector.validate_and_store_proposal(pubkey(), first)?,
            SlashingValidationOutcome::Ignore,
        );

        // A different proposal for the same slot is a double proposal.
        let conflicting = BlockProposal {
            slot: 10,
            signing_root: Some(H256::repeat_byte(2)),
        };

        assert_eq!(
            protector.validate_and_store_proposal(pubkey(), conflicting)?,
            SlashingValidationOutcome::Reject(SlashingValidationError::DoubleProposal {
                slot: 10,
                stored_signing_root: Some(H256::repeat_byte(1)),
            }),
        );

        // Earlier slots are refused outright.
        let past = BlockProposal {
            slot: 9,
            signing_root: None,
        };

        assert_eq!(
            protector.validate_and_store_proposal(pubkey(), past)?,
            SlashingValidationOutcome::Reject(SlashingValidationError::PastProposal {
                slot: 9,
                last_signed_slot: 10,
            }),
        );

        Ok(())
    }

    #[test]
    fn surrounded_votes_are_refused_and_leave_the_store_unchanged() -> Result<()> {
        let mut protector = protector();

        assert_eq!(
            protector.validate_and_store_attestation(pubkey(), vote(3, 7))?,
            SlashingValidationOutcome::Accept,
        );

        // (source: 4, target: 6) is surrounded by (source: 3, target: 7).
        assert_eq!(
            protector.validate_and_store_attestation(pubkey(), vote(4, 6))?,
            SlashingValidationOutcome::Reject(SlashingValidationError::SurroundedVote),
        );

        // The refused vote was not recorded: repeating it gives the same
        // verdict instead of a double-vote rejection.
        assert_eq!(
            protector.validate_and_store_attestation(pubkey(), vote(4, 6))?,
            SlashingValidationOutcome::Reject(SlashingValidationError::SurroundedVote),
        );

        Ok(())
    }

    #[test]
    fn surrounding_votes_are_refused() -> Result<()> {
        let mut protector = protector();

        assert_eq!(
            protector.validate_and_store_attestation(pubkey(), vote(4, 6))?,
            SlashingValidationOutcome::Accept,
        );

        assert_eq!(
            protector.validate_and_store_attestation(pubkey(), vote(3, 7))?,
            SlashingValidationOutcome::Reject(SlashingValidationError::SurroundingVote),
        );

        Ok(())
    }

    #[test]
    fn double_votes_are_refused() -> Result<()> {
        let mut protector = protector();

        assert_eq!(
            protector.validate_and_store_attestation(pubkey(), vote(3, 7))?,
            SlashingValidationOutcome::Accept,
        );

        // The same data is ignored.
        assert_eq!(
            protector.validate_and_store_attestation(pubkey(), vote(3, 7))?,
            SlashingValidationOutcome::Ignore,
        );

        // Different data for the same target is a double vote.
        let conflicting = AttestationVote {
            signing_root: Some(H256::repeat_byte(0xcc)),
            ..vote(3, 7)
        };

        assert_eq!(
            protector.validate_and_store_attestation(pubkey(), conflicting)?,
            SlashingValidationOutcome::Reject(SlashingValidationError::DoubleVote {
                target_epoch: 7,
                stored_signing_root: Some(H256::repeat_byte(7)),
            }),
        );

        Ok(())
    }

    #[test]
    fn databases_are_bound_to_one_chain() {
        let directory = tempfile::TempDir::new().expect("temporary directories are creatable");

        drop(
            SlashingProtector::persistent(
                &directory,
                DEFAULT_SLASHING_PROTECTION_HISTORY_LIMIT,
                H256::repeat_byte(1),
            )
            .expect("the database opens in a fresh directory"),
        );

        let result = SlashingProtector::persistent(
            &directory,
            DEFAULT_SLASHING_PROTECTION_HISTORY_LIMIT,
            H256::repeat_byte(2),
        );

        assert!(result.is_err());
    }
}
