//! A minimal EIP-3076 interchange: enough to move a validator's signing
//! history between clients without losing protection.

use anyhow::Result;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use types::phase0::primitives::H256;

#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub struct InterchangeFormat {
    pub metadata: InterchangeMetadata,
    pub data: Vec<InterchangeData>,
}

#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub struct InterchangeMetadata {
    pub interchange_format_version: String,
    pub genesis_validators_root: H256,
}

#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub struct InterchangeData {
    pub pubkey: String,
    pub signed_blocks: Vec<InterchangeBlock>,
    pub signed_attestations: Vec<InterchangeAttestation>,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub struct InterchangeBlock {
    #[serde(with = "ethereum_serde_utils::quoted_u64")]
    pub slot: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signing_root: Option<H256>,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub struct InterchangeAttestation {
    #[serde(with = "ethereum_serde_utils::quoted_u64")]
    pub source_epoch: u64,
    #[serde(with = "ethereum_serde_utils::quoted_u64")]
    pub target_epoch: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signing_root: Option<H256>,
}

pub(crate) fn export(
    connection: &Connection,
    genesis_validators_root: H256,
) -> Result<InterchangeFormat> {
    let mut validators = connection.prepare("SELECT id, pubkey FROM validators")?;

    let data = validators
        .query_map([], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, Vec<u8>>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .map(|(validator_id, pubkey)| {
            let signed_blocks = connection
                .prepare("SELECT slot, signing_root FROM blocks WHERE validator_id = ?1")?
                .query_map([validator_id], |row| {
                    Ok(InterchangeBlock {
                        slot: row.get::<_, i64>(0)? as u64,
                        signing_root: row
                            .get::<_, Option<Vec<u8>>>(1)?
                            .map(|bytes| H256::from_slice(&bytes)),
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;

            let signed_attestations = connection
                .prepare(
                    "SELECT source_epoch, target_epoch, signing_root \
                     FROM attestations WHERE validator_id = ?1",
                )?
                .query_map([validator_id], |row| {
                    Ok(InterchangeAttestation {
                        source_epoch: row.get::<_, i64>(0)? as u64,
                        target_epoch: row.get::<_, i64>(1)? as u64,
                        signing_root: row
                            .get::<_, Option<Vec<u8>>>(2)?
                            .map(|bytes| H256::from_slice(&bytes)),
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(InterchangeData {
                pubkey: format!("0x{}", hex::encode(pubkey)),
                signed_blocks,
                signed_attestations,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(InterchangeFormat {
        metadata: InterchangeMetadata {
            interchange_format_version: "5".to_owned(),
            genesis_validators_root,
        },
        data,
    })
}

pub(crate) fn import(
    connection: &mut Connection,
    interchange: &InterchangeFormat,
) -> Result<usize> {
    let transaction = connection.transaction()?;
    let mut imported = 0;

    for entry in &interchange.data {
        let pubkey_bytes = hex::decode(entry.pubkey.trim_start_matches("0x"))?;

        transaction.execute(
            "INSERT OR IGNORE INTO validators (pubkey) VALUES (?1)",
            [&pubkey_bytes],
        )?;

        let validator_id: i64 = transaction.query_row(
            "SELECT id FROM validators WHERE pubkey = ?1",
            [&pubkey_bytes],
            |row| row.get(0),
        )?;

        for block in &entry.signed_blocks {
            transaction.execute(
                "INSERT OR IGNORE INTO blocks (validator_id, slot, signing_root) \
                 VALUES (?1, ?2, ?3)",
                rusqlite::params![
                    validator_id,
                    block.slot as i64,
                    block.signing_root.map(|root| root.as_bytes().to_vec()),
                ],
            )?;
            imported += 1;
        }

        for attestation in &entry.signed_attestations {
            transaction.execute(
                "INSERT OR IGNORE INTO attestations \
                 (validator_id, source_epoch, target_epoch, signing_root) \
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![
                    validator_id,
                    attestation.source_epoch as i64,
                    attestation.target_epoch as i64,
                    attestation.signing_root.map(|root| root.as_bytes().to_vec()),
                ],
            )?;
            imported += 1;
        }
    }

    transaction.commit()?;

    Ok(imported)
}

#[cfg(test)]
mod tests {
    use bls::PublicKeyBytes;

    use crate::{
        AttestationVote, BlockProposal, SlashingProtector, SlashingValidationOutcome,
        DEFAULT_SLASHING_PROTECTION_HISTORY_LIMIT,
    };

    use super::*;

    #[test]
    fn histories_survive_a_roundtrip_through_the_interchange() -> Result<()> {
        let genesis_validators_root = H256::repeat_byte(1);

        let mut original = SlashingProtector::in_memory(
            DEFAULT_SLASHING_PROTECTION_HISTORY_LIMIT,
            genesis_validators_root,
        )?;

        let pubkey = PublicKeyBytes::repeat_byte(0xab);

        original.validate_and_store_proposal(
            pubkey,
            BlockProposal {
                slot: 10,
                signing_root: Some(H256::repeat_byte(2)),
            },
        )?;
        original.validate_and_store_attestation(
            pubkey,
            AttestationVote {
                source_epoch: 3,
                target_epoch: 7,
                signing_root: Some(H256::repeat_byte(3)),
            },
        )?;

        let exported = original.export_interchange(genesis_validators_root)?;

        let mut imported = SlashingProtector::in_memory(
            DEFAULT_SLASHING_PROTECTION_HISTORY_LIMIT,
            genesis_validators_root,
        )?;
        imported.import_interchange(&exported)?;

        // The imported history still refuses the surrounded vote.
        assert_eq!(
            imported.validate_and_store_attestation(
                pubkey,
                AttestationVote {
                    source_epoch: 4,
                    target_epoch: 6,
                    signing_root: None,
                },
            )?,
            SlashingValidationOutcome::Reject(
                crate::SlashingValidationError::SurroundedVote,
            ),
        );

        Ok(())
    }
}
