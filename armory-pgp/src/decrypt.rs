//! Decryption engine and detached verification.
//!
//! Plaintext is buffered in full and only handed out once the signature
//! checks requested by the caller have passed. Every error path drops the
//! buffer.

use crate::armor::{self, BlockType};
use crate::entity::{Entity, Signer};
use armory_core::{
    ArmoryError, ArmoryResult, Decrypted, EngineConfig, KeyId, VerificationFailure,
    VerificationOutcome,
};
use armory_policy::{ensure_encryption_output, ensure_signature_output, message_recipients};
use openpgp::crypto::{KeyPair, SessionKey};
use openpgp::packet::{PKESK, SKESK};
use openpgp::parse::Parse;
use openpgp::parse::stream::{
    DecryptionHelper, DecryptorBuilder, DetachedVerifierBuilder, MessageLayer, MessageStructure,
    VerificationError, VerificationHelper, VerificationResult,
};
use openpgp::policy::StandardPolicy;
use openpgp::types::SymmetricAlgorithm;
use openpgp::{Cert, Fingerprint, KeyHandle};
use sequoia_openpgp as openpgp;
use std::fmt::Display;
use std::io::Read;
use tracing::{debug, warn};
use zeroize::Zeroizing;

const DECRYPT: &str = "decrypt";
const VERIFY: &str = "verify";

/// What one signature in a message turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SignatureRecord {
    Good {
        key_id: String,
        fingerprint: Fingerprint,
    },
    /// Issued by a key outside the expected signer's certificate.
    UnknownIssuer { issuer: Option<String> },
    Bad { reason: String },
}

struct Helper {
    keypairs: Vec<KeyPair>,
    signer: Option<Entity>,
    records: Vec<SignatureRecord>,
}

impl Helper {
    fn new(keypairs: Vec<KeyPair>, signer: Option<Entity>) -> Self {
        Self {
            keypairs,
            signer,
            records: Vec::new(),
        }
    }

    fn record(&mut self, result: VerificationResult<'_>) {
        let record = match result {
            Ok(good) => SignatureRecord::Good {
                key_id: good.ka.key().keyid().to_hex(),
                fingerprint: good.ka.key().fingerprint(),
            },
            Err(VerificationError::MissingKey { sig, .. }) => SignatureRecord::UnknownIssuer {
                issuer: sig.get_issuers().first().map(KeyHandle::to_hex),
            },
            Err(other) => SignatureRecord::Bad {
                reason: other.to_string(),
            },
        };
        self.records.push(record);
    }

    /// Applies the signer checks in a fixed order: no signature at all,
    /// then a signature that failed to verify, then a signature made by
    /// some other key. A signature naming no issuer counts as the latter.
    fn outcome(&self) -> VerificationOutcome {
        let Some(signer) = &self.signer else {
            return VerificationOutcome::NotRequested;
        };
        evaluate(signer, &self.records)
    }
}

fn evaluate(signer: &Entity, records: &[SignatureRecord]) -> VerificationOutcome {
    if records.is_empty() {
        return VerificationOutcome::Failed(VerificationFailure::Missing);
    }

    if let Some(SignatureRecord::Bad { reason }) = records
        .iter()
        .find(|record| matches!(record, SignatureRecord::Bad { .. }))
    {
        return VerificationOutcome::Failed(VerificationFailure::Invalid(reason.clone()));
    }

    for record in records {
        if let SignatureRecord::Good {
            key_id,
            fingerprint,
        } = record
            && signer.owns_key(&KeyHandle::from(fingerprint.clone()))
        {
            return VerificationOutcome::Verified {
                key_id: KeyId(key_id.clone()),
                fingerprint: fingerprint.to_hex(),
            };
        }
    }

    let actual = records
        .iter()
        .find_map(|record| match record {
            SignatureRecord::UnknownIssuer {
                issuer: Some(issuer),
            } => Some(issuer.clone()),
            SignatureRecord::Good { key_id, .. } => Some(key_id.clone()),
            _ => None,
        })
        .unwrap_or_else(|| "(no issuer)".to_string());
    VerificationOutcome::Failed(VerificationFailure::KeyMismatch {
        expected: signer.key_id().0,
        actual,
    })
}

impl VerificationHelper for Helper {
    fn get_certs(&mut self, _ids: &[KeyHandle]) -> openpgp::Result<Vec<Cert>> {
        Ok(self
            .signer
            .iter()
            .map(|entity| entity.cert().clone())
            .collect())
    }

    fn check(&mut self, structure: MessageStructure) -> openpgp::Result<()> {
        for layer in structure.into_iter() {
            if let MessageLayer::SignatureGroup { results } = layer {
                for result in results {
                    self.record(result);
                }
            }
        }
        Ok(())
    }
}

impl DecryptionHelper for Helper {
    fn decrypt(
        &mut self,
        pkesks: &[PKESK],
        _skesks: &[SKESK],
        sym_algo: Option<SymmetricAlgorithm>,
        decrypt: &mut dyn FnMut(Option<SymmetricAlgorithm>, &SessionKey) -> bool,
    ) -> openpgp::Result<Option<Cert>> {
        for pkesk in pkesks {
            for keypair in self.keypairs.iter_mut() {
                if let Some(recipient) = pkesk.recipient()
                    && !keypair.public().key_handle().aliases(&recipient)
                {
                    continue;
                }
                if let Some((algo, sk)) = pkesk.decrypt(keypair, sym_algo)
                    && decrypt(algo, &sk)
                {
                    debug!(key = %keypair.public().keyid(), "session key recovered");
                    return Ok(None);
                }
            }
        }
        Err(openpgp::Error::MissingSessionKey("no secret key matches any recipient".into()).into())
    }
}

/// Decrypts an armored `PGP MESSAGE` with an unlocked recipient entity.
///
/// With a signer the message must carry a valid signature by the signer's
/// primary key or one of its subkeys; otherwise no plaintext is returned.
pub fn decrypt(
    recipient: &Entity,
    ciphertext: &[u8],
    signer: &Signer,
    config: &EngineConfig,
) -> ArmoryResult<Decrypted> {
    if ciphertext.len() > config.max_message_bytes {
        return Err(ArmoryError::MessageTooLarge {
            op: DECRYPT,
            limit: config.max_message_bytes,
        });
    }

    let keypairs = recipient.decryption_keypairs();
    if keypairs.is_empty() {
        return Err(ArmoryError::invalid_input(
            DECRYPT,
            format!(
                "key {} has no unlocked decryption key",
                recipient.fingerprint()
            ),
        ));
    }

    let block = armor::decode(DECRYPT, ciphertext)?;
    if block.block_type != BlockType::Message {
        return Err(ArmoryError::UnexpectedMessageType {
            op: DECRYPT,
            actual: block.block_type.label().to_string(),
        });
    }
    let recipients = ensure_encryption_output(&block.body).map_err(decryption_failed)?;
    let named = message_recipients(&block.body).map_err(decryption_failed)?;
    if named.len() == recipients && !named.iter().any(|handle| recipient.owns_key(handle)) {
        return Err(decryption_failed(format!(
            "message is not addressed to key {}",
            recipient.fingerprint()
        )));
    }
    debug!(
        recipient = %recipient.fingerprint(),
        recipients,
        bytes = block.body.len(),
        "decrypting message"
    );

    let helper = Helper::new(keypairs, signer.entity().cloned());
    let policy = StandardPolicy::new();
    let mut decryptor = DecryptorBuilder::from_bytes(&block.body)
        .map_err(decryption_failed)?
        .with_policy(&policy, None, helper)
        .map_err(decryption_failed)?;

    let limit = config.max_message_bytes;
    let mut plaintext = Zeroizing::new(Vec::new());
    decryptor
        .by_ref()
        .take(u64::try_from(limit).unwrap_or(u64::MAX).saturating_add(1))
        .read_to_end(&mut plaintext)
        .map_err(decryption_failed)?;
    if plaintext.len() > limit {
        return Err(ArmoryError::MessageTooLarge { op: DECRYPT, limit });
    }

    let outcome = decryptor.into_helper().outcome();
    let outcome = outcome.into_result(DECRYPT).inspect_err(|err| {
        warn!(error = %err, "rejecting decrypted message");
    })?;
    if let VerificationOutcome::Verified { key_id, .. } = &outcome {
        debug!(signer = %key_id, "signature verified");
    }
    Ok(Decrypted::new(std::mem::take(&mut *plaintext), outcome))
}

/// Checks an armored detached `PGP SIGNATURE` over `data` against the
/// signer's certificate.
pub fn verify_detached(
    signer: &Entity,
    data: &[u8],
    signature: &[u8],
    config: &EngineConfig,
) -> ArmoryResult<VerificationOutcome> {
    if signature.len() > config.max_message_bytes {
        return Err(ArmoryError::MessageTooLarge {
            op: VERIFY,
            limit: config.max_message_bytes,
        });
    }
    let block = armor::decode(VERIFY, signature)?;
    if block.block_type != BlockType::Signature {
        return Err(ArmoryError::MalformedArmor {
            op: VERIFY,
            reason: format!(
                "expected {}, got {}",
                BlockType::Signature.label(),
                block.block_type.label()
            ),
        });
    }
    ensure_signature_output(&block.body).map_err(signature_invalid)?;

    let helper = Helper::new(Vec::new(), Some(signer.clone()));
    let policy = StandardPolicy::new();
    let mut verifier = DetachedVerifierBuilder::from_bytes(&block.body)
        .map_err(signature_invalid)?
        .with_policy(&policy, None, helper)
        .map_err(signature_invalid)?;
    verifier.verify_bytes(data).map_err(signature_invalid)?;

    let outcome = verifier.into_helper().outcome();
    let outcome = outcome.into_result(VERIFY).inspect_err(|err| {
        warn!(error = %err, "detached signature rejected");
    })?;
    debug!(signer = %signer.fingerprint(), "detached signature verified");
    Ok(outcome)
}

fn decryption_failed(err: impl Display) -> ArmoryError {
    ArmoryError::DecryptionFailed {
        op: DECRYPT,
        reason: err.to_string(),
    }
}

fn signature_invalid(err: impl Display) -> ArmoryError {
    ArmoryError::SignatureInvalid {
        op: VERIFY,
        reason: err.to_string(),
    }
}
