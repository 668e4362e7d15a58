use openpgp::Cert;
use openpgp::KeyHandle;
use openpgp::Packet;
use openpgp::PacketPile;
use openpgp::packet::Tag;
use openpgp::parse::Parse;
use openpgp::policy::StandardPolicy;
use openpgp::types::{HashAlgorithm, RevocationStatus};
use sequoia_openpgp as openpgp;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("policy parse error: {0}")]
    Parse(String),
    #[error("policy violation: {0}")]
    Violation(String),
}

pub fn hash_is_acceptable(hash: HashAlgorithm) -> bool {
    matches!(
        hash,
        HashAlgorithm::SHA224
            | HashAlgorithm::SHA256
            | HashAlgorithm::SHA384
            | HashAlgorithm::SHA512
            | HashAlgorithm::SHA3_256
            | HashAlgorithm::SHA3_512
    )
}

/// The certificate itself is valid under the standard policy, alive and
/// not revoked.
pub fn ensure_cert_usable(cert: &Cert) -> Result<(), PolicyError> {
    let policy = StandardPolicy::new();
    let valid = cert
        .with_policy(&policy, None)
        .map_err(|err| PolicyError::Violation(format!("certificate is not valid: {err}")))?;
    valid
        .alive()
        .map_err(|err| PolicyError::Violation(format!("certificate is not alive: {err}")))?;
    if let RevocationStatus::Revoked(_) = valid.revocation_status() {
        return Err(PolicyError::Violation("certificate is revoked".to_string()));
    }
    Ok(())
}

pub fn cert_has_encryption_key(cert: &Cert) -> bool {
    let policy = StandardPolicy::new();
    cert.keys()
        .with_policy(&policy, None)
        .supported()
        .alive()
        .revoked(false)
        .for_transport_encryption()
        .next()
        .is_some()
}

/// A signing-capable key with secret material is present.
pub fn cert_has_secret_signing_key(cert: &Cert) -> bool {
    let policy = StandardPolicy::new();
    cert.keys()
        .secret()
        .with_policy(&policy, None)
        .supported()
        .alive()
        .revoked(false)
        .for_signing()
        .next()
        .is_some()
}

/// Checks the packet structure of an encrypted message: at least one
/// recipient packet, integrity-protected data, no legacy unprotected
/// encryption. Returns the number of recipient packets.
pub fn ensure_encryption_output(bytes: &[u8]) -> Result<usize, PolicyError> {
    let pile = PacketPile::from_bytes(bytes)
        .map_err(|err| PolicyError::Parse(format!("parse message failed: {err}")))?;
    let mut pkesk_count = 0usize;
    let mut seip_count = 0usize;
    for packet in pile.descendants() {
        match packet {
            Packet::PKESK(_) => pkesk_count += 1,
            Packet::SEIP(_) => seip_count += 1,
            _ => {}
        }
        if packet.tag() == Tag::SED {
            return Err(PolicyError::Violation(
                "encrypted data is not integrity protected (SED packet)".to_string(),
            ));
        }
    }
    if pkesk_count == 0 {
        return Err(PolicyError::Violation(
            "no recipient packets found".to_string(),
        ));
    }
    if seip_count == 0 {
        return Err(PolicyError::Violation(
            "encrypted data is not integrity protected (missing SEIP packet)".to_string(),
        ));
    }
    Ok(pkesk_count)
}

/// Checks a detached signature: at least one signature packet, none made
/// with a weak hash.
pub fn ensure_signature_output(bytes: &[u8]) -> Result<(), PolicyError> {
    let pile = PacketPile::from_bytes(bytes)
        .map_err(|err| PolicyError::Parse(format!("parse signature failed: {err}")))?;
    let mut sig_count = 0usize;
    for packet in pile.descendants() {
        if let Packet::Signature(sig) = packet {
            sig_count += 1;
            if !hash_is_acceptable(sig.hash_algo()) {
                return Err(PolicyError::Violation(format!(
                    "weak hash used: {:?}",
                    sig.hash_algo()
                )));
            }
        }
    }
    if sig_count == 0 {
        return Err(PolicyError::Violation("no signatures found".to_string()));
    }
    Ok(())
}

/// Key handles named by the recipient packets of an encrypted message.
/// Anonymous recipients are skipped.
pub fn message_recipients(bytes: &[u8]) -> Result<Vec<KeyHandle>, PolicyError> {
    let pile = PacketPile::from_bytes(bytes)
        .map_err(|err| PolicyError::Parse(format!("parse message failed: {err}")))?;
    let mut recipients = Vec::new();
    for packet in pile.descendants() {
        if let Packet::PKESK(pkesk) = packet
            && let Some(recipient) = pkesk.recipient()
        {
            recipients.push(recipient);
        }
    }
    Ok(recipients)
}
