//! Key parser: armored key blocks from a file or buffer into entities.
//!
//! The armor block type is checked before any packet is parsed, so a
//! private key handed to the public path is rejected without touching its
//! key material.

use crate::armor::{self, ArmorBlock, BlockType};
use crate::entity::Entity;
use armory_core::{ArmoryError, ArmoryResult, EngineConfig, KeySource, Passphrase};
use openpgp::Cert;
use openpgp::cert::CertParser;
use openpgp::parse::Parse;
use sequoia_openpgp as openpgp;
use tracing::debug;

const READ_PUBLIC: &str = "read public key";
const READ_PRIVATE: &str = "read private key";
const READ_SIGNER: &str = "read signer key";
const READ_KEY_RING: &str = "read key ring";

/// Reads a single `PGP PUBLIC KEY BLOCK`.
pub fn read_public_entity(source: &KeySource, config: &EngineConfig) -> ArmoryResult<Entity> {
    let block = read_block(READ_PUBLIC, source, config)?;
    expect_block(READ_PUBLIC, &block, BlockType::PublicKey)?;
    let cert = parse_cert(READ_PUBLIC, &block.body)?;
    debug!(
        source = %source.describe(),
        fingerprint = %cert.fingerprint(),
        "read public key"
    );
    Ok(Entity::new(cert.strip_secret_key_material()))
}

/// Reads a single `PGP PRIVATE KEY BLOCK` and unlocks its secret keys.
/// The passphrase is only used for keys stored encrypted.
pub fn read_private_entity(
    source: &KeySource,
    passphrase: &Passphrase,
    config: &EngineConfig,
) -> ArmoryResult<Entity> {
    let block = read_block(READ_PRIVATE, source, config)?;
    expect_block(READ_PRIVATE, &block, BlockType::PrivateKey)?;
    let cert = parse_cert(READ_PRIVATE, &block.body)?;
    debug!(
        source = %source.describe(),
        fingerprint = %cert.fingerprint(),
        "read private key"
    );
    Entity::unlock(READ_PRIVATE, cert, passphrase)
}

/// Reads the public half of either key block type, for checking
/// signatures. Secret material, if present, is discarded unread.
pub fn read_verifying_entity(source: &KeySource, config: &EngineConfig) -> ArmoryResult<Entity> {
    let block = read_block(READ_SIGNER, source, config)?;
    if !matches!(block.block_type, BlockType::PublicKey | BlockType::PrivateKey) {
        return Err(ArmoryError::WrongKeyType {
            op: READ_SIGNER,
            expected: BlockType::PublicKey.label().to_string(),
            actual: block.block_type.label().to_string(),
        });
    }
    let cert = parse_cert(READ_SIGNER, &block.body)?;
    Ok(Entity::new(cert.strip_secret_key_material()))
}

/// Reads one or more concatenated key blocks, each holding one or more
/// certificates. Secret keys are returned locked.
pub fn read_key_ring(source: &KeySource, config: &EngineConfig) -> ArmoryResult<Vec<Entity>> {
    let bytes = source.read(READ_KEY_RING, config.max_key_bytes)?;
    let blocks = armor::decode_all(READ_KEY_RING, &bytes)?;

    let mut entities = Vec::new();
    for block in &blocks {
        if !matches!(block.block_type, BlockType::PublicKey | BlockType::PrivateKey) {
            return Err(ArmoryError::WrongKeyType {
                op: READ_KEY_RING,
                expected: format!(
                    "{} or {}",
                    BlockType::PublicKey.label(),
                    BlockType::PrivateKey.label()
                ),
                actual: block.block_type.label().to_string(),
            });
        }
        let parser = CertParser::from_bytes(&block.body).map_err(|err| ArmoryError::MalformedKey {
            op: READ_KEY_RING,
            reason: err.to_string(),
        })?;
        for cert in parser {
            let cert = cert.map_err(|err| ArmoryError::MalformedKey {
                op: READ_KEY_RING,
                reason: err.to_string(),
            })?;
            entities.push(Entity::new(cert));
        }
    }

    if entities.is_empty() {
        return Err(ArmoryError::EmptyKeyRing { op: READ_KEY_RING });
    }
    debug!(
        source = %source.describe(),
        blocks = blocks.len(),
        keys = entities.len(),
        "read key ring"
    );
    Ok(entities)
}

fn read_block(
    op: &'static str,
    source: &KeySource,
    config: &EngineConfig,
) -> ArmoryResult<ArmorBlock> {
    let bytes = source.read(op, config.max_key_bytes)?;
    armor::decode(op, &bytes)
}

fn expect_block(op: &'static str, block: &ArmorBlock, expected: BlockType) -> ArmoryResult<()> {
    if block.block_type != expected {
        return Err(ArmoryError::WrongKeyType {
            op,
            expected: expected.label().to_string(),
            actual: block.block_type.label().to_string(),
        });
    }
    Ok(())
}

fn parse_cert(op: &'static str, body: &[u8]) -> ArmoryResult<Cert> {
    Cert::from_bytes(body).map_err(|err| ArmoryError::MalformedKey {
        op,
        reason: err.to_string(),
    })
}
