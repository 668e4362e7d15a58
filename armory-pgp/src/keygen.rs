use crate::entity::Entity;
use armory_core::{ArmoryError, ArmoryResult, EngineConfig, KeyAlgorithm, KeyGenParams, KeyPair};
use openpgp::cert::prelude::*;
use openpgp::crypto::Password;
use sequoia_openpgp as openpgp;
use tracing::debug;
use zeroize::Zeroizing;

const KEYGEN: &str = "generate key pair";

fn cipher_suite(algo: KeyAlgorithm) -> CipherSuite {
    match algo {
        KeyAlgorithm::Cv25519 => CipherSuite::Cv25519,
        KeyAlgorithm::Rsa3k => CipherSuite::RSA3k,
        KeyAlgorithm::Rsa4k => CipherSuite::RSA4k,
        KeyAlgorithm::P256 => CipherSuite::P256,
        KeyAlgorithm::P384 => CipherSuite::P384,
    }
}

/// Generates a fresh certificate with a signing primary key and an
/// encryption subkey, returned as armored public and private halves.
///
/// The private half is encrypted only when `params` carries a non-empty
/// passphrase.
pub fn generate_key_pair(params: &KeyGenParams, config: &EngineConfig) -> ArmoryResult<KeyPair> {
    let user_id = params.user_id();
    if user_id.0.is_empty() {
        return Err(ArmoryError::invalid_input(
            KEYGEN,
            "a name or an email address is required",
        ));
    }

    let suite = cipher_suite(config.cipher_suite);
    suite
        .is_supported()
        .map_err(|err| ArmoryError::backend(KEYGEN, format!("{} unsupported: {err}", config.cipher_suite)))?;

    let mut builder = CertBuilder::general_purpose(Some(user_id.0.clone())).set_cipher_suite(suite);
    if params.protected()
        && let Some(passphrase) = &params.passphrase
    {
        builder = builder.set_password(Some(Password::from(passphrase.as_str())));
    }
    let (cert, _rev) = builder
        .generate()
        .map_err(|err| ArmoryError::backend(KEYGEN, format!("keygen failed: {err}")))?;
    debug!(
        fingerprint = %cert.fingerprint(),
        suite = %config.cipher_suite,
        protected = params.protected(),
        "generated key pair"
    );

    let entity = Entity::new(cert);
    Ok(KeyPair {
        fingerprint: entity.fingerprint(),
        public_key: entity.armored_public(config)?,
        private_key: Zeroizing::new(entity.armored_private(config)?),
    })
}
