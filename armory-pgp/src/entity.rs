use crate::armor::{BlockType, Encoder};
use armory_core::{
    ArmoryError, ArmoryResult, EngineConfig, KeyId, KeyMeta, Passphrase, UserId,
};
use armory_policy::{cert_has_encryption_key, cert_has_secret_signing_key};
use openpgp::crypto::{KeyPair, Password, S2K};
use openpgp::packet::Key;
use openpgp::packet::key::{SecretKeyMaterial, SecretParts, UnspecifiedRole};
use openpgp::policy::StandardPolicy;
use openpgp::serialize::Serialize;
use openpgp::{Cert, KeyHandle};
use sequoia_openpgp as openpgp;
use std::fmt;
use std::time::UNIX_EPOCH;
use tracing::{debug, warn};

type SecretKey = Key<SecretParts, UnspecifiedRole>;

/// GNU dummy S2K: a secret key packet with the secret left out, as written
/// by `gpg --export-secret-subkeys` for an offline primary key.
const GNU_DUMMY_S2K: u8 = 101;

fn is_stub(key: &SecretKey) -> bool {
    if let SecretKeyMaterial::Encrypted(encrypted) = key.secret() {
        matches!(encrypted.s2k(), S2K::Private { tag, .. } if *tag == GNU_DUMMY_S2K)
    } else {
        false
    }
}

fn is_protected(key: &SecretKey) -> bool {
    key.secret().is_encrypted() && !is_stub(key)
}

/// A parsed OpenPGP certificate plus any secret keys unlocked for this
/// call. Entities never outlive the operation that read them.
#[derive(Clone)]
pub struct Entity {
    cert: Cert,
    unlocked: Vec<SecretKey>,
}

impl Entity {
    pub fn new(cert: Cert) -> Self {
        Self {
            cert,
            unlocked: Vec::new(),
        }
    }

    /// Decrypts every passphrase-protected secret key of `cert`. Keys that
    /// are stored in the clear are used as-is and the passphrase is ignored
    /// for them. Stubs of offline keys are skipped; at least one real
    /// secret key must remain.
    pub fn unlock(op: &'static str, cert: Cert, passphrase: &Passphrase) -> ArmoryResult<Self> {
        if !cert.is_tsk() {
            return Err(ArmoryError::MalformedKey {
                op,
                reason: "key block carries no secret key material".to_string(),
            });
        }

        let password = Password::from(passphrase.as_str());
        let mut unlocked = Vec::new();
        let mut available = 0usize;
        for ka in cert.keys().secret() {
            let key = ka.key();
            if is_stub(key) {
                debug!(key = %key.keyid(), "skipping offline key stub");
                continue;
            }
            available += 1;
            if !key.secret().is_encrypted() {
                continue;
            }
            let decrypted = key.clone().decrypt_secret(&password).map_err(|err| {
                ArmoryError::IncorrectPassphrase {
                    op,
                    reason: err.to_string(),
                }
            })?;
            unlocked.push(decrypted);
        }
        if available == 0 {
            return Err(ArmoryError::MalformedKey {
                op,
                reason: "every secret key is an offline stub".to_string(),
            });
        }

        if unlocked.is_empty() && !passphrase.is_empty() {
            warn!(
                fingerprint = %cert.fingerprint(),
                "passphrase supplied for an unprotected key; ignoring it"
            );
        }
        debug!(
            fingerprint = %cert.fingerprint(),
            unlocked = unlocked.len(),
            "secret keys ready"
        );
        Ok(Self { cert, unlocked })
    }

    pub fn cert(&self) -> &Cert {
        &self.cert
    }

    pub fn fingerprint(&self) -> String {
        self.cert.fingerprint().to_hex()
    }

    pub fn key_id(&self) -> KeyId {
        KeyId(self.cert.keyid().to_hex())
    }

    pub fn subkey_ids(&self) -> Vec<KeyId> {
        self.cert
            .keys()
            .subkeys()
            .map(|ka| KeyId(ka.key().keyid().to_hex()))
            .collect()
    }

    pub fn user_ids(&self) -> Vec<UserId> {
        self.cert
            .userids()
            .map(|u| UserId(u.userid().to_string()))
            .collect()
    }

    /// True when `handle` names the primary key or any subkey.
    pub fn owns_key(&self, handle: &KeyHandle) -> bool {
        self.cert
            .keys()
            .any(|ka| ka.key().key_handle().aliases(handle))
    }

    pub fn has_secret(&self) -> bool {
        self.cert.is_tsk()
    }

    /// Whether any secret key is stored passphrase-protected.
    pub fn is_encrypted(&self) -> bool {
        self.cert
            .keys()
            .secret()
            .any(|ka| is_protected(ka.key()))
    }

    /// Every secret key other than offline stubs is usable without a
    /// passphrase.
    pub fn is_unlocked(&self) -> bool {
        self.has_secret()
            && self
                .cert
                .keys()
                .secret()
                .filter(|ka| !is_stub(ka.key()))
                .all(|ka| self.usable_secret(ka.key()).is_some())
    }

    pub fn can_encrypt_to(&self) -> bool {
        cert_has_encryption_key(&self.cert)
    }

    pub fn can_sign(&self) -> bool {
        cert_has_secret_signing_key(&self.cert)
    }

    pub fn into_public(self) -> Self {
        Self::new(self.cert.strip_secret_key_material())
    }

    pub fn meta(&self) -> KeyMeta {
        let primary = self.cert.primary_key().key();
        KeyMeta {
            key_id: self.key_id(),
            fingerprint: self.fingerprint(),
            user_ids: self.user_ids(),
            algo: primary.pk_algo().to_string(),
            created_utc: primary
                .creation_time()
                .duration_since(UNIX_EPOCH)
                .ok()
                .map(|d| d.as_secs().to_string()),
            subkeys: self.subkey_ids(),
            has_secret: self.has_secret(),
            secret_encrypted: self.is_encrypted(),
        }
    }

    /// Armored `PGP PUBLIC KEY BLOCK` for this certificate.
    pub fn armored_public(&self, config: &EngineConfig) -> ArmoryResult<String> {
        self.export("export public key", BlockType::PublicKey, config)
    }

    /// Armored `PGP PRIVATE KEY BLOCK`. Secret keys keep the protection they
    /// were read or generated with.
    pub fn armored_private(&self, config: &EngineConfig) -> ArmoryResult<String> {
        if !self.has_secret() {
            return Err(ArmoryError::invalid_input(
                "export private key",
                "no secret key material to export",
            ));
        }
        self.export("export private key", BlockType::PrivateKey, config)
    }

    fn export(
        &self,
        op: &'static str,
        block_type: BlockType,
        config: &EngineConfig,
    ) -> ArmoryResult<String> {
        let mut encoder = Encoder::new(Vec::new(), block_type, &config.armor_headers())
            .map_err(|err| ArmoryError::backend(op, format!("armor failed: {err}")))?;
        let written = match block_type {
            BlockType::PrivateKey => self.cert.as_tsk().serialize(&mut encoder),
            _ => self.cert.serialize(&mut encoder),
        };
        written.map_err(|err| ArmoryError::backend(op, format!("serialize failed: {err}")))?;
        let bytes = encoder
            .finalize()
            .map_err(|err| ArmoryError::backend(op, format!("armor finalize failed: {err}")))?;
        String::from_utf8(bytes).map_err(|err| ArmoryError::backend(op, err))
    }

    /// The secret half of `key` in usable form: the key itself when stored
    /// in the clear, its unlocked copy otherwise.
    fn usable_secret(&self, key: &SecretKey) -> Option<SecretKey> {
        if is_stub(key) {
            return None;
        }
        if !key.secret().is_encrypted() {
            return Some(key.clone());
        }
        let fingerprint = key.fingerprint();
        self.unlocked
            .iter()
            .find(|unlocked| unlocked.fingerprint() == fingerprint)
            .cloned()
    }

    pub(crate) fn signing_keypair(&self) -> Result<KeyPair, String> {
        let policy = StandardPolicy::new();
        let candidates: Vec<SecretKey> = self
            .cert
            .keys()
            .secret()
            .with_policy(&policy, None)
            .supported()
            .alive()
            .revoked(false)
            .for_signing()
            .map(|ka| ka.key().clone())
            .filter(|key| !is_stub(key))
            .collect();
        if candidates.is_empty() {
            return Err("no usable signing key with secret material".to_string());
        }
        let key = candidates
            .iter()
            .find_map(|key| self.usable_secret(key))
            .ok_or_else(|| "signing key is passphrase-protected and locked".to_string())?;
        key.into_keypair().map_err(|err| err.to_string())
    }

    pub(crate) fn decryption_keypairs(&self) -> Vec<KeyPair> {
        let policy = StandardPolicy::new();
        self.cert
            .keys()
            .secret()
            .with_policy(&policy, None)
            .supported()
            .revoked(false)
            .for_transport_encryption()
            .filter_map(|ka| self.usable_secret(ka.key()))
            .filter_map(|key| key.into_keypair().ok())
            .collect()
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("fingerprint", &self.fingerprint())
            .field("has_secret", &self.has_secret())
            .field("unlocked", &self.unlocked.len())
            .finish()
    }
}

/// The optional counterpart of an operation: nobody, a key that signs
/// outgoing messages, or a key that incoming signatures must match.
#[derive(Debug, Clone, Default)]
pub enum Signer {
    #[default]
    None,
    Signing(Entity),
    Verifying(Entity),
}

impl Signer {
    pub fn entity(&self) -> Option<&Entity> {
        match self {
            Signer::None => None,
            Signer::Signing(entity) | Signer::Verifying(entity) => Some(entity),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Signer::None)
    }
}
