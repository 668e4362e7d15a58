use crate::entity::{Entity, Signer};
use crate::keys::{read_key_ring, read_private_entity, read_public_entity, read_verifying_entity};
use crate::{decrypt, encrypt, keygen};
use armory_core::{
    ArmoryError, ArmoryResult, Backend, DecryptRequest, Decrypted, EncryptRequest, EngineConfig,
    KeyGenParams, KeyMeta, KeyPair, KeySource, SignRequest, SignerSpec, VerificationOutcome,
    VerifyRequest,
};
use std::io::Write;
use tracing::debug;

/// The sequoia-openpgp engine. Holds configuration only; key material is
/// read fresh for every call and dropped when the call returns.
#[derive(Debug, Clone, Default)]
pub struct NativeBackend {
    config: EngineConfig,
}

impl NativeBackend {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// The signer of an outgoing message. Any failure to read or unlock it
    /// is reported as a signer preparation failure.
    fn signing_signer(&self, spec: &SignerSpec) -> ArmoryResult<Signer> {
        match spec {
            SignerSpec::None => Ok(Signer::None),
            SignerSpec::Signing { key, passphrase } => {
                read_private_entity(key, passphrase, &self.config)
                    .map(Signer::Signing)
                    .map_err(|err| ArmoryError::SignerPreparationFailed {
                        op: "encrypt",
                        reason: err.to_string(),
                    })
            }
            SignerSpec::Verifying(key) => Err(ArmoryError::SignerPreparationFailed {
                op: "encrypt",
                reason: format!("{} is a verification key and cannot sign", key.describe()),
            }),
        }
    }

    /// The expected signer of an incoming message. Only public material is
    /// needed, so a private key block is accepted without its passphrase.
    fn verifying_signer(&self, spec: &SignerSpec) -> ArmoryResult<Signer> {
        match spec {
            SignerSpec::None => Ok(Signer::None),
            SignerSpec::Signing { key, .. } | SignerSpec::Verifying(key) => {
                read_verifying_entity(key, &self.config).map(Signer::Verifying)
            }
        }
    }
}

impl Backend for NativeBackend {
    fn name(&self) -> &'static str {
        "native"
    }

    fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn generate_key_pair(&self, params: KeyGenParams) -> ArmoryResult<KeyPair> {
        keygen::generate_key_pair(&params, &self.config)
    }

    fn inspect_keys(&self, source: &KeySource) -> ArmoryResult<Vec<KeyMeta>> {
        Ok(read_key_ring(source, &self.config)?
            .iter()
            .map(Entity::meta)
            .collect())
    }

    fn encrypt(
        &self,
        output: &mut (dyn Write + Send + Sync),
        req: EncryptRequest,
    ) -> ArmoryResult<()> {
        let recipient = read_public_entity(&req.recipient, &self.config)?;
        let signer = self.signing_signer(&req.signer)?;
        encrypt::encrypt(output, &[recipient], &req.plaintext, &signer, &self.config)
    }

    fn decrypt(&self, req: DecryptRequest) -> ArmoryResult<Decrypted> {
        let recipient = read_private_entity(&req.recipient, &req.passphrase, &self.config)?;
        let signer = self.verifying_signer(&req.signer)?;
        debug!(
            recipient = %recipient.fingerprint(),
            verify = !signer.is_none(),
            "decrypt request"
        );
        decrypt::decrypt(&recipient, &req.ciphertext, &signer, &self.config)
    }

    fn sign(&self, req: SignRequest) -> ArmoryResult<String> {
        let signer = read_private_entity(&req.signer, &req.passphrase, &self.config)?;
        encrypt::sign_detached(&signer, &req.data, &self.config)
    }

    fn verify(&self, req: VerifyRequest) -> ArmoryResult<VerificationOutcome> {
        let signer = read_verifying_entity(&req.signer, &self.config)?;
        decrypt::verify_detached(&signer, &req.data, &req.signature, &self.config)
    }
}
