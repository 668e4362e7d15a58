use crate::armor::{BlockType, Encoder};
use crate::entity::{Entity, Signer};
use armory_core::{ArmoryError, ArmoryResult, EngineConfig};
use armory_policy::ensure_cert_usable;
use openpgp::crypto::KeyPair;
use openpgp::policy::StandardPolicy;
use openpgp::serialize::stream::{Encryptor, LiteralWriter, Message, Recipient};
use openpgp::serialize::stream::Signer as StreamSigner;
use sequoia_openpgp as openpgp;
use std::io::{self, Write};
use std::sync::Mutex;
use tracing::debug;

const ENCRYPT: &str = "encrypt";
const SIGN: &str = "sign";

/// Encrypts `plaintext` to every recipient and writes one armored
/// `PGP MESSAGE` to `output`.
///
/// The signer is prepared before the first byte is written. A failure of
/// `output` itself is reported as `TransportWriteFailure`; anything else
/// that goes wrong in the OpenPGP layer is a backend error.
pub fn encrypt(
    output: &mut (dyn Write + Send + Sync),
    recipients: &[Entity],
    plaintext: &[u8],
    signer: &Signer,
    config: &EngineConfig,
) -> ArmoryResult<()> {
    if recipients.is_empty() {
        return Err(ArmoryError::invalid_input(ENCRYPT, "no recipients"));
    }

    let policy = StandardPolicy::new();
    let mut keys: Vec<Recipient> = Vec::new();
    for recipient in recipients {
        ensure_cert_usable(recipient.cert()).map_err(|err| {
            ArmoryError::invalid_input(
                ENCRYPT,
                format!("recipient {}: {err}", recipient.fingerprint()),
            )
        })?;
        let before = keys.len();
        for key in recipient
            .cert()
            .keys()
            .with_policy(&policy, None)
            .supported()
            .alive()
            .revoked(false)
            .for_transport_encryption()
        {
            keys.push(key.into());
        }
        if keys.len() == before {
            return Err(ArmoryError::invalid_input(
                ENCRYPT,
                format!(
                    "recipient {} has no usable encryption key",
                    recipient.fingerprint()
                ),
            ));
        }
        debug!(recipient = %recipient.fingerprint(), "encrypting to recipient");
    }

    let keypair = match signer {
        Signer::None => None,
        Signer::Signing(entity) => {
            ensure_cert_usable(entity.cert()).map_err(|err| {
                ArmoryError::SignerPreparationFailed {
                    op: ENCRYPT,
                    reason: err.to_string(),
                }
            })?;
            let keypair = entity.signing_keypair().map_err(|reason| {
                ArmoryError::SignerPreparationFailed {
                    op: ENCRYPT,
                    reason,
                }
            })?;
            debug!(signer = %keypair.public().keyid(), "signing message");
            Some(keypair)
        }
        Signer::Verifying(entity) => {
            return Err(ArmoryError::SignerPreparationFailed {
                op: ENCRYPT,
                reason: format!(
                    "key {} was supplied for verification and cannot sign",
                    entity.fingerprint()
                ),
            });
        }
    };

    let failure = Mutex::new(None);
    let sink = SinkWriter::new(output, &failure);
    let mut armor = Encoder::new(sink, BlockType::Message, &config.armor_headers())
        .map_err(|err| classify(ENCRYPT, &failure, err))?;
    write_message(&mut armor, keys, keypair, plaintext)
        .map_err(|err| classify(ENCRYPT, &failure, err))?;
    armor
        .finalize()
        .map_err(|err| classify(ENCRYPT, &failure, err))?;

    debug!(bytes = plaintext.len(), "message encrypted");
    Ok(())
}

fn write_message<W: Write + Send + Sync>(
    armor: &mut Encoder<W>,
    recipients: Vec<Recipient<'_>>,
    keypair: Option<KeyPair>,
    plaintext: &[u8],
) -> openpgp::Result<()> {
    let message = Message::new(armor);
    let mut message = Encryptor::for_recipients(message, recipients).build()?;
    if let Some(keypair) = keypair {
        message = StreamSigner::new(message, keypair)?.build()?;
    }
    let mut message = LiteralWriter::new(message).build()?;
    message.write_all(plaintext)?;
    message.finalize()?;
    Ok(())
}

/// Produces an armored detached `PGP SIGNATURE` over `data`.
pub fn sign_detached(signer: &Entity, data: &[u8], config: &EngineConfig) -> ArmoryResult<String> {
    ensure_cert_usable(signer.cert()).map_err(|err| ArmoryError::SignerPreparationFailed {
        op: SIGN,
        reason: err.to_string(),
    })?;
    let keypair = signer
        .signing_keypair()
        .map_err(|reason| ArmoryError::SignerPreparationFailed { op: SIGN, reason })?;
    debug!(signer = %keypair.public().keyid(), bytes = data.len(), "detached signature");

    let mut armor = Encoder::new(Vec::new(), BlockType::Signature, &config.armor_headers())
        .map_err(|err| ArmoryError::backend(SIGN, format!("armor failed: {err}")))?;
    let message = Message::new(&mut armor);
    let mut message = StreamSigner::new(message, keypair)
        .map_err(|err| ArmoryError::backend(SIGN, format!("signer failed: {err}")))?
        .detached()
        .build()
        .map_err(|err| ArmoryError::backend(SIGN, format!("signer build failed: {err}")))?;
    message
        .write_all(data)
        .map_err(|err| ArmoryError::backend(SIGN, format!("write failed: {err}")))?;
    message
        .finalize()
        .map_err(|err| ArmoryError::backend(SIGN, format!("finalize failed: {err}")))?;
    let bytes = armor
        .finalize()
        .map_err(|err| ArmoryError::backend(SIGN, format!("armor finalize failed: {err}")))?;
    String::from_utf8(bytes).map_err(|err| ArmoryError::backend(SIGN, err))
}

/// Forwards to the caller's writer and remembers the first error it
/// returned, so that errors surfacing later through the OpenPGP stack can be
/// attributed to the sink.
struct SinkWriter<'a> {
    inner: &'a mut (dyn Write + Send + Sync),
    failure: &'a Mutex<Option<io::Error>>,
}

impl<'a> SinkWriter<'a> {
    fn new(
        inner: &'a mut (dyn Write + Send + Sync),
        failure: &'a Mutex<Option<io::Error>>,
    ) -> Self {
        Self { inner, failure }
    }

    fn record(&self, err: io::Error) -> io::Error {
        if err.kind() == io::ErrorKind::Interrupted {
            return err;
        }
        let copy = io::Error::new(err.kind(), err.to_string());
        if let Ok(mut slot) = self.failure.lock()
            && slot.is_none()
        {
            *slot = Some(err);
        }
        copy
    }
}

impl Write for SinkWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.inner.write(buf) {
            Ok(n) => Ok(n),
            Err(err) => Err(self.record(err)),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.inner.flush() {
            Ok(()) => Ok(()),
            Err(err) => Err(self.record(err)),
        }
    }
}

fn classify(
    op: &'static str,
    failure: &Mutex<Option<io::Error>>,
    err: impl std::fmt::Display,
) -> ArmoryError {
    let recorded = failure.lock().ok().and_then(|mut slot| slot.take());
    match recorded {
        Some(source) => ArmoryError::TransportWriteFailure { op, source },
        None => ArmoryError::backend(op, err),
    }
}
