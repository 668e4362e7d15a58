mod config;
mod error;

pub use config::{DEFAULT_MAX_KEY_BYTES, DEFAULT_MAX_MESSAGE_BYTES, EngineConfig, KeyAlgorithm};
pub use error::{ArmoryError, ArmoryResult, ErrorKind};

use std::fmt;
use std::fs::File;
use std::io::{Read, Write};
use std::path::PathBuf;
use zeroize::Zeroizing;

/// Sanitizes untrusted text for display in a terminal.
///
/// OpenPGP User IDs are attacker-controlled and may contain control
/// characters or ANSI escape sequences, so control bytes are escaped.
pub fn sanitize_for_terminal(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '\n' | '\r' | '\t' => out.push(' '),
            c if c.is_control() => {
                let code = c as u32;
                if code <= 0xFF {
                    out.push_str(&format!("\\x{code:02X}"));
                } else {
                    out.push_str(&format!("\\u{{{code:X}}}"));
                }
            }
            c => out.push(c),
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyId(pub String);

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserId(pub String);

/// Where key material comes from: a file on disk or an in-memory buffer.
#[derive(Clone, PartialEq, Eq)]
pub enum KeySource {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

impl KeySource {
    pub fn path(path: impl Into<PathBuf>) -> Self {
        KeySource::Path(path.into())
    }

    pub fn armored(text: impl Into<String>) -> Self {
        KeySource::Bytes(text.into().into_bytes())
    }

    /// Short human description used in error messages; never the key bytes.
    pub fn describe(&self) -> String {
        match self {
            KeySource::Path(path) => format!("file {}", path.display()),
            KeySource::Bytes(bytes) => format!("buffer ({} bytes)", bytes.len()),
        }
    }

    /// Reads the whole source, refusing anything larger than `limit` bytes.
    /// The file handle is scoped to this call.
    pub fn read(&self, op: &'static str, limit: u64) -> ArmoryResult<Vec<u8>> {
        match self {
            KeySource::Bytes(bytes) => {
                if bytes.len() as u64 > limit {
                    return Err(ArmoryError::invalid_input(
                        op,
                        format!("key material exceeds the {limit} byte limit"),
                    ));
                }
                Ok(bytes.clone())
            }
            KeySource::Path(path) => {
                let unavailable = |err: std::io::Error| ArmoryError::KeyUnavailable {
                    op,
                    what: format!("file at {}", path.display()),
                    reason: err.to_string(),
                };
                let file = File::open(path).map_err(unavailable)?;
                let mut bytes = Vec::new();
                file.take(limit.saturating_add(1))
                    .read_to_end(&mut bytes)
                    .map_err(unavailable)?;
                if bytes.len() as u64 > limit {
                    return Err(ArmoryError::invalid_input(
                        op,
                        format!("{} exceeds the {limit} byte limit", path.display()),
                    ));
                }
                Ok(bytes)
            }
        }
    }
}

impl fmt::Debug for KeySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

impl From<PathBuf> for KeySource {
    fn from(path: PathBuf) -> Self {
        KeySource::Path(path)
    }
}

impl From<&std::path::Path> for KeySource {
    fn from(path: &std::path::Path) -> Self {
        KeySource::Path(path.to_path_buf())
    }
}

/// A caller-supplied passphrase. Wiped from memory on drop.
#[derive(Clone, Default)]
pub struct Passphrase(Zeroizing<String>);

impl Passphrase {
    pub fn new(value: impl Into<String>) -> Self {
        Self(Zeroizing::new(value.into()))
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Passphrase(<redacted>)")
    }
}

impl From<&str> for Passphrase {
    fn from(value: &str) -> Self {
        Passphrase::new(value)
    }
}

impl From<String> for Passphrase {
    fn from(value: String) -> Self {
        Passphrase::new(value)
    }
}

#[derive(Debug, Clone)]
pub struct KeyGenParams {
    pub name: String,
    pub email: String,
    pub comment: Option<String>,
    /// When set and non-empty the generated private key is encrypted with it.
    pub passphrase: Option<Passphrase>,
}

impl KeyGenParams {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            comment: None,
            passphrase: None,
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn with_passphrase(mut self, passphrase: impl Into<Passphrase>) -> Self {
        self.passphrase = Some(passphrase.into());
        self
    }

    /// RFC 2822 style user id: `name (comment) <email>`.
    pub fn user_id(&self) -> UserId {
        let mut uid = self.name.trim().to_string();
        if let Some(comment) = self.comment.as_deref().map(str::trim)
            && !comment.is_empty()
        {
            if !uid.is_empty() {
                uid.push(' ');
            }
            uid.push_str(&format!("({comment})"));
        }
        let email = self.email.trim();
        if !email.is_empty() {
            if !uid.is_empty() {
                uid.push(' ');
            }
            uid.push_str(&format!("<{email}>"));
        }
        UserId(uid)
    }

    pub fn protected(&self) -> bool {
        self.passphrase.as_ref().is_some_and(|p| !p.is_empty())
    }
}

/// A freshly generated key pair, both halves ASCII-armored.
#[derive(Clone)]
pub struct KeyPair {
    pub fingerprint: String,
    pub public_key: String,
    pub private_key: Zeroizing<String>,
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("fingerprint", &self.fingerprint)
            .field("public_key_len", &self.public_key.len())
            .finish_non_exhaustive()
    }
}

/// The optional signer of an operation. Encryption needs `Signing`;
/// decryption and verification accept either variant as the trust anchor.
#[derive(Debug, Clone, Default)]
pub enum SignerSpec {
    #[default]
    None,
    Signing {
        key: KeySource,
        passphrase: Passphrase,
    },
    Verifying(KeySource),
}

impl SignerSpec {
    pub fn signing(key: impl Into<KeySource>, passphrase: impl Into<Passphrase>) -> Self {
        SignerSpec::Signing {
            key: key.into(),
            passphrase: passphrase.into(),
        }
    }

    pub fn verifying(key: impl Into<KeySource>) -> Self {
        SignerSpec::Verifying(key.into())
    }

    pub fn is_none(&self) -> bool {
        matches!(self, SignerSpec::None)
    }
}

#[derive(Debug, Clone)]
pub struct EncryptRequest {
    pub recipient: KeySource,
    pub plaintext: Vec<u8>,
    pub signer: SignerSpec,
}

#[derive(Debug, Clone)]
pub struct DecryptRequest {
    pub recipient: KeySource,
    pub passphrase: Passphrase,
    pub ciphertext: Vec<u8>,
    pub signer: SignerSpec,
}

#[derive(Debug, Clone)]
pub struct SignRequest {
    pub signer: KeySource,
    pub passphrase: Passphrase,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct VerifyRequest {
    pub signer: KeySource,
    pub data: Vec<u8>,
    pub signature: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationFailure {
    Missing,
    Invalid(String),
    KeyMismatch { expected: String, actual: String },
}

/// Result of signature checking for one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationOutcome {
    NotRequested,
    Verified { key_id: KeyId, fingerprint: String },
    Failed(VerificationFailure),
}

impl VerificationOutcome {
    pub fn is_verified(&self) -> bool {
        matches!(self, VerificationOutcome::Verified { .. })
    }

    /// Turns a `Failed` outcome into the matching error; the other states
    /// pass through unchanged.
    pub fn into_result(self, op: &'static str) -> ArmoryResult<Self> {
        match self {
            VerificationOutcome::Failed(VerificationFailure::Missing) => {
                Err(ArmoryError::SignatureMissing { op })
            }
            VerificationOutcome::Failed(VerificationFailure::Invalid(reason)) => {
                Err(ArmoryError::SignatureInvalid { op, reason })
            }
            VerificationOutcome::Failed(VerificationFailure::KeyMismatch { expected, actual }) => {
                Err(ArmoryError::SignatureKeyMismatch {
                    op,
                    expected,
                    actual,
                })
            }
            other => Ok(other),
        }
    }
}

/// Plaintext released by a successful decryption.
pub struct Decrypted {
    plaintext: Zeroizing<Vec<u8>>,
    verification: VerificationOutcome,
}

impl Decrypted {
    /// Only meaningful for outcomes that already passed
    /// [`VerificationOutcome::into_result`].
    pub fn new(plaintext: Vec<u8>, verification: VerificationOutcome) -> Self {
        Self {
            plaintext: Zeroizing::new(plaintext),
            verification,
        }
    }

    pub fn plaintext(&self) -> &[u8] {
        &self.plaintext
    }

    pub fn verification(&self) -> &VerificationOutcome {
        &self.verification
    }

    pub fn text(&self) -> Result<&str, std::str::Utf8Error> {
        std::str::from_utf8(&self.plaintext)
    }

    pub fn into_bytes(mut self) -> Vec<u8> {
        std::mem::take(&mut *self.plaintext)
    }
}

impl fmt::Debug for Decrypted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Decrypted")
            .field("len", &self.plaintext.len())
            .field("verification", &self.verification)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct KeyMeta {
    pub key_id: KeyId,
    pub fingerprint: String,
    pub user_ids: Vec<UserId>,
    pub algo: String,
    pub created_utc: Option<String>,
    pub subkeys: Vec<KeyId>,
    pub has_secret: bool,
    pub secret_encrypted: bool,
}

/// The public surface of an OpenPGP engine. Implementations hold no key
/// state between calls; every request carries its own key material.
pub trait Backend {
    fn name(&self) -> &'static str;
    fn config(&self) -> &EngineConfig;

    fn generate_key_pair(&self, params: KeyGenParams) -> ArmoryResult<KeyPair>;
    fn inspect_keys(&self, source: &KeySource) -> ArmoryResult<Vec<KeyMeta>>;

    fn encrypt(
        &self,
        output: &mut (dyn Write + Send + Sync),
        req: EncryptRequest,
    ) -> ArmoryResult<()>;
    fn decrypt(&self, req: DecryptRequest) -> ArmoryResult<Decrypted>;

    fn sign(&self, req: SignRequest) -> ArmoryResult<String>;
    fn verify(&self, req: VerifyRequest) -> ArmoryResult<VerificationOutcome>;

    fn encrypt_to_string(&self, req: EncryptRequest) -> ArmoryResult<String> {
        let mut out = Vec::new();
        self.encrypt(&mut out, req)?;
        String::from_utf8(out).map_err(|err| ArmoryError::backend("encrypt", err))
    }
}
