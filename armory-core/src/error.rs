use thiserror::Error;

pub type ArmoryResult<T> = Result<T, ArmoryError>;

/// Fieldless discriminant of [`ArmoryError`], for callers that route on the
/// kind of failure rather than on its message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    MalformedArmor,
    WrongKeyType,
    MalformedKey,
    IncorrectPassphrase,
    EmptyKeyRing,
    UnexpectedMessageType,
    SignerPreparationFailed,
    SignatureMissing,
    SignatureInvalid,
    SignatureKeyMismatch,
    TransportWriteFailure,
    KeyUnavailable,
    DecryptionFailed,
    MessageTooLarge,
    InvalidInput,
    Backend,
}

#[derive(Debug, Error)]
pub enum ArmoryError {
    #[error("{op}: malformed armor: {reason}")]
    MalformedArmor { op: &'static str, reason: String },

    #[error("{op}: invalid key type: expected {expected}, got {actual}")]
    WrongKeyType {
        op: &'static str,
        expected: String,
        actual: String,
    },

    #[error("{op}: malformed key: {reason}")]
    MalformedKey { op: &'static str, reason: String },

    #[error("{op}: failed to decrypt private key, check your passphrase: {reason}")]
    IncorrectPassphrase { op: &'static str, reason: String },

    #[error("{op}: no keys found in key ring")]
    EmptyKeyRing { op: &'static str },

    #[error("{op}: invalid message type: got {actual}, want PGP MESSAGE")]
    UnexpectedMessageType { op: &'static str, actual: String },

    #[error("{op}: failed to prepare signer: {reason}")]
    SignerPreparationFailed { op: &'static str, reason: String },

    #[error("{op}: signature verification failed: message is not signed")]
    SignatureMissing { op: &'static str },

    #[error("{op}: signature verification failed: {reason}")]
    SignatureInvalid { op: &'static str, reason: String },

    #[error("{op}: signature from unexpected key id: got {actual}, want {expected}")]
    SignatureKeyMismatch {
        op: &'static str,
        expected: String,
        actual: String,
    },

    #[error("{op}: failed to write output: {source}")]
    TransportWriteFailure {
        op: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{op}: failed to open key {what}: {reason}")]
    KeyUnavailable {
        op: &'static str,
        what: String,
        reason: String,
    },

    #[error("{op}: failed to read PGP message: {reason}")]
    DecryptionFailed { op: &'static str, reason: String },

    #[error("{op}: message exceeds the {limit} byte limit")]
    MessageTooLarge { op: &'static str, limit: usize },

    #[error("{op}: invalid input: {reason}")]
    InvalidInput { op: &'static str, reason: String },

    #[error("{op}: backend error: {reason}")]
    Backend { op: &'static str, reason: String },
}

impl ArmoryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ArmoryError::MalformedArmor { .. } => ErrorKind::MalformedArmor,
            ArmoryError::WrongKeyType { .. } => ErrorKind::WrongKeyType,
            ArmoryError::MalformedKey { .. } => ErrorKind::MalformedKey,
            ArmoryError::IncorrectPassphrase { .. } => ErrorKind::IncorrectPassphrase,
            ArmoryError::EmptyKeyRing { .. } => ErrorKind::EmptyKeyRing,
            ArmoryError::UnexpectedMessageType { .. } => ErrorKind::UnexpectedMessageType,
            ArmoryError::SignerPreparationFailed { .. } => ErrorKind::SignerPreparationFailed,
            ArmoryError::SignatureMissing { .. } => ErrorKind::SignatureMissing,
            ArmoryError::SignatureInvalid { .. } => ErrorKind::SignatureInvalid,
            ArmoryError::SignatureKeyMismatch { .. } => ErrorKind::SignatureKeyMismatch,
            ArmoryError::TransportWriteFailure { .. } => ErrorKind::TransportWriteFailure,
            ArmoryError::KeyUnavailable { .. } => ErrorKind::KeyUnavailable,
            ArmoryError::DecryptionFailed { .. } => ErrorKind::DecryptionFailed,
            ArmoryError::MessageTooLarge { .. } => ErrorKind::MessageTooLarge,
            ArmoryError::InvalidInput { .. } => ErrorKind::InvalidInput,
            ArmoryError::Backend { .. } => ErrorKind::Backend,
        }
    }

    /// The operation that failed, e.g. `"decrypt"` or `"read public key"`.
    pub fn operation(&self) -> &'static str {
        match self {
            ArmoryError::MalformedArmor { op, .. }
            | ArmoryError::WrongKeyType { op, .. }
            | ArmoryError::MalformedKey { op, .. }
            | ArmoryError::IncorrectPassphrase { op, .. }
            | ArmoryError::EmptyKeyRing { op }
            | ArmoryError::UnexpectedMessageType { op, .. }
            | ArmoryError::SignerPreparationFailed { op, .. }
            | ArmoryError::SignatureMissing { op }
            | ArmoryError::SignatureInvalid { op, .. }
            | ArmoryError::SignatureKeyMismatch { op, .. }
            | ArmoryError::TransportWriteFailure { op, .. }
            | ArmoryError::KeyUnavailable { op, .. }
            | ArmoryError::DecryptionFailed { op, .. }
            | ArmoryError::MessageTooLarge { op, .. }
            | ArmoryError::InvalidInput { op, .. }
            | ArmoryError::Backend { op, .. } => op,
        }
    }

    /// True when the failure came from the caller's output stream rather
    /// than from key material or the OpenPGP layer.
    pub fn is_transport(&self) -> bool {
        matches!(self, ArmoryError::TransportWriteFailure { .. })
    }

    pub fn is_signature_failure(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::SignatureMissing
                | ErrorKind::SignatureInvalid
                | ErrorKind::SignatureKeyMismatch
        )
    }

    /// Parse-level failures: the input was not a well-formed armor block,
    /// key or message of the expected type.
    pub fn is_parse_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::MalformedArmor
                | ErrorKind::WrongKeyType
                | ErrorKind::MalformedKey
                | ErrorKind::UnexpectedMessageType
                | ErrorKind::DecryptionFailed
        )
    }

    pub fn invalid_input(op: &'static str, reason: impl Into<String>) -> Self {
        ArmoryError::InvalidInput {
            op,
            reason: reason.into(),
        }
    }

    pub fn backend(op: &'static str, reason: impl std::fmt::Display) -> Self {
        ArmoryError::Backend {
            op,
            reason: reason.to_string(),
        }
    }
}
