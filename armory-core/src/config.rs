use std::fmt;
use std::str::FromStr;

pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 64 * 1024 * 1024;
pub const DEFAULT_MAX_KEY_BYTES: u64 = 1024 * 1024;

/// Public-key suite used when generating a key pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyAlgorithm {
    #[default]
    Cv25519,
    Rsa3k,
    Rsa4k,
    P256,
    P384,
}

impl KeyAlgorithm {
    pub fn as_str(self) -> &'static str {
        match self {
            KeyAlgorithm::Cv25519 => "cv25519",
            KeyAlgorithm::Rsa3k => "rsa3k",
            KeyAlgorithm::Rsa4k => "rsa4k",
            KeyAlgorithm::P256 => "p256",
            KeyAlgorithm::P384 => "p384",
        }
    }
}

impl fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cv25519" | "25519" | "ed25519" => Ok(KeyAlgorithm::Cv25519),
            "rsa3k" | "rsa3072" => Ok(KeyAlgorithm::Rsa3k),
            "rsa4k" | "rsa4096" => Ok(KeyAlgorithm::Rsa4k),
            "p256" | "nistp256" => Ok(KeyAlgorithm::P256),
            "p384" | "nistp384" => Ok(KeyAlgorithm::P384),
            other => Err(format!("unknown key algorithm: {other}")),
        }
    }
}

/// Engine settings, passed explicitly to a backend. The engine itself never
/// reads the environment; callers decide where these values come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Upper bound for armored ciphertext input and for the buffered
    /// plaintext of a single message.
    pub max_message_bytes: usize,
    /// Upper bound for a single key file or key buffer.
    pub max_key_bytes: u64,
    /// Optional `Comment:` header written into every armor block.
    pub armor_comment: Option<String>,
    pub cipher_suite: KeyAlgorithm,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            max_key_bytes: DEFAULT_MAX_KEY_BYTES,
            armor_comment: None,
            cipher_suite: KeyAlgorithm::default(),
        }
    }
}

impl EngineConfig {
    pub fn with_max_message_bytes(mut self, limit: usize) -> Self {
        self.max_message_bytes = limit;
        self
    }

    pub fn with_max_key_bytes(mut self, limit: u64) -> Self {
        self.max_key_bytes = limit;
        self
    }

    pub fn with_armor_comment(mut self, comment: Option<String>) -> Self {
        self.armor_comment = comment.filter(|c| !c.trim().is_empty());
        self
    }

    pub fn with_cipher_suite(mut self, suite: KeyAlgorithm) -> Self {
        self.cipher_suite = suite;
        self
    }

    /// Armor headers derived from this config.
    pub fn armor_headers(&self) -> Vec<(String, String)> {
        match &self.armor_comment {
            Some(comment) => vec![("Comment".to_string(), comment.clone())],
            None => Vec::new(),
        }
    }
}
