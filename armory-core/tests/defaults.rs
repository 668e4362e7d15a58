use armory_core::{
    DEFAULT_MAX_MESSAGE_BYTES, Decrypted, EngineConfig, KeyAlgorithm, KeyGenParams, KeySource,
    Passphrase, SignerSpec, VerificationOutcome, sanitize_for_terminal,
};
use std::io::Write;

#[test]
fn defaults_match_expected() {
    let config = EngineConfig::default();
    assert_eq!(config.max_message_bytes, DEFAULT_MAX_MESSAGE_BYTES);
    assert_eq!(config.cipher_suite, KeyAlgorithm::Cv25519);
    assert!(config.armor_headers().is_empty());
    assert!(SignerSpec::default().is_none());
}

#[test]
fn blank_armor_comment_is_dropped() {
    let config = EngineConfig::default().with_armor_comment(Some("   ".into()));
    assert!(config.armor_comment.is_none());

    let config = EngineConfig::default().with_armor_comment(Some("armory".into()));
    assert_eq!(
        config.armor_headers(),
        vec![("Comment".to_string(), "armory".to_string())]
    );
}

#[test]
fn key_algorithm_parses_aliases() {
    assert_eq!("RSA4096".parse::<KeyAlgorithm>(), Ok(KeyAlgorithm::Rsa4k));
    assert_eq!("ed25519".parse::<KeyAlgorithm>(), Ok(KeyAlgorithm::Cv25519));
    assert!("dsa".parse::<KeyAlgorithm>().is_err());
}

#[test]
fn user_id_formats_name_comment_and_email() {
    let params = KeyGenParams::new("Alice", "alice@example.com").with_comment("work");
    assert_eq!(params.user_id().0, "Alice (work) <alice@example.com>");

    let params = KeyGenParams::new("recipient", "");
    assert_eq!(params.user_id().0, "recipient");

    let params = KeyGenParams::new("Bob", "bob@example.com").with_comment("  ");
    assert_eq!(params.user_id().0, "Bob <bob@example.com>");
}

#[test]
fn empty_passphrase_does_not_protect() {
    let params = KeyGenParams::new("a", "a@example.com").with_passphrase("");
    assert!(!params.protected());
    let params = KeyGenParams::new("a", "a@example.com").with_passphrase("secret");
    assert!(params.protected());
}

#[test]
fn passphrase_debug_is_redacted() {
    let passphrase = Passphrase::new("hunter2");
    assert!(!format!("{passphrase:?}").contains("hunter2"));
}

#[test]
fn key_source_enforces_limit() {
    let source = KeySource::Bytes(vec![0u8; 16]);
    assert!(source.read("read public key", 8).is_err());
    assert_eq!(source.read("read public key", 16).expect("read").len(), 16);
}

#[test]
fn key_source_reports_missing_file() {
    let source = KeySource::path("/path/to/nonexistent/key.pub");
    let err = source
        .read("read public key", 1024)
        .expect_err("missing file");
    assert!(err.to_string().contains("failed to open key file"));
}

#[test]
fn key_source_reads_file() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(b"key bytes").expect("write");
    let source = KeySource::from(file.path());
    assert_eq!(source.read("read public key", 1024).expect("read"), b"key bytes");
}

#[test]
fn key_source_accepts_maximum_limit() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(b"key bytes").expect("write");
    let source = KeySource::from(file.path());
    assert_eq!(
        source.read("read public key", u64::MAX).expect("read"),
        b"key bytes"
    );
}

#[test]
fn decrypted_exposes_text() {
    let decrypted = Decrypted::new(b"hello".to_vec(), VerificationOutcome::NotRequested);
    assert_eq!(decrypted.text().expect("utf8"), "hello");
    assert!(!format!("{decrypted:?}").contains("hello"));
    assert_eq!(decrypted.into_bytes(), b"hello");
}

#[test]
fn sanitize_escapes_control_characters() {
    assert_eq!(sanitize_for_terminal("a\u{1b}[31mb"), "a\\x1B[31mb");
    assert_eq!(sanitize_for_terminal("line\nbreak"), "line break");
}
