mod common;

use armory_core::{
    Backend, DecryptRequest, EncryptRequest, EngineConfig, ErrorKind, KeyPair, KeySource,
    Passphrase, SignRequest, SignerSpec,
};
use armory_pgp::armor::{self, BlockType};
use armory_pgp::{Entity, NativeBackend};
use openpgp::Cert;
use openpgp::cert::prelude::*;
use openpgp::parse::Parse;
use openpgp::policy::StandardPolicy;
use openpgp::serialize::stream::Signer as StreamSigner;
use openpgp::serialize::stream::{Encryptor, LiteralWriter, Message, Recipient};
use openpgp::types::HashAlgorithm;
use sequoia_openpgp as openpgp;
use common::{backend, decrypt_with, encrypt_to, key_pair, private, public};
use std::io::{self, Write};

#[test]
fn wrong_signer_is_key_mismatch() {
    let recipient = key_pair("alice", None);
    let signer = key_pair("bob", None);
    let impostor = key_pair("mallory", None);

    let armored = encrypt_to(&recipient, b"secret", SignerSpec::signing(private(&impostor), ""));
    let err = decrypt_with(&recipient, "", &armored, SignerSpec::verifying(public(&signer)))
        .expect_err("wrong signer");
    assert_eq!(err.kind(), ErrorKind::SignatureKeyMismatch);
    assert!(err.is_signature_failure());
    assert!(err.to_string().contains("signature from unexpected key id"));
}

#[test]
fn unsigned_message_with_expected_signer_is_missing() {
    let recipient = key_pair("alice", None);
    let signer = key_pair("bob", None);

    let armored = encrypt_to(&recipient, b"unsigned", SignerSpec::None);
    let err = decrypt_with(&recipient, "", &armored, SignerSpec::verifying(public(&signer)))
        .expect_err("unsigned");
    assert_eq!(err.kind(), ErrorKind::SignatureMissing);
}

#[test]
fn bad_passphrase_is_rejected() {
    let recipient = key_pair("alice", Some("right"));
    let armored = encrypt_to(&recipient, b"locked", SignerSpec::None);

    let err = decrypt_with(&recipient, "wrong", &armored, SignerSpec::None).expect_err("wrong");
    assert_eq!(err.kind(), ErrorKind::IncorrectPassphrase);
    let err = decrypt_with(&recipient, "", &armored, SignerSpec::None).expect_err("empty");
    assert_eq!(err.kind(), ErrorKind::IncorrectPassphrase);
}

#[test]
fn bad_passphrase_fails_before_ciphertext_is_read() {
    let recipient = key_pair("alice", Some("right"));
    let err = decrypt_with(&recipient, "wrong", "not even armor", SignerSpec::None)
        .expect_err("wrong");
    assert_eq!(err.kind(), ErrorKind::IncorrectPassphrase);
}

#[test]
fn plain_text_is_a_parse_error() {
    let recipient = key_pair("alice", None);
    let err = decrypt_with(&recipient, "", "This is not a PGP message.", SignerSpec::None)
        .expect_err("garbage");
    assert!(err.is_parse_error(), "unexpected error: {err}");
}

#[test]
fn private_block_on_public_path_is_wrong_key_type() {
    let recipient = key_pair("alice", None);
    let err = backend()
        .encrypt_to_string(EncryptRequest {
            recipient: private(&recipient),
            plaintext: b"x".to_vec(),
            signer: SignerSpec::None,
        })
        .expect_err("private block");
    assert_eq!(err.kind(), ErrorKind::WrongKeyType);
}

#[test]
fn public_block_on_private_path_is_wrong_key_type() {
    let recipient = key_pair("alice", None);
    let err = backend()
        .decrypt(DecryptRequest {
            recipient: public(&recipient),
            passphrase: Passphrase::empty(),
            ciphertext: Vec::new(),
            signer: SignerSpec::None,
        })
        .expect_err("public block");
    assert_eq!(err.kind(), ErrorKind::WrongKeyType);
}

#[test]
fn non_message_block_is_unexpected_message_type() {
    let recipient = key_pair("alice", None);
    let err = decrypt_with(&recipient, "", &recipient.public_key, SignerSpec::None)
        .expect_err("key block");
    assert_eq!(err.kind(), ErrorKind::UnexpectedMessageType);
    assert!(err.to_string().contains("want PGP MESSAGE"));
}

#[test]
fn message_for_someone_else_fails_to_decrypt() {
    let alice = key_pair("alice", None);
    let bob = key_pair("bob", None);
    let armored = encrypt_to(&alice, b"for alice", SignerSpec::None);
    let err = decrypt_with(&bob, "", &armored, SignerSpec::None).expect_err("not for bob");
    assert_eq!(err.kind(), ErrorKind::DecryptionFailed);
    assert!(err.to_string().contains("message is not addressed to key"));
}

/// Encrypts to `recipient` and signs with `signer` using `hash`, bypassing
/// the engine so weak choices can be made.
fn encrypt_signed_with_hash(
    recipient: &KeyPair,
    signer: &KeyPair,
    hash: HashAlgorithm,
    plaintext: &[u8],
) -> String {
    let policy = StandardPolicy::new();
    let recipient = Cert::from_bytes(recipient.public_key.as_bytes()).expect("recipient");
    let signer = Cert::from_bytes(signer.private_key.as_bytes()).expect("signer");
    let recipients: Vec<Recipient> = recipient
        .keys()
        .with_policy(&policy, None)
        .for_transport_encryption()
        .map(|key| key.into())
        .collect();
    let keypair = signer
        .keys()
        .secret()
        .with_policy(&policy, None)
        .for_signing()
        .next()
        .expect("signing key")
        .key()
        .clone()
        .into_keypair()
        .expect("keypair");

    let mut sink = Vec::new();
    let message = Message::new(&mut sink);
    let message = Encryptor::for_recipients(message, recipients)
        .build()
        .expect("encryptor");
    let message = StreamSigner::new(message, keypair)
        .expect("signer")
        .hash_algo(hash)
        .expect("hash")
        .build()
        .expect("signer build");
    let mut message = LiteralWriter::new(message).build().expect("literal");
    message.write_all(plaintext).expect("write");
    message.finalize().expect("finalize");
    armor::encode(BlockType::Message, &[], &sink).expect("armor")
}

#[test]
fn weak_hash_signature_is_invalid() {
    let recipient = key_pair("alice", None);
    let signer = key_pair("bob", None);
    let armored = encrypt_signed_with_hash(&recipient, &signer, HashAlgorithm::SHA1, b"sha1");

    let err = decrypt_with(&recipient, "", &armored, SignerSpec::verifying(public(&signer)))
        .expect_err("sha1 signature");
    assert_eq!(err.kind(), ErrorKind::SignatureInvalid);
    assert!(err.is_signature_failure());

    let strong = encrypt_signed_with_hash(&recipient, &signer, HashAlgorithm::SHA512, b"sha512");
    let decrypted = decrypt_with(&recipient, "", &strong, SignerSpec::verifying(public(&signer)))
        .expect("sha512 signature");
    assert_eq!(decrypted.plaintext(), b"sha512");
}

fn revoked_key_pair() -> KeyPair {
    let (cert, revocation) = CertBuilder::general_purpose(Some("revoked <revoked@example.com>"))
        .generate()
        .expect("keygen");
    let (cert, _) = cert.insert_packets(revocation).expect("revoke");
    let entity = Entity::new(cert);
    let config = EngineConfig::default();
    KeyPair {
        fingerprint: entity.fingerprint(),
        public_key: entity.armored_public(&config).expect("public"),
        private_key: entity.armored_private(&config).expect("private").into(),
    }
}

#[test]
fn revoked_recipient_is_refused() {
    let revoked = revoked_key_pair();
    let mut out = Vec::new();
    let err = backend()
        .encrypt(
            &mut out,
            EncryptRequest {
                recipient: public(&revoked),
                plaintext: b"x".to_vec(),
                signer: SignerSpec::None,
            },
        )
        .expect_err("revoked");
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert!(err.to_string().contains("revoked"), "{err}");
    assert!(out.is_empty());
}

#[test]
fn revoked_signer_is_refused() {
    let recipient = key_pair("alice", None);
    let revoked = revoked_key_pair();
    let err = backend()
        .encrypt_to_string(EncryptRequest {
            recipient: public(&recipient),
            plaintext: b"x".to_vec(),
            signer: SignerSpec::signing(private(&revoked), ""),
        })
        .expect_err("revoked signer");
    assert_eq!(err.kind(), ErrorKind::SignerPreparationFailed);

    let err = backend()
        .sign(SignRequest {
            signer: private(&revoked),
            passphrase: Passphrase::empty(),
            data: b"x".to_vec(),
        })
        .expect_err("revoked signer");
    assert_eq!(err.kind(), ErrorKind::SignerPreparationFailed);
}

#[test]
fn tampered_ciphertext_fails_to_decrypt() {
    let recipient = key_pair("alice", None);
    let armored = encrypt_to(&recipient, &[7u8; 512], SignerSpec::None);

    let mut block = armor::decode("test", armored.as_bytes()).expect("decode");
    let last = block.body.len() - 40;
    block.body[last] ^= 0x01;
    let tampered = armor::encode(BlockType::Message, &[], &block.body).expect("encode");

    let err = decrypt_with(&recipient, "", &tampered, SignerSpec::None).expect_err("tampered");
    assert_eq!(err.kind(), ErrorKind::DecryptionFailed);
}

#[test]
fn locked_signer_aborts_encryption() {
    let recipient = key_pair("alice", None);
    let signer = key_pair("bob", Some("bob-pass"));
    let mut out = Vec::new();
    let err = backend()
        .encrypt(
            &mut out,
            EncryptRequest {
                recipient: public(&recipient),
                plaintext: b"x".to_vec(),
                signer: SignerSpec::signing(private(&signer), "not-bob-pass"),
            },
        )
        .expect_err("signer");
    assert_eq!(err.kind(), ErrorKind::SignerPreparationFailed);
    assert!(out.is_empty());
}

#[test]
fn verification_key_cannot_sign() {
    let recipient = key_pair("alice", None);
    let signer = key_pair("bob", None);
    let err = backend()
        .encrypt_to_string(EncryptRequest {
            recipient: public(&recipient),
            plaintext: b"x".to_vec(),
            signer: SignerSpec::verifying(public(&signer)),
        })
        .expect_err("verifying key");
    assert_eq!(err.kind(), ErrorKind::SignerPreparationFailed);
}

struct FailingSink;

impl Write for FailingSink {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::StorageFull, "disk full"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn sink_failure_is_transport_error() {
    let recipient = key_pair("alice", None);
    let err = backend()
        .encrypt(
            &mut FailingSink,
            EncryptRequest {
                recipient: public(&recipient),
                plaintext: vec![1u8; 4096],
                signer: SignerSpec::None,
            },
        )
        .expect_err("sink");
    assert_eq!(err.kind(), ErrorKind::TransportWriteFailure);
    assert!(err.is_transport());
    let source = std::error::Error::source(&err).expect("io source");
    assert!(source.to_string().contains("disk full"));
}

#[test]
fn oversized_ciphertext_is_refused() {
    let recipient = key_pair("alice", None);
    let armored = encrypt_to(&recipient, b"payload", SignerSpec::None);
    let small = NativeBackend::new(EngineConfig::default().with_max_message_bytes(64));
    let err = small
        .decrypt(DecryptRequest {
            recipient: private(&recipient),
            passphrase: Passphrase::empty(),
            ciphertext: armored.into_bytes(),
            signer: SignerSpec::None,
        })
        .expect_err("too large");
    assert_eq!(err.kind(), ErrorKind::MessageTooLarge);
}

#[test]
fn missing_key_file_is_unavailable() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = backend()
        .encrypt_to_string(EncryptRequest {
            recipient: KeySource::path(dir.path().join("absent.asc")),
            plaintext: b"x".to_vec(),
            signer: SignerSpec::None,
        })
        .expect_err("missing");
    assert_eq!(err.kind(), ErrorKind::KeyUnavailable);
    assert_eq!(err.operation(), "read public key");
}
