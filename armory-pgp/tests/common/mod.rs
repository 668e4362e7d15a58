#![allow(dead_code)]

use armory_core::{
    Backend, DecryptRequest, Decrypted, EncryptRequest, EngineConfig, KeyGenParams, KeyPair,
    KeySource, Passphrase, SignerSpec, ArmoryResult,
};
use armory_pgp::NativeBackend;
use std::path::PathBuf;
use tempfile::TempDir;

pub fn backend() -> NativeBackend {
    NativeBackend::new(EngineConfig::default())
}

pub fn key_pair(name: &str, passphrase: Option<&str>) -> KeyPair {
    let mut params = KeyGenParams::new(name, format!("{name}@example.com"));
    if let Some(passphrase) = passphrase {
        params = params.with_passphrase(passphrase);
    }
    backend().generate_key_pair(params).expect("keygen")
}

pub fn public(pair: &KeyPair) -> KeySource {
    KeySource::armored(pair.public_key.clone())
}

pub fn private(pair: &KeyPair) -> KeySource {
    KeySource::armored(pair.private_key.as_str())
}

/// Both halves of a key pair written to a temporary directory.
pub struct KeyFiles {
    _dir: TempDir,
    pub public: PathBuf,
    pub private: PathBuf,
}

pub fn write_key_files(pair: &KeyPair) -> KeyFiles {
    let dir = tempfile::tempdir().expect("tempdir");
    let public = dir.path().join("public.asc");
    let private = dir.path().join("private.asc");
    std::fs::write(&public, &pair.public_key).expect("write public");
    std::fs::write(&private, pair.private_key.as_bytes()).expect("write private");
    KeyFiles {
        _dir: dir,
        public,
        private,
    }
}

pub fn encrypt_to(recipient: &KeyPair, plaintext: &[u8], signer: SignerSpec) -> String {
    backend()
        .encrypt_to_string(EncryptRequest {
            recipient: public(recipient),
            plaintext: plaintext.to_vec(),
            signer,
        })
        .expect("encrypt")
}

pub fn decrypt_with(
    recipient: &KeyPair,
    passphrase: &str,
    ciphertext: &str,
    signer: SignerSpec,
) -> ArmoryResult<Decrypted> {
    backend().decrypt(DecryptRequest {
        recipient: private(recipient),
        passphrase: Passphrase::new(passphrase),
        ciphertext: ciphertext.as_bytes().to_vec(),
        signer,
    })
}
