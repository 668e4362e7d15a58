//! OpenPGP engine for armory on top of sequoia-openpgp.
//!
//! The request-level API is [`NativeBackend`] through the
//! [`armory_core::Backend`] trait. The entity-level functions re-exported
//! here work on already parsed keys and accept several recipients.

pub mod armor;
mod decrypt;
mod encrypt;
mod entity;
mod keygen;
mod keys;
mod native;

pub use armor::{ArmorBlock, BlockType, Encoder};
pub use decrypt::{decrypt, verify_detached};
pub use encrypt::{encrypt, sign_detached};
pub use entity::{Entity, Signer};
pub use keygen::generate_key_pair;
pub use keys::{read_key_ring, read_private_entity, read_public_entity, read_verifying_entity};
pub use native::NativeBackend;
