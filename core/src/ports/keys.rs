use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::ParticipantRef;

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("no key registered for participant {0}")]
    UnknownParticipant(ParticipantRef),

    #[error("key material is not valid base64: {0}")]
    InvalidEncoding(#[from] base64::DecodeError),

    #[error("key store unavailable: {0}")]
    Unavailable(String),
}

/// Key bytes as they travel inside request messages (base64).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyMaterial(String);

impl KeyMaterial {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(STANDARD.encode(bytes))
    }

    pub fn from_encoded(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    pub fn decode(&self) -> Result<Vec<u8>, KeyError> {
        Ok(STANDARD.decode(self.0.trim())?)
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KeyMaterial(<redacted>)")
    }
}

/// Public half of the key directory: who can receive, who can sign.
pub trait KeyStore: Send + Sync {
    /// Key used to encrypt a payload for `recipient`.
    fn encryption_key(&self, recipient: &ParticipantRef) -> Result<Vec<u8>, KeyError>;
    /// Key used to check a signature made by `sender`.
    fn verification_key(&self, sender: &ParticipantRef) -> Result<Vec<u8>, KeyError>;
}

/// Symmetric directory: one 32-byte key per participant, used for both roles.
#[derive(Debug, Default)]
pub struct InMemoryKeyStore {
    keys: RwLock<HashMap<ParticipantRef, Vec<u8>>>,
}

impl InMemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, participant: ParticipantRef, key: Vec<u8>) -> Result<(), KeyError> {
        self.keys
            .write()
            .map_err(|_| KeyError::Unavailable("key map poisoned".into()))?
            .insert(participant, key);
        Ok(())
    }

    fn lookup(&self, participant: &ParticipantRef) -> Result<Vec<u8>, KeyError> {
        self.keys
            .read()
            .map_err(|_| KeyError::Unavailable("key map poisoned".into()))?
            .get(participant)
            .cloned()
            .ok_or_else(|| KeyError::UnknownParticipant(participant.clone()))
    }
}

impl KeyStore for InMemoryKeyStore {
    fn encryption_key(&self, recipient: &ParticipantRef) -> Result<Vec<u8>, KeyError> {
        self.lookup(recipient)
    }

    fn verification_key(&self, sender: &ParticipantRef) -> Result<Vec<u8>, KeyError> {
        self.lookup(sender)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_material_roundtrip_and_redacted_debug() {
        let km = KeyMaterial::from_bytes(&[1, 2, 3]);
        assert_eq!(km.decode().unwrap(), vec![1, 2, 3]);
        assert_eq!(format!("{km:?}"), "KeyMaterial(<redacted>)");
        assert!(KeyMaterial::from_encoded("***").decode().is_err());
    }
}
