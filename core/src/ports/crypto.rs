use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::RngCore;
use thiserror::Error;

pub const KEY_LEN_32: usize = 32;
pub const NONCE_LEN_12: usize = 12;
pub const TAG_LEN_16: usize = 16;
pub const SIGNATURE_LEN: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid key length: expected={expected}, actual={actual}")]
    InvalidKeyLen { expected: usize, actual: usize },

    #[error("encryption failed")]
    Encrypt,

    #[error("decryption failed: ciphertext rejected")]
    Decrypt,

    #[error("signature verification failed")]
    SignatureInvalid,

    #[error("malformed sealed payload: {0}")]
    Malformed(String),
}

/// `encrypt`, `decrypt`, `sign`, `verify`. The pipeline never looks inside
/// the bytes these produce.
pub trait CryptoProvider: Send + Sync {
    fn encrypt(&self, plaintext: &[u8], key: &[u8]) -> Result<Vec<u8>, CryptoError>;
    fn decrypt(&self, ciphertext: &[u8], key: &[u8]) -> Result<Vec<u8>, CryptoError>;
    fn sign(&self, data: &[u8], key: &[u8]) -> Result<Vec<u8>, CryptoError>;
    fn verify(&self, data: &[u8], signature: &[u8], key: &[u8]) -> Result<bool, CryptoError>;

    /// Bytes `encrypt` adds on top of the plaintext.
    fn ciphertext_overhead(&self) -> usize;
    /// Length of every `sign` output.
    fn signature_len(&self) -> usize;
}

/// Local provider: AES-256-GCM (`nonce || ciphertext+tag`) and a keyed
/// BLAKE3 MAC in the signature slot. Both roles take 32-byte keys.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalCrypto;

fn key_32(key: &[u8]) -> Result<[u8; KEY_LEN_32], CryptoError> {
    key.try_into().map_err(|_| CryptoError::InvalidKeyLen { expected: KEY_LEN_32, actual: key.len() })
}

impl CryptoProvider for LocalCrypto {
    fn encrypt(&self, plaintext: &[u8], key: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let key = key_32(key)?;
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|_| CryptoError::InvalidKeyLen { expected: KEY_LEN_32, actual: key.len() })?;

        let mut nonce = [0u8; NONCE_LEN_12];
        rand::thread_rng().fill_bytes(&mut nonce);

        let ct = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| CryptoError::Encrypt)?;

        let mut out = Vec::with_capacity(NONCE_LEN_12 + ct.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ct);
        Ok(out)
    }

    fn decrypt(&self, ciphertext: &[u8], key: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let key = key_32(key)?;
        if ciphertext.len() < NONCE_LEN_12 {
            return Err(CryptoError::Malformed("ciphertext shorter than nonce".into()));
        }
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|_| CryptoError::InvalidKeyLen { expected: KEY_LEN_32, actual: key.len() })?;
        let (nonce, body) = ciphertext.split_at(NONCE_LEN_12);
        cipher.decrypt(Nonce::from_slice(nonce), body).map_err(|_| CryptoError::Decrypt)
    }

    fn sign(&self, data: &[u8], key: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let key = key_32(key)?;
        Ok(blake3::keyed_hash(&key, data).as_bytes().to_vec())
    }

    fn verify(&self, data: &[u8], signature: &[u8], key: &[u8]) -> Result<bool, CryptoError> {
        let key = key_32(key)?;
        let Ok(sig) = <[u8; SIGNATURE_LEN]>::try_from(signature) else {
            return Ok(false);
        };
        // blake3::Hash equality is constant-time.
        Ok(blake3::keyed_hash(&key, data) == blake3::Hash::from(sig))
    }

    fn ciphertext_overhead(&self) -> usize {
        NONCE_LEN_12 + TAG_LEN_16
    }

    fn signature_len(&self) -> usize {
        SIGNATURE_LEN
    }
}
