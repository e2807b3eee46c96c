//! Sealed payload: what actually gets embedded into a carrier.
//!
//! Layout (big-endian lengths):
//! `u16 sender_len | sender | u16 sig_len | signature | ciphertext`
//! The signature covers the ciphertext.

use crate::ports::crypto::{CryptoError, CryptoProvider};
use crate::types::ParticipantRef;

pub struct SealedPayload<'a> {
    pub sender: ParticipantRef,
    pub signature: &'a [u8],
    pub ciphertext: &'a [u8],
}

/// Encrypt for the recipient, sign as the sender, pack.
pub fn seal_payload(
    crypto: &dyn CryptoProvider,
    sender: &ParticipantRef,
    signing_key: &[u8],
    recipient_key: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let ciphertext = crypto.encrypt(plaintext, recipient_key)?;
    let signature = crypto.sign(&ciphertext, signing_key)?;

    let sender = sender.as_str().as_bytes();
    let sender_len = u16::try_from(sender.len())
        .map_err(|_| CryptoError::Malformed("sender reference too long".into()))?;
    let sig_len = u16::try_from(signature.len())
        .map_err(|_| CryptoError::Malformed("signature too long".into()))?;

    let mut out = Vec::with_capacity(4 + sender.len() + signature.len() + ciphertext.len());
    out.extend_from_slice(&sender_len.to_be_bytes());
    out.extend_from_slice(sender);
    out.extend_from_slice(&sig_len.to_be_bytes());
    out.extend_from_slice(&signature);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Size `seal_payload` will produce for a plaintext of `plaintext_len`,
/// known before any key is touched.
pub fn sealed_len(crypto: &dyn CryptoProvider, sender: &ParticipantRef, plaintext_len: u64) -> u64 {
    let fixed = 4 + sender.as_str().len() + crypto.signature_len() + crypto.ciphertext_overhead();
    plaintext_len.saturating_add(fixed as u64)
}

fn take<'a>(buf: &mut &'a [u8], n: usize, what: &str) -> Result<&'a [u8], CryptoError> {
    if buf.len() < n {
        return Err(CryptoError::Malformed(format!("truncated {what}")));
    }
    let (head, tail) = buf.split_at(n);
    *buf = tail;
    Ok(head)
}

fn take_u16(buf: &mut &[u8], what: &str) -> Result<usize, CryptoError> {
    let raw = take(buf, 2, what)?;
    Ok(u16::from_be_bytes([raw[0], raw[1]]) as usize)
}

pub fn parse_sealed(sealed: &[u8]) -> Result<SealedPayload<'_>, CryptoError> {
    let mut buf = sealed;
    let sender_len = take_u16(&mut buf, "sender length")?;
    let sender = take(&mut buf, sender_len, "sender")?;
    let sender = std::str::from_utf8(sender)
        .map_err(|_| CryptoError::Malformed("sender is not UTF-8".into()))?;
    let sig_len = take_u16(&mut buf, "signature length")?;
    let signature = take(&mut buf, sig_len, "signature")?;

    Ok(SealedPayload {
        sender: ParticipantRef::from(sender),
        signature,
        ciphertext: buf,
    })
}

/// Verify with the sender's key, then decrypt with the recipient's.
pub fn open_payload(
    crypto: &dyn CryptoProvider,
    sealed: &SealedPayload<'_>,
    verification_key: &[u8],
    recipient_key: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    if !crypto.verify(sealed.ciphertext, sealed.signature, verification_key)? {
        return Err(CryptoError::SignatureInvalid);
    }
    crypto.decrypt(sealed.ciphertext, recipient_key)
}
