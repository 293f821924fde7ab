//! Field-level encryption for provider credentials.
//!
//! Values are stored as `base64(nonce || ciphertext)` with AES-256-GCM and a
//! random 96-bit nonce per value. Plaintext never reaches the database.

use std::fmt;

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, KeyInit},
};
use base64::{Engine, engine::general_purpose::STANDARD};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::{DbError, Result};

const NONCE_LEN: usize = 12;
pub const KEY_LEN: usize = 32;

/// An encrypted column value. Only a [`FieldCipher`] can turn it back into text.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(transparent)]
pub struct Sealed(String);

impl Sealed {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Sealed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Sealed(..)")
    }
}

#[derive(Clone)]
pub struct FieldCipher {
    cipher: Aes256Gcm,
}

impl FieldCipher {
    pub fn new(key: &[u8; KEY_LEN]) -> Self {
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key)),
        }
    }

    /// Builds a cipher from a 64-character hex key.
    pub fn from_hex(key: &str) -> Result<Self> {
        let bytes = hex::decode(key.trim()).map_err(|e| DbError::Crypto(format!("key: {e}")))?;
        let key: [u8; KEY_LEN] = bytes
            .try_into()
            .map_err(|_| DbError::Crypto(format!("key must be {KEY_LEN} bytes")))?;
        Ok(Self::new(&key))
    }

    pub fn seal(&self, plaintext: &str) -> Result<Sealed> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|e| DbError::Crypto(format!("encrypt: {e}")))?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(Sealed(STANDARD.encode(out)))
    }

    pub fn open(&self, sealed: &Sealed) -> Result<String> {
        let raw = STANDARD
            .decode(sealed.as_str())
            .map_err(|e| DbError::Crypto(format!("decode: {e}")))?;
        if raw.len() <= NONCE_LEN {
            return Err(DbError::Crypto("sealed value too short".into()));
        }

        let (nonce, ciphertext) = raw.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| DbError::Crypto("decryption failed".into()))?;

        String::from_utf8(plaintext).map_err(|e| DbError::Crypto(format!("utf8: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> FieldCipher {
        FieldCipher::new(&[7u8; KEY_LEN])
    }

    #[test]
    fn sealed_value_opens_with_same_key() {
        let c = cipher();
        let sealed = c.seal("EAAG-token").unwrap();
        assert_ne!(sealed.as_str(), "EAAG-token");
        assert_eq!(c.open(&sealed).unwrap(), "EAAG-token");
    }

    #[test]
    fn nonce_differs_per_seal() {
        let c = cipher();
        assert_ne!(c.seal("same").unwrap(), c.seal("same").unwrap());
    }

    #[test]
    fn wrong_key_fails() {
        let sealed = cipher().seal("secret").unwrap();
        let other = FieldCipher::new(&[8u8; KEY_LEN]);
        assert!(matches!(other.open(&sealed), Err(DbError::Crypto(_))));
    }

    #[test]
    fn hex_key_must_be_32_bytes() {
        assert!(FieldCipher::from_hex(&"ab".repeat(32)).is_ok());
        assert!(FieldCipher::from_hex("abcd").is_err());
        assert!(FieldCipher::from_hex("zz").is_err());
    }

    #[test]
    fn debug_hides_contents() {
        let sealed = cipher().seal("secret").unwrap();
        assert_eq!(format!("{sealed:?}"), "Sealed(..)");
    }
}
