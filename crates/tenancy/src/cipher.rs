//! Connection descriptor encryption at rest.
//!
//! Encrypted form: `enc:v1:` + base64(nonce(12) ‖ AES-256-GCM ciphertext).
//! Descriptors without the prefix are legacy plaintext and pass through.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use certchain_types::{ConnectionDescriptor, ENCRYPTED_PREFIX};
use rand::RngCore;
use std::fmt;
use thiserror::Error;

const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

/// Errors from descriptor encryption and decryption.
///
/// Messages never include descriptor contents.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorError {
    #[error("Master key must be 64 hex characters")]
    InvalidKey,

    #[error("Encrypted descriptor found but no master key is configured")]
    MissingKey,

    #[error("Encrypted descriptor is not valid base64")]
    Encoding,

    #[error("Encrypted descriptor is too short")]
    Truncated,

    #[error("Descriptor decryption failed")]
    Decryption,

    #[error("Descriptor encryption failed")]
    Encryption,

    #[error("Decrypted descriptor is not valid UTF-8")]
    Utf8,
}

/// Encrypts and decrypts connection descriptors with a master key.
#[derive(Clone)]
pub struct DescriptorCipher {
    key: Option<[u8; KEY_LEN]>,
}

impl DescriptorCipher {
    /// Cipher from a 64-character hex master key.
    pub fn from_hex(master_key: &str) -> Result<Self, DescriptorError> {
        let bytes = hex::decode(master_key.trim()).map_err(|_| DescriptorError::InvalidKey)?;
        let key: [u8; KEY_LEN] = bytes
            .try_into()
            .map_err(|_| DescriptorError::InvalidKey)?;
        Ok(Self { key: Some(key) })
    }

    /// Cipher without a key: plaintext descriptors pass, encrypted ones fail.
    pub fn plaintext_only() -> Self {
        Self { key: None }
    }

    /// Generate a fresh master key as hex.
    pub fn generate_key_hex() -> String {
        let mut key = [0u8; KEY_LEN];
        rand::thread_rng().fill_bytes(&mut key);
        hex::encode(key)
    }

    pub fn has_key(&self) -> bool {
        self.key.is_some()
    }

    /// Encrypt a plaintext descriptor. Already-encrypted input is returned
    /// unchanged.
    pub fn encrypt(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<ConnectionDescriptor, DescriptorError> {
        if descriptor.is_encrypted() {
            return Ok(descriptor.clone());
        }
        let cipher = self.cipher()?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, descriptor.expose().as_bytes())
            .map_err(|_| DescriptorError::Encryption)?;

        let mut sealed = nonce_bytes.to_vec();
        sealed.extend_from_slice(&ciphertext);
        Ok(ConnectionDescriptor::new(format!(
            "{}{}",
            ENCRYPTED_PREFIX,
            STANDARD.encode(sealed)
        )))
    }

    /// Decrypt a descriptor. Plaintext input is returned unchanged.
    pub fn decrypt(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<ConnectionDescriptor, DescriptorError> {
        let Some(encoded) = descriptor.expose().strip_prefix(ENCRYPTED_PREFIX) else {
            return Ok(descriptor.clone());
        };
        let cipher = self.cipher()?;

        let sealed = STANDARD
            .decode(encoded)
            .map_err(|_| DescriptorError::Encoding)?;
        if sealed.len() <= NONCE_LEN {
            return Err(DescriptorError::Truncated);
        }
        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);

        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| DescriptorError::Decryption)?;
        let plaintext = String::from_utf8(plaintext).map_err(|_| DescriptorError::Utf8)?;
        Ok(ConnectionDescriptor::new(plaintext))
    }

    fn cipher(&self) -> Result<Aes256Gcm, DescriptorError> {
        let key = self.key.as_ref().ok_or(DescriptorError::MissingKey)?;
        Aes256Gcm::new_from_slice(key).map_err(|_| DescriptorError::InvalidKey)
    }
}

impl fmt::Debug for DescriptorCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DescriptorCipher")
            .field("has_key", &self.has_key())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> DescriptorCipher {
        DescriptorCipher::from_hex(&"ab".repeat(32)).unwrap()
    }

    #[test]
    fn test_encrypt_then_decrypt() {
        let plain = ConnectionDescriptor::new("postgres://admin:hunter2@db/mit");
        let sealed = cipher().encrypt(&plain).unwrap();

        assert!(sealed.is_encrypted());
        assert!(!sealed.expose().contains("hunter2"));
        assert_eq!(cipher().decrypt(&sealed).unwrap(), plain);
    }

    #[test]
    fn test_no_double_encryption() {
        let sealed = cipher()
            .encrypt(&ConnectionDescriptor::new("memory://mit"))
            .unwrap();
        assert_eq!(cipher().encrypt(&sealed).unwrap(), sealed);
    }

    #[test]
    fn test_legacy_plaintext_passes_through() {
        let plain = ConnectionDescriptor::new("memory://mit");
        assert_eq!(DescriptorCipher::plaintext_only().decrypt(&plain).unwrap(), plain);
    }

    #[test]
    fn test_wrong_key_and_missing_key() {
        let sealed = cipher()
            .encrypt(&ConnectionDescriptor::new("memory://mit"))
            .unwrap();
        let other = DescriptorCipher::from_hex(&"cd".repeat(32)).unwrap();

        assert_eq!(other.decrypt(&sealed), Err(DescriptorError::Decryption));
        assert_eq!(
            DescriptorCipher::plaintext_only().decrypt(&sealed),
            Err(DescriptorError::MissingKey)
        );
    }

    #[test]
    fn test_malformed_inputs() {
        assert_eq!(
            DescriptorCipher::from_hex("abcd").unwrap_err(),
            DescriptorError::InvalidKey
        );
        assert_eq!(
            cipher().decrypt(&ConnectionDescriptor::new("enc:v1:!!!")),
            Err(DescriptorError::Encoding)
        );
        assert_eq!(
            cipher().decrypt(&ConnectionDescriptor::new("enc:v1:QUJD")),
            Err(DescriptorError::Truncated)
        );
    }

    #[test]
    fn test_generated_key_is_usable() {
        let key = DescriptorCipher::generate_key_hex();
        assert_eq!(key.len(), 64);
        assert!(DescriptorCipher::from_hex(&key).is_ok());
    }
}
