//! Pluggable decryption of fetched package metadata.

use super::StoreError;

/// Turns fetched bytes into plaintext.
pub trait Decryptor: Send + Sync {
    fn decrypt(&self, data: Vec<u8>) -> Result<Vec<u8>, StoreError>;
}

/// Identity decryptor for unencrypted hosts.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDecryption;

impl Decryptor for NoDecryption {
    fn decrypt(&self, data: Vec<u8>) -> Result<Vec<u8>, StoreError> {
        Ok(data)
    }
}

/// Repeating-key XOR, the lightweight obfuscation some hosts apply to
/// manifests.
#[derive(Debug, Clone)]
pub struct XorDecryptor {
    key: Vec<u8>,
}

impl XorDecryptor {
    pub fn new(key: impl Into<Vec<u8>>) -> Result<Self, StoreError> {
        let key = key.into();
        if key.is_empty() {
            return Err(StoreError::Decrypt("XOR key must not be empty".into()));
        }
        Ok(Self { key })
    }
}

impl Decryptor for XorDecryptor {
    fn decrypt(&self, mut data: Vec<u8>) -> Result<Vec<u8>, StoreError> {
        for (byte, k) in data.iter_mut().zip(self.key.iter().cycle()) {
            *byte ^= k;
        }
        Ok(data)
    }
}
