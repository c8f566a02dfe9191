//! At-rest cipher for SEFT instrument payloads
//!
//! AES-256-CBC with PKCS#7 padding. The key is the SHA-256 digest of the
//! configured secret. Every ciphertext gets a fresh IV from the OS CSPRNG and
//! is stored as `base64(IV || ciphertext)`.

use aes::Aes256;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::{rngs::OsRng, RngCore};

use super::derive_key;
use crate::{Error, Result};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

const BLOCK_SIZE: usize = 16;

/// Process-wide symmetric cipher with immutable key material
#[derive(Clone)]
pub struct Cipher {
    key: Vec<u8>,
}

impl std::fmt::Debug for Cipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cipher").finish_non_exhaustive()
    }
}

impl Cipher {
    /// Build a cipher keyed from a configured secret
    pub fn new(secret: &str) -> Self {
        Self {
            key: derive_key(secret).to_vec(),
        }
    }

    /// Build a cipher from raw key bytes
    ///
    /// Any length other than 32 bytes is accepted here and reported as a
    /// crypto error on first use.
    pub fn from_key(key: &[u8]) -> Self {
        Self { key: key.to_vec() }
    }

    /// Encrypt plaintext, returning `base64(IV || ciphertext)` as bytes
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut iv = [0u8; BLOCK_SIZE];
        OsRng.fill_bytes(&mut iv);

        let encryptor = Aes256CbcEnc::new_from_slices(&self.key, &iv)
            .map_err(|_| Error::Crypto(format!("Invalid key length: {}", self.key.len())))?;
        let ciphertext = encryptor.encrypt_padded_vec_mut::<Pkcs7>(plaintext);

        let mut raw = Vec::with_capacity(BLOCK_SIZE + ciphertext.len());
        raw.extend_from_slice(&iv);
        raw.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(raw).into_bytes())
    }

    /// Decrypt the output of [`Cipher::encrypt`]
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        let raw = STANDARD
            .decode(ciphertext)
            .map_err(|e| Error::Crypto(format!("Ciphertext is not valid base64: {}", e)))?;

        if raw.len() < 2 * BLOCK_SIZE || raw.len() % BLOCK_SIZE != 0 {
            return Err(Error::Crypto(format!(
                "Ciphertext has invalid length {}",
                raw.len()
            )));
        }

        let (iv, body) = raw.split_at(BLOCK_SIZE);
        let decryptor = Aes256CbcDec::new_from_slices(&self.key, iv)
            .map_err(|_| Error::Crypto(format!("Invalid key length: {}", self.key.len())))?;
        decryptor
            .decrypt_padded_vec_mut::<Pkcs7>(body)
            .map_err(|_| Error::Crypto("Padding check failed".to_string()))
    }
}
