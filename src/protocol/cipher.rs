use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use sha2::{Digest, Sha256};

use crate::{Error, Result};

const NONCE_LEN: usize = 12;

/// `decrypt` must fail on any input that was not produced by `encrypt`
/// under the same key.
pub trait Cipher: Send + Sync {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>>;
    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>>;
}

// output layout: nonce || ciphertext || tag
pub struct SharedKeyCipher {
    aead: ChaCha20Poly1305,
}

impl SharedKeyCipher {
    pub fn from_passphrase(passphrase: &str) -> Self {
        let digest = Sha256::digest(passphrase.as_bytes());
        let key = Key::from_slice(digest.as_slice());
        Self {
            aead: ChaCha20Poly1305::new(key),
        }
    }
}

impl Cipher for SharedKeyCipher {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        let sealed = self.aead.encrypt(&nonce, plaintext).map_err(|_| Error::Decrypt)?;

        let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
        out.extend_from_slice(nonce.as_slice());
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        if ciphertext.len() < NONCE_LEN {
            return Err(Error::Decrypt);
        }
        let (nonce, sealed) = ciphertext.split_at(NONCE_LEN);
        self.aead
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| Error::Decrypt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_what_it_seals() {
        let cipher = SharedKeyCipher::from_passphrase("secret");
        let sealed = cipher.encrypt(b"New Path").unwrap();
        assert_ne!(&sealed[NONCE_LEN..], b"New Path");
        assert_eq!(cipher.decrypt(&sealed).unwrap(), b"New Path");
    }

    #[test]
    fn fails_closed_on_tampering() {
        let cipher = SharedKeyCipher::from_passphrase("secret");
        let mut sealed = cipher.encrypt(b"payload").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        assert!(matches!(cipher.decrypt(&sealed), Err(Error::Decrypt)));
        assert!(matches!(cipher.decrypt(b"short"), Err(Error::Decrypt)));
    }

    #[test]
    fn different_keys_do_not_interoperate() {
        let sealed = SharedKeyCipher::from_passphrase("a").encrypt(b"x").unwrap();
        assert!(SharedKeyCipher::from_passphrase("b").decrypt(&sealed).is_err());
    }
}
