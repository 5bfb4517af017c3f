use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rand::RngCore;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};

use crate::error::LedgerError;

/// AES-256-GCM cipher for dead-letter payloads. Ciphertext format is
/// `base64(nonce || ciphertext || tag)`.
pub struct PayloadCipher {
    key: LessSafeKey,
}

impl PayloadCipher {
    /// Builds the cipher from a base64-encoded 32-byte key.
    pub fn from_base64_key(key_b64: &str) -> Result<Self, LedgerError> {
        let key_bytes = BASE64
            .decode(key_b64)
            .map_err(|e| LedgerError::Crypto(format!("invalid key encoding: {}", e)))?;

        let unbound = UnboundKey::new(&AES_256_GCM, &key_bytes)
            .map_err(|_| LedgerError::Crypto("key must be 32 bytes".to_string()))?;

        Ok(Self {
            key: LessSafeKey::new(unbound),
        })
    }

    pub fn seal(&self, plaintext: &[u8]) -> Result<String, LedgerError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::assume_unique_for_key(nonce_bytes);

        let mut in_out = plaintext.to_vec();
        self.key
            .seal_in_place_append_tag(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| LedgerError::Crypto("encryption failed".to_string()))?;

        let mut framed = nonce_bytes.to_vec();
        framed.extend_from_slice(&in_out);

        Ok(BASE64.encode(framed))
    }

    pub fn open(&self, sealed_b64: &str) -> Result<Vec<u8>, LedgerError> {
        let framed = BASE64
            .decode(sealed_b64)
            .map_err(|e| LedgerError::Crypto(format!("invalid ciphertext encoding: {}", e)))?;

        if framed.len() <= NONCE_LEN {
            return Err(LedgerError::Crypto("ciphertext too short".to_string()));
        }

        let (nonce_bytes, ciphertext) = framed.split_at(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(nonce_bytes)
            .map_err(|_| LedgerError::Crypto("invalid nonce".to_string()))?;

        let mut in_out = ciphertext.to_vec();
        let plaintext = self
            .key
            .open_in_place(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| LedgerError::Crypto("decryption failed".to_string()))?;

        Ok(plaintext.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

    fn test_cipher() -> PayloadCipher {
        PayloadCipher::from_base64_key(&BASE64.encode([7u8; 32])).unwrap()
    }

    #[test]
    fn seal_then_open_recovers_payload() {
        let cipher = test_cipher();
        let sealed = cipher.seal(b"{\"entry\":[]}").unwrap();
        assert_eq!(cipher.open(&sealed).unwrap(), b"{\"entry\":[]}");
    }

    #[test]
    fn tampered_ciphertext_is_rejected() {
        let cipher = test_cipher();
        let sealed = cipher.seal(b"secret").unwrap();

        let mut raw = BASE64.decode(&sealed).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x01;

        let result = cipher.open(&BASE64.encode(raw));
        assert!(matches!(result, Err(LedgerError::Crypto(_))));
    }

    #[test]
    fn wrong_key_length_is_rejected() {
        let result = PayloadCipher::from_base64_key(&BASE64.encode([1u8; 16]));
        assert!(matches!(result, Err(LedgerError::Crypto(_))));
    }
}
