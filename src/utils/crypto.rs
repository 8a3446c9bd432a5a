// Cryptographic utilities: secure random tokens and refresh-token encryption
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose, Engine as _};
use rand::RngCore;

use crate::error::AuthError;

/// IV size for AES-256-GCM (96 bits)
pub const IV_SIZE: usize = 12;

/// Authentication tag size for AES-256-GCM (128 bits)
pub const TAG_SIZE: usize = 16;

/// Encryption key size for AES-256 (256 bits)
pub const ENCRYPTION_KEY_SIZE: usize = 32;

/// Generate a cryptographically secure, URL-safe opaque token.
///
/// Uses the OS-seeded CSPRNG; entropy exhaustion panics rather than letting
/// token generation silently degrade.
#[must_use]
pub fn generate_urlsafe_token(byte_length: usize) -> String {
    let mut bytes = vec![0u8; byte_length];
    rand::rng().fill_bytes(&mut bytes);
    general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Generate the `state` value for CSRF protection (256 bits of entropy).
#[must_use]
pub fn generate_state() -> String {
    generate_urlsafe_token(32)
}

/// Generate the OIDC `nonce` value (128 bits of entropy).
#[must_use]
pub fn generate_nonce() -> String {
    generate_urlsafe_token(16)
}

/// A refresh token encrypted for storage. Ciphertext, IV and tag are stored
/// separately (all base64) and are useless without all three plus the key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedSecret {
    pub ciphertext: String,
    pub iv: String,
    pub tag: String,
}

/// AES-256-GCM cipher for provider refresh tokens at rest.
///
/// The key is process-wide configuration, loaded once at startup. A fresh
/// random 96-bit IV is generated per encryption and never reused with the
/// same key.
#[derive(Clone)]
pub struct RefreshTokenCipher {
    key: [u8; ENCRYPTION_KEY_SIZE],
}

impl RefreshTokenCipher {
    #[must_use]
    pub fn new(key: [u8; ENCRYPTION_KEY_SIZE]) -> Self {
        Self { key }
    }

    /// Encrypt a refresh token, returning ciphertext, IV and tag separately.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Integrity` if the AEAD encryption fails.
    pub fn encrypt(&self, plaintext: &str) -> Result<EncryptedSecret, AuthError> {
        let mut iv_bytes = [0u8; IV_SIZE];
        rand::rng().fill_bytes(&mut iv_bytes);
        let iv = Nonce::from_slice(&iv_bytes);

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key));
        let sealed = cipher
            .encrypt(iv, plaintext.as_bytes())
            .map_err(|_| AuthError::Integrity)?;

        // aes-gcm appends the 16-byte tag to the ciphertext; split it off so
        // the two are stored as separate columns
        let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_SIZE);

        Ok(EncryptedSecret {
            ciphertext: general_purpose::STANDARD.encode(ciphertext),
            iv: general_purpose::STANDARD.encode(iv_bytes),
            tag: general_purpose::STANDARD.encode(tag),
        })
    }

    /// Decrypt a stored refresh token.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Integrity` if any part fails to decode or the
    /// authentication tag does not verify (tampered data or wrong key).
    /// There is no unauthenticated fallback.
    pub fn decrypt(&self, ciphertext: &str, iv: &str, tag: &str) -> Result<String, AuthError> {
        let ciphertext_bytes = general_purpose::STANDARD
            .decode(ciphertext)
            .map_err(|_| AuthError::Integrity)?;
        let iv_bytes = general_purpose::STANDARD
            .decode(iv)
            .map_err(|_| AuthError::Integrity)?;
        let tag_bytes = general_purpose::STANDARD
            .decode(tag)
            .map_err(|_| AuthError::Integrity)?;
        if iv_bytes.len() != IV_SIZE || tag_bytes.len() != TAG_SIZE {
            return Err(AuthError::Integrity);
        }

        let mut sealed = ciphertext_bytes;
        sealed.extend_from_slice(&tag_bytes);

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key));
        let plaintext = cipher
            .decrypt(Nonce::from_slice(&iv_bytes), sealed.as_ref())
            .map_err(|_| AuthError::Integrity)?;

        String::from_utf8(plaintext).map_err(|_| AuthError::Integrity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cipher() -> RefreshTokenCipher {
        RefreshTokenCipher::new([42u8; ENCRYPTION_KEY_SIZE])
    }

    #[test]
    fn test_tokens_are_urlsafe_and_unique() {
        let state = generate_state();
        let nonce = generate_nonce();
        assert_ne!(state, generate_state());
        assert_ne!(nonce, generate_nonce());
        for token in [&state, &nonce] {
            assert!(token
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        }
        // 32 bytes -> 43 base64url chars, 16 -> 22
        assert_eq!(state.len(), 43);
        assert_eq!(nonce.len(), 22);
    }

    #[test]
    fn test_encrypt_decrypt_round_trip() {
        let cipher = test_cipher();
        for plaintext in ["x", "1//0refresh-token-value", "ü🔑 non-ascii"] {
            let sealed = cipher.encrypt(plaintext).unwrap();
            let recovered = cipher
                .decrypt(&sealed.ciphertext, &sealed.iv, &sealed.tag)
                .unwrap();
            assert_eq!(recovered, plaintext);
        }
    }

    #[test]
    fn test_iv_is_fresh_per_call() {
        let cipher = test_cipher();
        let a = cipher.encrypt("same plaintext").unwrap();
        let b = cipher.encrypt("same plaintext").unwrap();
        assert_ne!(a.iv, b.iv);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn test_tampered_tag_fails_integrity() {
        let cipher = test_cipher();
        let sealed = cipher.encrypt("refresh-token").unwrap();

        let mut tag_bytes = general_purpose::STANDARD.decode(&sealed.tag).unwrap();
        for bit in 0..8 {
            let mut flipped = tag_bytes.clone();
            flipped[0] ^= 1 << bit;
            let tag = general_purpose::STANDARD.encode(&flipped);
            let result = cipher.decrypt(&sealed.ciphertext, &sealed.iv, &tag);
            assert!(matches!(result, Err(AuthError::Integrity)));
        }
        // last byte too
        let last = tag_bytes.len() - 1;
        tag_bytes[last] ^= 0x80;
        let tag = general_purpose::STANDARD.encode(&tag_bytes);
        assert!(matches!(
            cipher.decrypt(&sealed.ciphertext, &sealed.iv, &tag),
            Err(AuthError::Integrity)
        ));
    }

    #[test]
    fn test_tampered_ciphertext_fails_integrity() {
        let cipher = test_cipher();
        let sealed = cipher.encrypt("refresh-token").unwrap();
        let mut ct = general_purpose::STANDARD.decode(&sealed.ciphertext).unwrap();
        ct[0] ^= 0x01;
        let ciphertext = general_purpose::STANDARD.encode(&ct);
        assert!(matches!(
            cipher.decrypt(&ciphertext, &sealed.iv, &sealed.tag),
            Err(AuthError::Integrity)
        ));
    }

    #[test]
    fn test_wrong_key_fails_integrity() {
        let sealed = test_cipher().encrypt("refresh-token").unwrap();
        let other = RefreshTokenCipher::new([43u8; ENCRYPTION_KEY_SIZE]);
        assert!(matches!(
            other.decrypt(&sealed.ciphertext, &sealed.iv, &sealed.tag),
            Err(AuthError::Integrity)
        ));
    }
}
