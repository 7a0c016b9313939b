//! Master key and per-user envelope encryption.
//!
//! Every user gets a random symmetric key at signup. The key itself is never
//! stored in the clear: it is sealed under the process-wide master key and
//! the resulting token goes into `users.security_key`. Provenance ids are
//! encrypted twice per stamp, once under the user key and once under the
//! master key, so both the platform and the originating user can recover
//! them independently.
//!
//! Tokens are authenticated (ChaCha20-Poly1305): a tampered token decrypts
//! to `None`, never to corrupted plaintext. The wire encoding is URL-safe
//! base64 terminated by a single literal `=`, so a token is self-delimiting
//! inside a concatenated stamp payload.

use anyhow::{anyhow, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Key, Nonce,
};
use rand::RngCore;
use zeroize::Zeroize;

/// Wire version of the token framing.
const TOKEN_VERSION: u8 = 1;

/// Domain separation: sealed user keys vs. data tokens.
const USER_KEY_AAD: &[u8] = b"deepmark:user-key:v1";
const DATA_AAD: &[u8] = b"deepmark:token:v1";

pub const MASTER_KEY_LEN: usize = 32;

// -------------------- Master key --------------------

/// 32-byte master key, read once from configuration at startup.
pub struct MasterKey {
    bytes: [u8; MASTER_KEY_LEN],
}

impl MasterKey {
    pub fn from_bytes(bytes: [u8; MASTER_KEY_LEN]) -> Self {
        Self { bytes }
    }

    /// Parse the configured form: 64 lowercase/uppercase hex characters.
    pub fn from_hex(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.len() != MASTER_KEY_LEN * 2 {
            return Err(anyhow!(
                "master key must be {} hex characters, got {}",
                MASTER_KEY_LEN * 2,
                trimmed.len()
            ));
        }
        let decoded = hex::decode(trimmed).map_err(|_| anyhow!("master key is not valid hex"))?;
        let mut bytes = [0u8; MASTER_KEY_LEN];
        bytes.copy_from_slice(&decoded);
        Ok(Self { bytes })
    }

    /// Generate a fresh key (operator tooling; production keys come from
    /// configuration).
    pub fn generate() -> Self {
        let mut bytes = [0u8; MASTER_KEY_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self { bytes }
    }
}

impl Drop for MasterKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

// -------------------- Ciphers --------------------

/// Authenticated-encryption handle over one symmetric key.
///
/// `encrypt` produces a `=`-terminated token; `decrypt` returns `None` for
/// any token that fails authentication or framing. That `None` is a normal
/// signal in the ingest path, not an error.
pub struct UserCipher {
    key: [u8; MASTER_KEY_LEN],
    aad: &'static [u8],
}

impl UserCipher {
    fn new(key: [u8; MASTER_KEY_LEN], aad: &'static [u8]) -> Self {
        Self { key, aad }
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.key));
        let mut nonce = [0u8; 12];
        rand::thread_rng().fill_bytes(&mut nonce);
        let ciphertext = cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: plaintext.as_bytes(),
                    aad: self.aad,
                },
            )
            .map_err(|_| anyhow!("token encryption failed"))?;

        let mut framed = Vec::with_capacity(1 + nonce.len() + ciphertext.len());
        framed.push(TOKEN_VERSION);
        framed.extend_from_slice(&nonce);
        framed.extend_from_slice(&ciphertext);
        Ok(encode_token(&framed))
    }

    pub fn decrypt(&self, token: &str) -> Option<String> {
        let framed = decode_token(token)?;
        // version(1) + nonce(12) + tag(16) is the minimum frame
        if framed.len() < 29 || framed[0] != TOKEN_VERSION {
            return None;
        }
        let nonce = &framed[1..13];
        let ciphertext = &framed[13..];
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.key));
        let clear = cipher
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: ciphertext,
                    aad: self.aad,
                },
            )
            .ok()?;
        String::from_utf8(clear).ok()
    }
}

impl Drop for UserCipher {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

// -------------------- Vault --------------------

/// Sealed per-user key as stored in `users.security_key`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncryptedUserKey(String);

impl EncryptedUserKey {
    pub fn from_stored(s: String) -> Self {
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Holder of the master key; issuer of per-user ciphers.
///
/// Process-wide and immutable after startup. There is no key rotation path.
pub struct KeyVault {
    master_key: [u8; MASTER_KEY_LEN],
    master: UserCipher,
}

impl KeyVault {
    pub fn new(master: MasterKey) -> Self {
        Self {
            master_key: master.bytes,
            master: UserCipher::new(master.bytes, DATA_AAD),
        }
    }

    /// Generate a fresh user key and seal it under the master key.
    pub fn generate_user_key(&self) -> Result<EncryptedUserKey> {
        let mut user_key = [0u8; MASTER_KEY_LEN];
        rand::thread_rng().fill_bytes(&mut user_key);
        let envelope = UserCipher::new(self.master_key, USER_KEY_AAD);
        let token = envelope.encrypt(&hex::encode(user_key))?;
        user_key.zeroize();
        Ok(EncryptedUserKey(token))
    }

    /// Unseal a stored user key and return its cipher handle.
    ///
    /// Unlike data-token decryption, failure here is fatal for the request:
    /// a user record whose key envelope does not open is corrupt.
    pub fn user_cipher(&self, sealed: &EncryptedUserKey) -> Result<UserCipher> {
        let envelope = UserCipher::new(self.master_key, USER_KEY_AAD);
        let key_hex = envelope
            .decrypt(sealed.as_str())
            .ok_or_else(|| anyhow!("sealed user key failed to open under the master key"))?;
        let decoded =
            hex::decode(&key_hex).map_err(|_| anyhow!("sealed user key payload is not hex"))?;
        if decoded.len() != MASTER_KEY_LEN {
            return Err(anyhow!(
                "sealed user key has wrong length: expected {}, got {}",
                MASTER_KEY_LEN,
                decoded.len()
            ));
        }
        let mut key = [0u8; MASTER_KEY_LEN];
        key.copy_from_slice(&decoded);
        Ok(UserCipher::new(key, DATA_AAD))
    }

    /// Cipher over the master key itself, for the platform-readable copy of
    /// each stamped id.
    pub fn master_cipher(&self) -> &UserCipher {
        &self.master
    }
}

impl Drop for KeyVault {
    fn drop(&mut self) {
        self.master_key.zeroize();
    }
}

// -------------------- Token wire encoding --------------------

/// URL-safe base64 without padding, terminated by one literal `=`.
///
/// The terminator is load-bearing: stamp payloads concatenate two tokens and
/// the reader splits them on `=`. Base64 without padding never contains an
/// interior `=`, so the terminator is unambiguous.
fn encode_token(bytes: &[u8]) -> String {
    let mut s = URL_SAFE_NO_PAD.encode(bytes);
    s.push('=');
    s
}

fn decode_token(token: &str) -> Option<Vec<u8>> {
    let stripped = token.trim_end_matches('=');
    if stripped.len() == token.len() {
        // missing terminator: not one of ours
        return None;
    }
    URL_SAFE_NO_PAD.decode(stripped).ok()
}
