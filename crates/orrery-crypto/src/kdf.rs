//! Password-based session key derivation.
//!
//! Each direction of a connection derives its own key: the sender picks a
//! random salt, transmits it in the clear, and both ends run scrypt over
//! `(password, salt)`. The parameters are the interactive profile
//! (`N = 2^14`, `r = 8`, `p = 1`, about 16 MiB of scratch space), which is
//! deliberately slow enough to blunt offline guessing while staying
//! unnoticeable inside a connection setup.

use rand::rngs::OsRng;
use rand::RngCore;
use scrypt::Params;
use zeroize::Zeroize;

use crate::error::CryptoError;

/// Salt length in bytes.
pub const SALTBYTES: usize = 32;
/// Derived key length in bytes, matching the secret-stream key size.
pub const KEYBYTES: usize = 32;

const SCRYPT_LOG_N: u8 = 14;
const SCRYPT_R: u32 = 8;
const SCRYPT_P: u32 = 1;

/// A derived session key. Wiped from memory on drop.
pub struct Key([u8; KEYBYTES]);

impl Key {
    pub fn from_bytes(bytes: [u8; KEYBYTES]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEYBYTES] {
        &self.0
    }
}

impl Drop for Key {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// Generate a fresh random salt from the OS CSPRNG.
pub fn generate_salt() -> [u8; SALTBYTES] {
    let mut salt = [0u8; SALTBYTES];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Derive a session key from a password and salt.
///
/// # Errors
///
/// Returns [`CryptoError::OutOfMemory`] if the hash cannot be computed;
/// with compile-time-fixed parameters, resource exhaustion is the only
/// runtime failure mode.
pub fn derive_key(password: &[u8], salt: &[u8; SALTBYTES]) -> Result<Key, CryptoError> {
    let params = Params::new(SCRYPT_LOG_N, SCRYPT_R, SCRYPT_P, KEYBYTES)
        .map_err(|_| CryptoError::OutOfMemory)?;

    let mut key = [0u8; KEYBYTES];
    scrypt::scrypt(password, salt, &params, &mut key).map_err(|_| CryptoError::OutOfMemory)?;
    Ok(Key(key))
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_same_password_and_salt_derive_same_key() {
        let salt = [0x24u8; SALTBYTES];
        let a = derive_key(b"password", &salt).unwrap();
        let b = derive_key(b"password", &salt).unwrap();
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_different_salts_derive_different_keys() {
        let a = derive_key(b"password", &[0x01u8; SALTBYTES]).unwrap();
        let b = derive_key(b"password", &[0x02u8; SALTBYTES]).unwrap();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_different_passwords_derive_different_keys() {
        let salt = [0x24u8; SALTBYTES];
        let a = derive_key(b"password", &salt).unwrap();
        let b = derive_key(b"passwore", &salt).unwrap();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_empty_password_is_accepted() {
        let salt = [0x24u8; SALTBYTES];
        derive_key(b"", &salt).unwrap();
    }

    #[test]
    fn test_generated_salts_are_unique() {
        let mut seen = HashSet::new();
        for _ in 0..1000 {
            assert!(seen.insert(generate_salt()), "salt collision");
        }
    }
}
