use aes::cipher::{block_padding::Pkcs7, BlockEncryptMut, KeyIvInit};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use sha2::{Digest, Sha256};

use crate::prelude::*;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;

/// Encrypt a password the way the Neovolt login endpoint expects:
/// AES-256-CBC with PKCS7 padding, key = SHA-256(username),
/// IV = MD5(username), result base64-encoded.
pub fn encrypt_password(password: &str, username: &str) -> Result<String> {
    let key = Sha256::digest(username.as_bytes()); // 32 bytes
    let iv = md5::compute(username.as_bytes()); // 16 bytes

    let cipher = Aes256CbcEnc::new_from_slices(&key, &iv.0)
        .map_err(|e| anyhow!("password encryption setup failed: {}", e))?;
    let ciphertext = cipher.encrypt_padded_vec_mut::<Pkcs7>(password.as_bytes());

    Ok(STANDARD.encode(ciphertext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_is_base64_and_block_aligned() {
        let encrypted = encrypt_password("hunter2", "user@example.com").unwrap();
        let raw = STANDARD.decode(&encrypted).unwrap();
        // AES block size with PKCS7: always a multiple of 16, never empty
        assert!(!raw.is_empty());
        assert_eq!(raw.len() % 16, 0);
    }

    #[test]
    fn deterministic_for_same_inputs() {
        let a = encrypt_password("secret", "alice").unwrap();
        let b = encrypt_password("secret", "alice").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn key_is_derived_from_username() {
        let a = encrypt_password("secret", "alice").unwrap();
        let b = encrypt_password("secret", "bob").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn long_passwords_pad_to_extra_block() {
        let short = encrypt_password("x", "alice").unwrap();
        let long = encrypt_password(&"x".repeat(17), "alice").unwrap();
        assert_eq!(STANDARD.decode(short).unwrap().len(), 16);
        assert_eq!(STANDARD.decode(long).unwrap().len(), 32);
    }
}
