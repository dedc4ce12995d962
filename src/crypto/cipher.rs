//! AES-256-GCM envelope encryption of individual values.
//!
//! Each call to `encrypt` generates a fresh random 16-byte IV.  The result
//! is a self-contained string of three hex fields:
//!
//! ```text
//! ivHex:tagHex:cipherHex
//! ```
//!
//! A 16-byte IV is longer than the usual 12 bytes; GCM handles it by
//! hashing the IV into the initial counter block, so the format stays
//! readable by any standard AES-GCM implementation.

use aes_gcm::aead::consts::U16;
use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::aes::Aes256;
use aes_gcm::{AesGcm, Nonce, Tag};
use rand::RngCore;

use crate::errors::{Result, VaultError};

/// AES-256-GCM with a 16-byte IV and the default 16-byte tag.
type Aes256Gcm16 = AesGcm<Aes256, U16>;

/// Size of the symmetric key in bytes.
pub const KEY_LEN: usize = 32;

/// Size of the IV in bytes.
pub const IV_LEN: usize = 16;

/// Size of the authentication tag in bytes.
pub const TAG_LEN: usize = 16;

/// Separator between the three hex fields.
const SEPARATOR: char = ':';

/// Encrypt a UTF-8 string with a 32-byte key.
///
/// Returns `ivHex:tagHex:cipherHex`.  Keys of any other length are
/// rejected before the cipher is built.
pub fn encrypt(plaintext: &str, key: &[u8]) -> Result<String> {
    let cipher = build_cipher(key)?;

    let mut iv = [0u8; IV_LEN];
    rand::rng().fill_bytes(&mut iv);

    let mut buffer = plaintext.as_bytes().to_vec();
    let tag = cipher
        .encrypt_in_place_detached(Nonce::<U16>::from_slice(&iv), b"", &mut buffer)
        .map_err(|e| VaultError::EncryptionFailed(format!("encryption error: {e}")))?;

    Ok(format!(
        "{}{SEPARATOR}{}{SEPARATOR}{}",
        hex::encode(iv),
        hex::encode(tag),
        hex::encode(&buffer)
    ))
}

/// Decrypt a value produced by `encrypt`.
///
/// Structural problems fail with `MalformedCiphertext`; a failed tag check
/// (wrong key or tampered data) fails with `AuthenticationFailed`.
pub fn decrypt(ciphertext: &str, key: &[u8]) -> Result<String> {
    let cipher = build_cipher(key)?;
    let parts = EnvelopeParts::parse(ciphertext)?;

    let mut buffer = parts.body;
    cipher
        .decrypt_in_place_detached(
            Nonce::<U16>::from_slice(&parts.iv),
            b"",
            &mut buffer,
            Tag::<U16>::from_slice(&parts.tag),
        )
        .map_err(|_| VaultError::AuthenticationFailed)?;

    String::from_utf8(buffer)
        .map_err(|_| VaultError::MalformedCiphertext("plaintext is not valid UTF-8".into()))
}

fn build_cipher(key: &[u8]) -> Result<Aes256Gcm16> {
    if key.len() != KEY_LEN {
        return Err(VaultError::InvalidKeyLength(key.len()));
    }
    Aes256Gcm16::new_from_slice(key).map_err(|_| VaultError::InvalidKeyLength(key.len()))
}

/// The decoded fields of an envelope string.
struct EnvelopeParts {
    iv: Vec<u8>,
    tag: Vec<u8>,
    body: Vec<u8>,
}

impl EnvelopeParts {
    fn parse(input: &str) -> Result<Self> {
        let segments: Vec<&str> = input.trim().split(SEPARATOR).collect();
        if segments.len() != 3 {
            return Err(VaultError::MalformedCiphertext(format!(
                "expected 3 ':'-separated fields, found {}",
                segments.len()
            )));
        }

        // The body of an empty plaintext is legitimately empty; IV and tag never are.
        let (iv_hex, tag_hex, body_hex) = (segments[0], segments[1], segments[2]);
        if iv_hex.is_empty() || tag_hex.is_empty() {
            return Err(VaultError::MalformedCiphertext(
                "IV and tag must not be empty".into(),
            ));
        }

        let iv = decode_field("IV", iv_hex)?;
        let tag = decode_field("tag", tag_hex)?;
        let body = decode_field("ciphertext", body_hex)?;

        if iv.len() != IV_LEN {
            return Err(VaultError::MalformedCiphertext(format!(
                "IV must be {IV_LEN} bytes, got {}",
                iv.len()
            )));
        }
        if tag.len() != TAG_LEN {
            return Err(VaultError::MalformedCiphertext(format!(
                "tag must be {TAG_LEN} bytes, got {}",
                tag.len()
            )));
        }

        Ok(Self { iv, tag, body })
    }
}

fn decode_field(name: &str, value: &str) -> Result<Vec<u8>> {
    hex::decode(value)
        .map_err(|e| VaultError::MalformedCiphertext(format!("{name} is not valid hex: {e}")))
}
