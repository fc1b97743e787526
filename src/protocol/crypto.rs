//! Cryptographic primitives for stored password protection.

use aes::cipher::{
    block_padding::{NoPadding, Pkcs7},
    BlockDecryptMut, BlockEncryptMut, KeyIvInit,
};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::Sha256;

use crate::error::{Error, Result};

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type Aes192CbcEnc = cbc::Encryptor<aes::Aes192>;
type Aes192CbcDec = cbc::Decryptor<aes::Aes192>;
type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// AES block size in bytes.
pub const AES_BLOCK_SIZE: usize = 16;

/// Padding applied by a cipher transformation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Padding {
    /// Input must be a multiple of the block size.
    None,
    /// PKCS#5/PKCS#7 padding.
    Pkcs5,
}

/// MAC algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacAlgorithm {
    HmacSha1,
    HmacSha256,
}

impl MacAlgorithm {
    /// Parse a Java-style MAC name such as `HmacSHA256`.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "HmacSHA1" => Some(Self::HmacSha1),
            "HmacSHA256" => Some(Self::HmacSha256),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::HmacSha1 => "HmacSHA1",
            Self::HmacSha256 => "HmacSHA256",
        }
    }
}

fn bad_key(len: usize) -> Error {
    Error::encrypted_password(format!("Invalid AES key length: {} bytes", len))
}

fn encrypt_with<C: BlockEncryptMut>(cipher: C, plaintext: &[u8], padding: Padding) -> Result<Vec<u8>> {
    let mut buf = plaintext.to_vec();
    buf.resize(plaintext.len() + AES_BLOCK_SIZE, 0);
    let len = match padding {
        Padding::None => cipher
            .encrypt_padded_mut::<NoPadding>(&mut buf, plaintext.len())
            .map_err(|_| {
                Error::encrypted_password("Plaintext is not a multiple of the cipher block size")
            })?
            .len(),
        Padding::Pkcs5 => cipher
            .encrypt_padded_mut::<Pkcs7>(&mut buf, plaintext.len())
            .map_err(|_| Error::encrypted_password("Padding failed"))?
            .len(),
    };
    buf.truncate(len);
    Ok(buf)
}

fn decrypt_with<C: BlockDecryptMut>(cipher: C, ciphertext: &[u8], padding: Padding) -> Result<Vec<u8>> {
    let mut buf = ciphertext.to_vec();
    let plain = match padding {
        Padding::None => cipher.decrypt_padded_mut::<NoPadding>(&mut buf),
        Padding::Pkcs5 => cipher.decrypt_padded_mut::<Pkcs7>(&mut buf),
    }
    .map_err(|_| Error::encrypted_password("Decryption failed: bad padding or block size"))?;
    Ok(plain.to_vec())
}

/// Encrypt data using AES-CBC. The key length selects AES-128/192/256.
pub fn encrypt_cbc(key: &[u8], iv: &[u8], plaintext: &[u8], padding: Padding) -> Result<Vec<u8>> {
    match key.len() {
        16 => encrypt_with(
            Aes128CbcEnc::new_from_slices(key, iv).map_err(|_| bad_key(key.len()))?,
            plaintext,
            padding,
        ),
        24 => encrypt_with(
            Aes192CbcEnc::new_from_slices(key, iv).map_err(|_| bad_key(key.len()))?,
            plaintext,
            padding,
        ),
        32 => encrypt_with(
            Aes256CbcEnc::new_from_slices(key, iv).map_err(|_| bad_key(key.len()))?,
            plaintext,
            padding,
        ),
        n => Err(bad_key(n)),
    }
}

/// Decrypt data using AES-CBC. The key length selects AES-128/192/256.
pub fn decrypt_cbc(key: &[u8], iv: &[u8], ciphertext: &[u8], padding: Padding) -> Result<Vec<u8>> {
    match key.len() {
        16 => decrypt_with(
            Aes128CbcDec::new_from_slices(key, iv).map_err(|_| bad_key(key.len()))?,
            ciphertext,
            padding,
        ),
        24 => decrypt_with(
            Aes192CbcDec::new_from_slices(key, iv).map_err(|_| bad_key(key.len()))?,
            ciphertext,
            padding,
        ),
        32 => decrypt_with(
            Aes256CbcDec::new_from_slices(key, iv).map_err(|_| bad_key(key.len()))?,
            ciphertext,
            padding,
        ),
        n => Err(bad_key(n)),
    }
}

/// Compute an HMAC over the concatenation of `parts`.
pub fn hmac(algorithm: MacAlgorithm, key: &[u8], parts: &[&[u8]]) -> Result<Vec<u8>> {
    let bad_mac_key = |_| Error::encrypted_password("Invalid MAC key");
    let digest = match algorithm {
        MacAlgorithm::HmacSha1 => {
            let mut mac = <Hmac<Sha1> as Mac>::new_from_slice(key)
                .map_err(bad_mac_key)?;
            for part in parts {
                mac.update(part);
            }
            mac.finalize().into_bytes().to_vec()
        }
        MacAlgorithm::HmacSha256 => {
            let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(key)
                .map_err(bad_mac_key)?;
            for part in parts {
                mac.update(part);
            }
            mac.finalize().into_bytes().to_vec()
        }
    };
    Ok(digest)
}

/// Generate cryptographically secure random bytes.
pub fn random_bytes(len: usize) -> Vec<u8> {
    use rand::RngCore;
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

/// Convert bytes to lowercase hex string.
pub fn bytes_to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Convert hex string to bytes.
pub fn hex_to_bytes(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 || !hex.is_ascii() {
        return None;
    }

    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let iv = [7u8; 16];
        for key_len in [16, 24, 32] {
            let key = vec![1u8; key_len];
            let plaintext = b"Hello, Teradata!";

            let encrypted = encrypt_cbc(&key, &iv, plaintext, Padding::None).unwrap();
            assert_eq!(encrypted.len(), 16);
            let decrypted = decrypt_cbc(&key, &iv, &encrypted, Padding::None).unwrap();
            assert_eq!(decrypted, plaintext);

            let encrypted = encrypt_cbc(&key, &iv, plaintext, Padding::Pkcs5).unwrap();
            assert_eq!(encrypted.len(), 32);
            let decrypted = decrypt_cbc(&key, &iv, &encrypted, Padding::Pkcs5).unwrap();
            assert_eq!(decrypted, plaintext);
        }
    }

    #[test]
    fn test_no_padding_rejects_partial_block() {
        let err = encrypt_cbc(&[0u8; 16], &[0u8; 16], b"short", Padding::None).unwrap_err();
        assert!(matches!(err, Error::EncryptedPassword { .. }));
        assert!(encrypt_cbc(&[0u8; 10], &[0u8; 16], b"", Padding::None).is_err());
    }

    #[test]
    fn test_hmac_known_vector() {
        // RFC 4231 test case 2
        let mac = hmac(
            MacAlgorithm::HmacSha256,
            b"Jefe",
            &[b"what do ya want ".as_slice(), b"for nothing?".as_slice()],
        )
        .unwrap();
        assert_eq!(
            bytes_to_hex(&mac),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
        assert_eq!(hmac(MacAlgorithm::HmacSha1, b"k", &[b"x".as_slice()]).unwrap().len(), 20);
    }

    #[test]
    fn test_hex_conversion() {
        let bytes = [0xDE, 0xAD, 0xBE, 0xEF];
        let hex = bytes_to_hex(&bytes);
        assert_eq!(hex, "deadbeef");

        let back = hex_to_bytes(&hex).unwrap();
        assert_eq!(back, bytes);
        assert_eq!(hex_to_bytes("abc"), None);
        assert_eq!(hex_to_bytes("zz"), None);
    }
}
