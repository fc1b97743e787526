//! Stored password protection.
//!
//! A password of the form
//! `ENCRYPTED_PASSWORD(file:KeyFile,file:PassFile)` names two Java
//! properties files: one holding the encryption and MAC keys, the other the
//! encrypted password with its IV and MAC. The MAC is checked before
//! decryption (encrypt-then-MAC).
//!
//! # Example
//!
//! ```no_run
//! use teradatasql_rs::password::{encrypt_password_files, EncryptOptions};
//!
//! # async fn run() -> teradatasql_rs::Result<()> {
//! let opts = EncryptOptions::new("AES/CBC/NoPadding", 256, "HmacSHA256")?;
//! encrypt_password_files(&opts, "PassKey.properties", "EncPass.properties", "please").await?;
//! // password: "ENCRYPTED_PASSWORD(file:PassKey.properties,file:EncPass.properties)"
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::protocol::crypto::{
    bytes_to_hex, decrypt_cbc, encrypt_cbc, hex_to_bytes, hmac, random_bytes, MacAlgorithm,
    Padding, AES_BLOCK_SIZE,
};

pub const ENCRYPTED_PASSWORD_PREFIX: &str = "ENCRYPTED_PASSWORD(";
const FILE_PREFIX: &str = "file:";
const PROPERTIES_VERSION: &str = "1";
const PLAINTEXT_BOUNDARY: usize = 512;
const MAC_KEY_SIZE: usize = 64;
/// DER tag of an octet string.
const DER_OCTET_STRING: u8 = 0x04;

/// A parsed `Algorithm/Mode/Padding` transformation.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Transformation {
    text: String,
    algorithm: String,
    padding: Padding,
}

impl Transformation {
    fn parse(text: &str) -> Result<Self> {
        let parts: Vec<&str> = text.split('/').collect();
        let [algorithm, mode, padding] = parts.as_slice() else {
            return Err(Error::encrypted_password(format!(
                "Invalid transformation: {}",
                text
            )));
        };
        if *algorithm != "AES" || *mode != "CBC" {
            return Err(Error::encrypted_password(format!(
                "Unsupported transformation: {}",
                text
            )));
        }
        let padding = match *padding {
            "NoPadding" => Padding::None,
            "PKCS5Padding" => Padding::Pkcs5,
            other => {
                return Err(Error::encrypted_password(format!(
                    "Unknown padding {}",
                    other
                )))
            }
        };
        Ok(Self {
            text: text.to_string(),
            algorithm: algorithm.to_string(),
            padding,
        })
    }
}

/// Settings for [`encrypt_password_files`].
#[derive(Debug, Clone)]
pub struct EncryptOptions {
    transformation: Transformation,
    key_size_bits: u32,
    mac: MacAlgorithm,
}

impl EncryptOptions {
    /// Validate a transformation (`AES/CBC/NoPadding` or
    /// `AES/CBC/PKCS5Padding`), key size (128, 192 or 256) and MAC name
    /// (`HmacSHA1` or `HmacSHA256`).
    pub fn new(transformation: &str, key_size_bits: u32, mac: &str) -> Result<Self> {
        let transformation = Transformation::parse(transformation)?;
        if ![128, 192, 256].contains(&key_size_bits) {
            return Err(Error::encrypted_password(format!(
                "Unsupported key size {} for {}",
                key_size_bits, transformation.algorithm
            )));
        }
        let mac = MacAlgorithm::parse(mac)
            .ok_or_else(|| Error::encrypted_password(format!("Unknown MAC algorithm {}", mac)))?;
        Ok(Self {
            transformation,
            key_size_bits,
            mac,
        })
    }
}

/// Java properties file contents (`key=value` lines, `#`/`!` comments).
#[derive(Debug, Default)]
struct Properties {
    path: PathBuf,
    values: HashMap<String, String>,
}

impl Properties {
    /// Parse ISO-8859-1 text.
    fn parse(path: &Path, bytes: &[u8]) -> Self {
        let text: String = bytes.iter().map(|b| *b as char).collect();
        let values = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('!'))
            .filter_map(|line| line.split_once('='))
            .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
            .collect();
        Self {
            path: path.to_path_buf(),
            values,
        }
    }

    async fn load(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        Ok(Self::parse(path, &bytes))
    }

    fn get(&self, key: &str) -> Result<&str> {
        self.values.get(key).map(String::as_str).ok_or_else(|| {
            Error::encrypted_password(format!(
                "Missing {} in file {}",
                key,
                self.path.display()
            ))
        })
    }

    fn hex(&self, key: &str) -> Result<Vec<u8>> {
        hex_to_bytes(self.get(key)?).ok_or_else(|| {
            Error::encrypted_password(format!(
                "Invalid hex digits for {} in file {}",
                key,
                self.path.display()
            ))
        })
    }

    fn check_version(&self) -> Result<()> {
        let version = self.get("version")?;
        if version != PROPERTIES_VERSION {
            return Err(Error::encrypted_password(format!(
                "Unrecognized version {} in file {}",
                version,
                self.path.display()
            )));
        }
        Ok(())
    }
}

/// Split `ENCRYPTED_PASSWORD(file:A,file:B)` into its two paths.
pub fn parse_encrypted_reference(text: &str) -> Result<(PathBuf, PathBuf)> {
    let inner = text
        .strip_prefix(ENCRYPTED_PASSWORD_PREFIX)
        .and_then(|rest| rest.strip_suffix(')'))
        .ok_or_else(|| Error::encrypted_password(format!("Invalid encrypted password {}", text)))?;
    let (key, pass) = inner.split_once(',').ok_or_else(|| {
        Error::encrypted_password("ENCRYPTED_PASSWORD requires two comma-separated file names")
    })?;
    let strip = |s: &str| -> Result<PathBuf> {
        s.strip_prefix(FILE_PREFIX)
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .ok_or_else(|| {
                Error::encrypted_password(format!("File name must begin with {}: {}", FILE_PREFIX, s))
            })
    };
    Ok((strip(key)?, strip(pass)?))
}

/// Decrypt the password stored in a key file / password file pair.
pub async fn decrypt_password(key_file: &Path, pass_file: &Path) -> Result<String> {
    let key_props = Properties::load(key_file).await?;
    let pass_props = Properties::load(pass_file).await?;

    key_props.check_version()?;
    pass_props.check_version()?;
    if key_props.get("match")? != pass_props.get("match")? {
        return Err(Error::encrypted_password(format!(
            "Match value differs between files {} and {}",
            key_file.display(),
            pass_file.display()
        )));
    }

    let transformation = Transformation::parse(key_props.get("transformation")?)?;
    if key_props.get("algorithm")? != transformation.algorithm {
        return Err(Error::encrypted_password(format!(
            "Algorithm differs from transformation in file {}",
            key_file.display()
        )));
    }
    let mac_name = key_props.get("mac")?;
    let mac = MacAlgorithm::parse(mac_name).ok_or_else(|| {
        Error::encrypted_password(format!(
            "Unknown MAC algorithm {} in file {}",
            mac_name,
            key_file.display()
        ))
    })?;
    let key = key_props.hex("key")?;
    let mac_key = key_props.hex("mackey")?;
    let ciphertext = pass_props.hex("password")?;
    let params = pass_props.hex("params")?;
    let expected = pass_props.hex("hash")?;

    let actual = hmac(
        mac,
        &mac_key,
        &[ciphertext.as_slice(), transformation.text.as_bytes(), params.as_slice()],
    )?;
    if actual != expected {
        return Err(Error::encrypted_password(format!(
            "Hash mismatch indicates possible tampering with file {} or {}",
            key_file.display(),
            pass_file.display()
        )));
    }

    let iv = match params.as_slice() {
        [DER_OCTET_STRING, len, rest @ ..] if rest.len() >= *len as usize => &rest[..*len as usize],
        _ => {
            return Err(Error::encrypted_password(format!(
                "Invalid params in file {}",
                pass_file.display()
            )))
        }
    };
    let plaintext = decrypt_cbc(&key, iv, &ciphertext, transformation.padding)?;
    let end = plaintext.iter().position(|b| *b == 0).unwrap_or(plaintext.len());
    String::from_utf8(plaintext[..end].to_vec()).map_err(|_| {
        Error::encrypted_password(format!(
            "Decrypted password from {} is not valid UTF-8",
            pass_file.display()
        ))
    })
}

/// Replace every `ENCRYPTED_PASSWORD(...)` in `text` with the decrypted
/// password. Text without the prefix is returned unchanged.
pub async fn resolve_password(text: &str) -> Result<String> {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find(ENCRYPTED_PASSWORD_PREFIX) {
        let end = rest[start..]
            .find(')')
            .map(|i| start + i)
            .ok_or_else(|| Error::encrypted_password("Unterminated ENCRYPTED_PASSWORD("))?;
        let (key_file, pass_file) = parse_encrypted_reference(&rest[start..=end])?;
        out.push_str(&rest[..start]);
        out.push_str(&decrypt_password(&key_file, &pass_file).await?);
        rest = &rest[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Encrypt `password` and write the key file and the password file.
///
/// Existing files are overwritten.
pub async fn encrypt_password_files(
    opts: &EncryptOptions,
    key_file: impl AsRef<Path>,
    pass_file: impl AsRef<Path>,
    password: &str,
) -> Result<()> {
    if password.is_empty() {
        return Err(Error::encrypted_password("Password cannot be zero length"));
    }
    let match_value = chrono::Utc::now().timestamp_millis().to_string();
    let key = random_bytes(opts.key_size_bits as usize / 8);
    let mac_key = random_bytes(MAC_KEY_SIZE);
    let iv = random_bytes(AES_BLOCK_SIZE);

    let mut params = vec![DER_OCTET_STRING, iv.len() as u8];
    params.extend_from_slice(&iv);

    // zero-extend to the next 512-byte boundary to hide the length
    let mut plaintext = password.as_bytes().to_vec();
    plaintext.resize((plaintext.len() / PLAINTEXT_BOUNDARY + 1) * PLAINTEXT_BOUNDARY, 0);
    let ciphertext = encrypt_cbc(&key, &iv, &plaintext, opts.transformation.padding)?;
    let hash = hmac(
        opts.mac,
        &mac_key,
        &[ciphertext.as_slice(), opts.transformation.text.as_bytes(), params.as_slice()],
    )?;

    let key_data = format!(
        "# Teradata SQL Driver password encryption key file\n\
         version={}\ntransformation={}\nalgorithm={}\nmatch={}\nkey={}\nmac={}\nmackey={}\n",
        PROPERTIES_VERSION,
        opts.transformation.text,
        opts.transformation.algorithm,
        match_value,
        bytes_to_hex(&key),
        opts.mac.name(),
        bytes_to_hex(&mac_key),
    );
    let pass_data = format!(
        "# Teradata SQL Driver encrypted password file\n\
         version={}\nmatch={}\npassword={}\nparams={}\nhash={}\n",
        PROPERTIES_VERSION,
        match_value,
        bytes_to_hex(&ciphertext),
        bytes_to_hex(&params),
        bytes_to_hex(&hash),
    );
    tokio::fs::write(key_file.as_ref(), key_data).await?;
    tokio::fs::write(pass_file.as_ref(), pass_data).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn temp_pair(tag: &str) -> (PathBuf, PathBuf) {
        let dir = std::env::temp_dir();
        let pid = std::process::id();
        (
            dir.join(format!("tdsql-{}-{}-key.properties", tag, pid)),
            dir.join(format!("tdsql-{}-{}-pass.properties", tag, pid)),
        )
    }

    #[test]
    fn test_parse_reference() {
        let (k, p) =
            parse_encrypted_reference("ENCRYPTED_PASSWORD(file:/a/Key.properties,file:Pass.properties)")
                .unwrap();
        assert_eq!(k, PathBuf::from("/a/Key.properties"));
        assert_eq!(p, PathBuf::from("Pass.properties"));
        assert!(parse_encrypted_reference("ENCRYPTED_PASSWORD(Key,file:Pass)").is_err());
        assert!(parse_encrypted_reference("ENCRYPTED_PASSWORD(file:Key)").is_err());
    }

    #[test]
    fn test_properties_parse() {
        let props = Properties::parse(
            Path::new("x"),
            b"# comment\n! other\nversion=1\nmatch = 42 \r\nnoequals\n",
        );
        assert_eq!(props.get("version").unwrap(), "1");
        assert_eq!(props.get("match").unwrap(), "42");
        assert!(props.get("noequals").is_err());
    }

    #[test]
    fn test_options_validation() {
        assert!(EncryptOptions::new("AES/CBC/NoPadding", 256, "HmacSHA256").is_ok());
        assert!(EncryptOptions::new("AES/CBC/PKCS5Padding", 128, "HmacSHA1").is_ok());
        assert!(EncryptOptions::new("AES/CBC", 128, "HmacSHA1").is_err());
        assert!(EncryptOptions::new("AES/CBC/NoPadding", 64, "HmacSHA1").is_err());
        assert!(EncryptOptions::new("AES/CBC/NoPadding", 128, "HmacMD5").is_err());
    }

    #[tokio::test]
    async fn test_encrypt_then_decrypt() {
        for (i, (transformation, bits, mac)) in [
            ("AES/CBC/NoPadding", 128, "HmacSHA1"),
            ("AES/CBC/NoPadding", 256, "HmacSHA256"),
            ("AES/CBC/PKCS5Padding", 192, "HmacSHA256"),
        ]
        .into_iter()
        .enumerate()
        {
            let (key_file, pass_file) = temp_pair(&format!("roundtrip{}", i));
            let opts = EncryptOptions::new(transformation, bits, mac).unwrap();
            encrypt_password_files(&opts, &key_file, &pass_file, "pässword")
                .await
                .unwrap();

            let reference = format!(
                "ENCRYPTED_PASSWORD(file:{},file:{})",
                key_file.display(),
                pass_file.display()
            );
            assert_eq!(resolve_password(&reference).await.unwrap(), "pässword");
            assert_eq!(
                resolve_password(&format!("authcid=guest password={}", reference))
                    .await
                    .unwrap(),
                "authcid=guest password=pässword"
            );

            tokio::fs::remove_file(&key_file).await.unwrap();
            tokio::fs::remove_file(&pass_file).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_tampering_detected() {
        let (key_file, pass_file) = temp_pair("tamper");
        let opts = EncryptOptions::new("AES/CBC/NoPadding", 128, "HmacSHA256").unwrap();
        encrypt_password_files(&opts, &key_file, &pass_file, "secret")
            .await
            .unwrap();

        let text = tokio::fs::read_to_string(&pass_file).await.unwrap();
        let tampered: String = text
            .lines()
            .map(|line| match line.strip_prefix("password=") {
                Some(hex) => {
                    let flipped = if hex.starts_with('0') { "1" } else { "0" };
                    format!("password={}{}\n", flipped, &hex[1..])
                }
                None => format!("{}\n", line),
            })
            .collect();
        tokio::fs::write(&pass_file, tampered).await.unwrap();

        let err = decrypt_password(&key_file, &pass_file).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Interface);
        assert!(err.to_string().contains("possible tampering"));

        tokio::fs::remove_file(&key_file).await.unwrap();
        tokio::fs::remove_file(&pass_file).await.unwrap();
    }

    #[tokio::test]
    async fn test_plain_password_unchanged() {
        assert_eq!(resolve_password("please").await.unwrap(), "please");
    }
}
