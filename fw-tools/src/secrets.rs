// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Key material shared by the signing host and the bootloader build.
//!
//! `keygen` writes three files into one directory:
//!
//! * `signing_key.pem`: RSA-2048 private key, PKCS#8
//! * `secrets.toml`: the AES key in hex and the path of the signing key
//! * `bootloader_keys.bin`: what the bootloader embeds, see
//!   [`bootloader::crypto::KEY_BLOB_LEN`]

use bootloader::crypto::{Keys, PublicKey, AES_KEY_LEN, EXPONENT_LEN, MODULUS_LEN};
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::RsaPrivateKey;
use std::path::{Path, PathBuf};

pub const SECRETS_FILE: &str = "secrets.toml";
pub const SIGNING_KEY_FILE: &str = "signing_key.pem";
pub const DEVICE_KEYS_FILE: &str = "bootloader_keys.bin";

const RSA_BITS: usize = 2048;

/// On-disk form of `secrets.toml`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct SecretsFile {
    aes_key: String,
    /// Relative paths are resolved against the directory of `secrets.toml`
    signing_key: PathBuf,
}

#[derive(Clone)]
pub struct Secrets {
    pub aes_key: [u8; AES_KEY_LEN],
    pub signing_key: RsaPrivateKey,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets").finish_non_exhaustive()
    }
}

impl Secrets {
    pub fn generate<R: rand::RngCore + rand::CryptoRng>(rng: &mut R) -> Result<Self, Error> {
        let mut aes_key = [0; AES_KEY_LEN];
        rng.fill_bytes(&mut aes_key);
        let signing_key = RsaPrivateKey::new(rng, RSA_BITS).map_err(Error::Rsa)?;
        Ok(Self { aes_key, signing_key })
    }

    /// Write the three key files into `dir`, refusing to overwrite any.
    pub fn write(&self, dir: &Path) -> Result<(), Error> {
        for name in [SECRETS_FILE, SIGNING_KEY_FILE, DEVICE_KEYS_FILE] {
            let path = dir.join(name);
            if path.exists() {
                return Err(Error::AlreadyExists(path));
            }
        }

        let pem = self
            .signing_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(Error::EncodePem)?;
        std::fs::write(dir.join(SIGNING_KEY_FILE), pem.as_bytes()).map_err(Error::Write)?;

        let file = SecretsFile {
            aes_key: hex::encode(self.aes_key),
            signing_key: PathBuf::from(SIGNING_KEY_FILE),
        };
        let toml = toml::to_string(&file).map_err(Error::EncodeToml)?;
        std::fs::write(dir.join(SECRETS_FILE), toml).map_err(Error::Write)?;

        std::fs::write(dir.join(DEVICE_KEYS_FILE), self.device_keys()?.to_blob()).map_err(Error::Write)?;
        log::info!("wrote key material to {}", dir.display());
        Ok(())
    }

    /// Load `secrets.toml` and the signing key it points to.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path).map_err(Error::Read)?;
        let file: SecretsFile = toml::from_str(&text).map_err(Error::DecodeToml)?;

        let aes_key = hex::decode(&file.aes_key)
            .ok()
            .and_then(|key| <[u8; AES_KEY_LEN]>::try_from(key).ok())
            .ok_or(Error::InvalidAesKey)?;

        let key_path = match path.parent() {
            Some(dir) if file.signing_key.is_relative() => dir.join(&file.signing_key),
            _ => file.signing_key,
        };
        let pem = std::fs::read_to_string(&key_path).map_err(Error::Read)?;
        let signing_key = RsaPrivateKey::from_pkcs8_pem(&pem).map_err(Error::DecodePem)?;
        if signing_key.size() != MODULUS_LEN {
            return Err(Error::UnsupportedKeySize(signing_key.size() * 8));
        }
        Ok(Self { aes_key, signing_key })
    }

    /// The keys as the bootloader sees them.
    pub fn device_keys(&self) -> Result<Keys, Error> {
        let n = self.signing_key.n().to_bytes_be();
        let e = self.signing_key.e().to_bytes_be();
        if n.len() != MODULUS_LEN {
            return Err(Error::UnsupportedKeySize(n.len() * 8));
        }
        if e.len() > EXPONENT_LEN {
            return Err(Error::UnsupportedExponent);
        }
        let mut signing = PublicKey {
            modulus: [0; MODULUS_LEN],
            exponent: [0; EXPONENT_LEN],
        };
        signing.modulus.copy_from_slice(&n);
        signing.exponent[EXPONENT_LEN - e.len()..].copy_from_slice(&e);
        Ok(Keys {
            aes: self.aes_key,
            signing,
        })
    }
}

#[derive(Debug)]
pub enum Error {
    AlreadyExists(PathBuf),
    DecodePem(rsa::pkcs8::Error),
    DecodeToml(toml::de::Error),
    EncodePem(rsa::pkcs8::Error),
    EncodeToml(toml::ser::Error),
    InvalidAesKey,
    Read(std::io::Error),
    Rsa(rsa::Error),
    UnsupportedExponent,
    UnsupportedKeySize(usize),
    Write(std::io::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::AlreadyExists(path) => write!(f, "refusing to overwrite {}", path.display()),
            Error::DecodePem(e) => write!(f, "invalid signing key: {e}"),
            Error::DecodeToml(e) => write!(f, "secrets file format error in TOML: {e}"),
            Error::EncodePem(e) => write!(f, "failed to encode signing key: {e}"),
            Error::EncodeToml(e) => write!(f, "failed to encode secrets file: {e}"),
            Error::InvalidAesKey => write!(f, "aes_key must be {AES_KEY_LEN} bytes of hex"),
            Error::Read(e) => write!(f, "failed to read key material: {e}"),
            Error::Rsa(e) => write!(f, "failed to generate signing key: {e}"),
            Error::UnsupportedExponent => write!(f, "public exponent longer than {EXPONENT_LEN} bytes"),
            Error::UnsupportedKeySize(bits) => write!(f, "{bits} bit signing key, expected {RSA_BITS}"),
            Error::Write(e) => write!(f, "failed to write key material: {e}"),
        }
    }
}

impl std::error::Error for Error {}
