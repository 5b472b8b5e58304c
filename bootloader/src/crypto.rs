// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Cryptographic primitives the update session relies on.

use core::fmt;
use host_protocol::{IV_LEN, SIGNATURE_LEN};

pub const AES_KEY_LEN: usize = 16;
pub const MODULUS_LEN: usize = SIGNATURE_LEN;
pub const EXPONENT_LEN: usize = 8;

/// Length of the key blob produced by the host tooling and embedded in the
/// bootloader image: `aes key | modulus (BE) | exponent (BE)`.
pub const KEY_BLOB_LEN: usize = AES_KEY_LEN + MODULUS_LEN + EXPONENT_LEN;

/// Outcome of a signature check.
///
/// The discriminants are far apart in Hamming distance so that a glitched
/// comparison cannot turn one into another.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u32)]
pub enum Verification {
    Authentic = 0xcafe_babe,
    Forged = 0xdead_beef,
    /// The key or the signature could not even be interpreted
    MalformedInput = 0x0bad_f00d,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CryptoError {
    /// Buffer length is not a whole number of cipher blocks
    UnalignedLength { len: usize },
}

impl fmt::Display for CryptoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnalignedLength { len } => write!(f, "{len} bytes is not a whole number of blocks"),
        }
    }
}

/// RSA-2048 public key, big-endian.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PublicKey {
    pub modulus: [u8; MODULUS_LEN],
    pub exponent: [u8; EXPONENT_LEN],
}

/// Key material baked into the bootloader.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Keys {
    pub aes: [u8; AES_KEY_LEN],
    pub signing: PublicKey,
}

impl Keys {
    pub fn from_blob(blob: &[u8; KEY_BLOB_LEN]) -> Self {
        let mut keys = Self {
            aes: [0; AES_KEY_LEN],
            signing: PublicKey {
                modulus: [0; MODULUS_LEN],
                exponent: [0; EXPONENT_LEN],
            },
        };
        let (aes, rest) = blob.split_at(AES_KEY_LEN);
        let (modulus, exponent) = rest.split_at(MODULUS_LEN);
        keys.aes.copy_from_slice(aes);
        keys.signing.modulus.copy_from_slice(modulus);
        keys.signing.exponent.copy_from_slice(exponent);
        keys
    }

    pub fn to_blob(&self) -> [u8; KEY_BLOB_LEN] {
        let mut blob = [0; KEY_BLOB_LEN];
        blob[..AES_KEY_LEN].copy_from_slice(&self.aes);
        blob[AES_KEY_LEN..AES_KEY_LEN + MODULUS_LEN].copy_from_slice(&self.signing.modulus);
        blob[AES_KEY_LEN + MODULUS_LEN..].copy_from_slice(&self.signing.exponent);
        blob
    }
}

pub trait CryptoProvider {
    /// Check an RSASSA-PKCS1-v1_5 SHA-256 `signature` over `message`.
    fn verify(&self, key: &PublicKey, signature: &[u8; SIGNATURE_LEN], message: &[u8]) -> Verification;

    /// AES-128-CBC decrypt `data` in place. `data` must be block aligned.
    fn decrypt_in_place(&self, key: &[u8; AES_KEY_LEN], iv: &[u8; IV_LEN], data: &mut [u8]) -> Result<(), CryptoError>;

    /// SHA-256 of `data`.
    fn digest(&self, data: &[u8]) -> [u8; 32];
}

#[cfg(feature = "rustcrypto")]
pub use self::rustcrypto::RustCrypto;

#[cfg(feature = "rustcrypto")]
mod rustcrypto {
    use super::{CryptoError, CryptoProvider, PublicKey, Verification, AES_KEY_LEN};
    use aes::Aes128;
    use cbc::cipher::{block_padding::NoPadding, BlockDecryptMut, KeyIvInit};
    use host_protocol::{CIPHER_BLOCK_SIZE, IV_LEN, SIGNATURE_LEN};
    use rsa::traits::PublicKeyParts;
    use rsa::{BigUint, Pkcs1v15Sign, RsaPublicKey};
    use sha2::{Digest, Sha256};

    /// Software implementation on top of the RustCrypto crates.
    #[derive(Clone, Copy, Debug, Default)]
    pub struct RustCrypto;

    impl CryptoProvider for RustCrypto {
        fn verify(&self, key: &PublicKey, signature: &[u8; SIGNATURE_LEN], message: &[u8]) -> Verification {
            let n = BigUint::from_bytes_be(&key.modulus);
            let e = BigUint::from_bytes_be(&key.exponent);
            let Ok(public) = RsaPublicKey::new(n, e) else {
                return Verification::MalformedInput;
            };
            if public.size() != SIGNATURE_LEN || BigUint::from_bytes_be(signature) >= *public.n() {
                return Verification::MalformedInput;
            }
            let hashed = self.digest(message);
            match public.verify(Pkcs1v15Sign::new::<Sha256>(), &hashed, signature) {
                Ok(()) => Verification::Authentic,
                Err(_) => Verification::Forged,
            }
        }

        fn decrypt_in_place(
            &self,
            key: &[u8; AES_KEY_LEN],
            iv: &[u8; IV_LEN],
            data: &mut [u8],
        ) -> Result<(), CryptoError> {
            let len = data.len();
            if len % CIPHER_BLOCK_SIZE != 0 {
                return Err(CryptoError::UnalignedLength { len });
            }
            cbc::Decryptor::<Aes128>::new(key.into(), iv.into())
                .decrypt_padded_mut::<NoPadding>(data)
                .map(|_| ())
                .map_err(|_| CryptoError::UnalignedLength { len })
        }

        fn digest(&self, data: &[u8]) -> [u8; 32] {
            Sha256::digest(data).into()
        }
    }

}
