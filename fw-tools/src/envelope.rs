// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Signed and encrypted firmware update, as stored on disk and sent on the
//! wire:
//!
//! ```text
//! signature (256) | version | size | encrypted size | iv (16) | ciphertext
//! ```
//!
//! The plaintext is the firmware followed by the NUL terminated release
//! message, PKCS#7 padded and encrypted with AES-128-CBC. The signature is
//! RSASSA-PKCS1-v1_5 with SHA-256 over everything after it.

use crate::secrets::Secrets;
use aes::Aes128;
use bootloader::crypto::{CryptoProvider, Keys, RustCrypto, Verification};
use cbc::cipher::{block_padding::Pkcs7, BlockEncryptMut, KeyIvInit};
use consts::MAX_ENCRYPTED_SIZE;
use host_protocol::{EnvelopeHeader, CIPHER_BLOCK_SIZE, HEADER_LEN, IV_LEN, SIGNATURE_LEN};
use rsa::Pkcs1v15Sign;
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub signature: [u8; SIGNATURE_LEN],
    pub header: EnvelopeHeader,
    pub iv: [u8; IV_LEN],
    pub ciphertext: Vec<u8>,
}

impl Envelope {
    /// Bytes before the ciphertext.
    pub const PREFIX_LEN: usize = SIGNATURE_LEN + HEADER_LEN + IV_LEN;

    /// Encrypt and sign `firmware` with its release `message`.
    pub fn protect<R: rand::RngCore + rand::CryptoRng>(
        secrets: &Secrets,
        version: u16,
        firmware: &[u8],
        message: &str,
        rng: &mut R,
    ) -> Result<Self, Error> {
        let size = u16::try_from(firmware.len()).map_err(|_| Error::FirmwareTooLarge(firmware.len()))?;
        if message.as_bytes().contains(&0) {
            return Err(Error::MessageContainsNul);
        }

        let mut plaintext = Vec::with_capacity(firmware.len() + message.len() + 1 + CIPHER_BLOCK_SIZE);
        plaintext.extend_from_slice(firmware);
        plaintext.extend_from_slice(message.as_bytes());
        plaintext.push(0);
        let len = plaintext.len();
        // PKCS#7 always adds between 1 and 16 bytes
        let padded = len + CIPHER_BLOCK_SIZE - len % CIPHER_BLOCK_SIZE;
        if padded > MAX_ENCRYPTED_SIZE {
            return Err(Error::PayloadTooLarge(padded));
        }
        plaintext.resize(padded, 0);

        let mut iv = [0; IV_LEN];
        rng.fill_bytes(&mut iv);
        let ciphertext = cbc::Encryptor::<Aes128>::new(&secrets.aes_key.into(), &iv.into())
            .encrypt_padded_mut::<Pkcs7>(&mut plaintext, len)
            .map_err(|_| Error::PayloadTooLarge(padded))?
            .to_vec();

        let mut envelope = Self {
            signature: [0; SIGNATURE_LEN],
            header: EnvelopeHeader {
                version,
                size,
                // Bounded by MAX_ENCRYPTED_SIZE above
                encrypted_size: ciphertext.len() as u16,
            },
            iv,
            ciphertext,
        };
        let hashed = Sha256::digest(envelope.signed_region());
        let signature = secrets
            .signing_key
            .sign(Pkcs1v15Sign::new::<Sha256>(), &hashed)
            .map_err(Error::Sign)?;
        envelope.signature = signature
            .try_into()
            .map_err(|signature: Vec<u8>| Error::SignatureLength(signature.len()))?;
        log::debug!(
            "protected {} bytes of firmware into {} bytes of ciphertext",
            firmware.len(),
            envelope.ciphertext.len()
        );
        Ok(envelope)
    }

    /// Bytes covered by the signature.
    pub fn signed_region(&self) -> Vec<u8> {
        let mut region = Vec::with_capacity(HEADER_LEN + IV_LEN + self.ciphertext.len());
        region.extend_from_slice(&self.header.to_bytes());
        region.extend_from_slice(&self.iv);
        region.extend_from_slice(&self.ciphertext);
        region
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(Self::PREFIX_LEN + self.ciphertext.len());
        bytes.extend_from_slice(&self.signature);
        bytes.extend_from_slice(&self.signed_region());
        bytes
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() < Self::PREFIX_LEN {
            return Err(Error::Truncated(bytes.len()));
        }
        let (signature, rest) = bytes.split_at(SIGNATURE_LEN);
        let (header, rest) = rest.split_at(HEADER_LEN);
        let (iv, ciphertext) = rest.split_at(IV_LEN);
        let header = EnvelopeHeader::from_bytes(header.try_into().expect("split at HEADER_LEN"));
        if ciphertext.len() != usize::from(header.encrypted_size) {
            return Err(Error::LengthMismatch {
                declared: header.encrypted_size,
                actual: ciphertext.len(),
            });
        }
        header.check_bounds().map_err(Error::Bounds)?;
        Ok(Self {
            signature: signature.try_into().expect("split at SIGNATURE_LEN"),
            header,
            iv: iv.try_into().expect("split at IV_LEN"),
            ciphertext: ciphertext.to_vec(),
        })
    }

    /// Check the signature the way the bootloader does.
    pub fn verify(&self, keys: &Keys) -> Verification {
        RustCrypto.verify(&keys.signing, &self.signature, &self.signed_region())
    }
}

#[derive(Debug)]
pub enum Error {
    Bounds(host_protocol::BoundsError),
    FirmwareTooLarge(usize),
    LengthMismatch { declared: u16, actual: usize },
    MessageContainsNul,
    PayloadTooLarge(usize),
    Sign(rsa::Error),
    SignatureLength(usize),
    Truncated(usize),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Bounds(e) => write!(f, "invalid envelope header: {e}"),
            Error::FirmwareTooLarge(len) => {
                write!(f, "firmware of {len} bytes does not fit the {} byte limit", u16::MAX)
            }
            Error::LengthMismatch { declared, actual } => write!(
                f,
                "envelope declares {declared} bytes of ciphertext but carries {actual}"
            ),
            Error::MessageContainsNul => write!(f, "release message must not contain NUL bytes"),
            Error::PayloadTooLarge(len) => write!(
                f,
                "encrypted payload of {len} bytes exceeds the {MAX_ENCRYPTED_SIZE} byte limit"
            ),
            Error::Sign(e) => write!(f, "failed to sign envelope: {e}"),
            Error::SignatureLength(len) => write!(f, "signature of {len} bytes, expected {SIGNATURE_LEN}"),
            Error::Truncated(len) => write!(f, "envelope of {len} bytes is truncated"),
        }
    }
}

impl std::error::Error for Error {}
