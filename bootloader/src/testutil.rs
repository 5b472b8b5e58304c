// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Test doubles: RAM-backed NOR flash, scripted serial link, fake crypto and
//! an envelope builder signing with a real RSA key.

use crate::crypto::{CryptoError, CryptoProvider, Keys, PublicKey, Verification};
use crate::metadata::Metadata;
use consts::{FLASH_PAGE, METADATA_BASE};
use embedded_storage::nor_flash::{
    check_erase, check_read, check_write, ErrorType, NorFlash, NorFlashErrorKind, ReadNorFlash,
};
use host_protocol::{frame_header, EnvelopeHeader, IV_LEN, SIGNATURE_LEN, TERMINATOR};
use std::vec::Vec;

const FLASH_BYTES: usize = 0x20000;

pub struct MemFlash {
    storage: Vec<u8>,
    erased: Vec<u32>,
    fail_at: Option<u32>,
}

impl MemFlash {
    /// Flash in its erased state.
    pub fn new() -> Self {
        Self::filled(0xFF)
    }

    /// Flash as an emulator presents it before anything was provisioned.
    pub fn blank() -> Self {
        Self::filled(0x00)
    }

    fn filled(value: u8) -> Self {
        Self {
            storage: std::vec![value; FLASH_BYTES],
            erased: Vec::new(),
            fail_at: None,
        }
    }

    /// Flash already holding a metadata record.
    pub fn with_metadata(version: u16, size: u16) -> Self {
        let mut flash = Self::new();
        let start = METADATA_BASE as usize;
        let word = Metadata { version, size }.to_word().to_le_bytes();
        flash.storage[start..start + 4].copy_from_slice(&word);
        flash
    }

    pub fn bytes(&self) -> &[u8] {
        &self.storage
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.storage
    }

    /// Page addresses erased so far, in order.
    pub fn erased_pages(&self) -> &[u32] {
        &self.erased
    }

    /// Make any write covering `address` fail.
    pub fn fail_writes_at(&mut self, address: u32) {
        self.fail_at = Some(address);
    }
}

impl ErrorType for MemFlash {
    type Error = NorFlashErrorKind;
}

impl ReadNorFlash for MemFlash {
    const READ_SIZE: usize = 1;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        check_read(self, offset, bytes.len())?;
        let start = offset as usize;
        bytes.copy_from_slice(&self.storage[start..start + bytes.len()]);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.storage.len()
    }
}

impl NorFlash for MemFlash {
    const WRITE_SIZE: usize = 4;
    const ERASE_SIZE: usize = FLASH_PAGE as usize;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        check_erase(self, from, to)?;
        for page in (from..to).step_by(Self::ERASE_SIZE) {
            self.erased.push(page);
        }
        self.storage[from as usize..to as usize].fill(0xFF);
        Ok(())
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        check_write(self, offset, bytes.len())?;
        if let Some(address) = self.fail_at {
            if (offset..offset + bytes.len() as u32).contains(&address) {
                return Err(NorFlashErrorKind::Other);
            }
        }
        let start = offset as usize;
        // NOR programming can only clear bits
        for (slot, &value) in self.storage[start..start + bytes.len()].iter_mut().zip(bytes) {
            *slot &= value;
        }
        Ok(())
    }
}

/// Serial link replaying a prepared byte script and recording the replies.
pub struct ScriptedLink {
    input: Vec<u8>,
    cursor: usize,
    pub output: Vec<u8>,
}

impl ScriptedLink {
    pub fn new(input: Vec<u8>) -> Self {
        Self {
            input,
            cursor: 0,
            output: Vec::new(),
        }
    }

    /// Number of script bytes the device actually read.
    pub fn consumed(&self) -> usize {
        self.cursor
    }
}

impl embedded_io::ErrorType for ScriptedLink {
    type Error = core::convert::Infallible;
}

impl embedded_io::Read for ScriptedLink {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let n = buf.len().min(self.input.len() - self.cursor);
        buf[..n].copy_from_slice(&self.input[self.cursor..self.cursor + n]);
        self.cursor += n;
        Ok(n)
    }
}

impl embedded_io::Write for ScriptedLink {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.output.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Builder for the host side of the wire protocol.
#[derive(Default)]
pub struct Script {
    bytes: Vec<u8>,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raw(mut self, bytes: &[u8]) -> Self {
        self.bytes.extend_from_slice(bytes);
        self
    }

    pub fn header(self, header: EnvelopeHeader) -> Self {
        self.raw(&header.to_bytes())
    }

    pub fn frame(self, payload: &[u8]) -> Self {
        self.raw(&frame_header(payload.len() as u16)).raw(payload)
    }

    pub fn frames(mut self, payload: &[u8], frame_size: usize) -> Self {
        for chunk in payload.chunks(frame_size) {
            self = self.frame(chunk);
        }
        self
    }

    pub fn terminator(self) -> Self {
        self.raw(&TERMINATOR)
    }

    /// Full update body: signature, header, IV, frames, terminator.
    pub fn update(update: &SignedUpdate, frame_size: usize) -> Self {
        Self::new()
            .raw(&update.signature)
            .header(update.header)
            .raw(&update.iv)
            .frames(&update.ciphertext, frame_size)
            .terminator()
    }

    pub fn build(self) -> Vec<u8> {
        self.bytes
    }
}

/// Crypto provider with a scripted verification outcome. "Decryption" XORs
/// every byte with [`FakeCrypto::MASK`].
pub struct FakeCrypto {
    pub verification: Verification,
}

impl FakeCrypto {
    pub const MASK: u8 = 0x5A;

    pub fn authentic() -> Self {
        Self {
            verification: Verification::Authentic,
        }
    }

    pub fn returning(verification: Verification) -> Self {
        Self { verification }
    }

    pub fn mask(data: &[u8]) -> Vec<u8> {
        data.iter().map(|b| b ^ Self::MASK).collect()
    }
}

impl CryptoProvider for FakeCrypto {
    fn verify(&self, _key: &PublicKey, _signature: &[u8; SIGNATURE_LEN], _message: &[u8]) -> Verification {
        self.verification
    }

    fn decrypt_in_place(&self, _key: &[u8; 16], _iv: &[u8; IV_LEN], data: &mut [u8]) -> Result<(), CryptoError> {
        if data.len() % 16 != 0 {
            return Err(CryptoError::UnalignedLength { len: data.len() });
        }
        data.iter_mut().for_each(|b| *b ^= Self::MASK);
        Ok(())
    }

    fn digest(&self, _data: &[u8]) -> [u8; 32] {
        [0; 32]
    }
}

pub fn fake_keys() -> Keys {
    Keys {
        aes: [0x42; 16],
        signing: PublicKey {
            modulus: [0xC3; 256],
            exponent: [0, 0, 0, 0, 0, 1, 0, 1],
        },
    }
}

/// An update as the host tooling would produce it.
pub struct SignedUpdate {
    pub signature: [u8; SIGNATURE_LEN],
    pub header: EnvelopeHeader,
    pub iv: [u8; IV_LEN],
    pub ciphertext: Vec<u8>,
}

impl SignedUpdate {
    /// Update whose ciphertext is `plaintext` masked for [`FakeCrypto`].
    pub fn fake(version: u16, size: u16, plaintext: &[u8]) -> Self {
        assert_eq!(plaintext.len() % 16, 0);
        Self {
            signature: [0xEE; SIGNATURE_LEN],
            header: EnvelopeHeader {
                version,
                size,
                encrypted_size: plaintext.len() as u16,
            },
            iv: [0x10; IV_LEN],
            ciphertext: FakeCrypto::mask(plaintext),
        }
    }

    /// Signed region as the device sees it.
    pub fn signed_region(&self) -> Vec<u8> {
        let mut region = self.header.to_bytes().to_vec();
        region.extend_from_slice(&self.iv);
        region.extend_from_slice(&self.ciphertext);
        region
    }
}

#[cfg(feature = "rustcrypto")]
pub mod real {
    use super::SignedUpdate;
    use crate::crypto::{Keys, PublicKey};
    use aes::Aes128;
    use cbc::cipher::{block_padding::Pkcs7, BlockEncryptMut, KeyIvInit};
    use host_protocol::{EnvelopeHeader, IV_LEN, SIGNATURE_LEN};
    use rsa::traits::PublicKeyParts;
    use rsa::{Pkcs1v15Sign, RsaPrivateKey};
    use sha2::{Digest, Sha256};
    use std::sync::OnceLock;
    use std::vec::Vec;

    const AES_KEY: [u8; 16] = *b"0123456789abcdef";

    /// One RSA-2048 key per test binary, generation is slow.
    pub fn signing_key() -> &'static RsaPrivateKey {
        static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
        KEY.get_or_init(|| RsaPrivateKey::new(&mut rand::thread_rng(), 2048).expect("generate RSA key"))
    }

    pub fn keys() -> Keys {
        let public = signing_key().to_public_key();
        let mut modulus = [0u8; 256];
        let n = public.n().to_bytes_be();
        modulus[256 - n.len()..].copy_from_slice(&n);
        let mut exponent = [0u8; 8];
        let e = public.e().to_bytes_be();
        exponent[8 - e.len()..].copy_from_slice(&e);
        Keys {
            aes: AES_KEY,
            signing: PublicKey { modulus, exponent },
        }
    }

    pub fn sign(message: &[u8]) -> [u8; SIGNATURE_LEN] {
        let hashed = Sha256::digest(message);
        let signature = signing_key()
            .sign(Pkcs1v15Sign::new::<Sha256>(), &hashed)
            .expect("sign");
        signature.try_into().expect("2048-bit signature")
    }

    /// Encrypt and sign `firmware || message || NUL` the way the host tools do.
    pub fn protect(version: u16, firmware: &[u8], message: &str) -> SignedUpdate {
        let mut plaintext = firmware.to_vec();
        plaintext.extend_from_slice(message.as_bytes());
        plaintext.push(0);
        let len = plaintext.len();
        plaintext.resize(len + 16 - len % 16, 0);
        let iv = [0x24; IV_LEN];
        let ciphertext = cbc::Encryptor::<Aes128>::new(&AES_KEY.into(), &iv.into())
            .encrypt_padded_mut::<Pkcs7>(&mut plaintext, len)
            .expect("buffer has room for padding")
            .to_vec();
        let mut update = SignedUpdate {
            signature: [0; SIGNATURE_LEN],
            header: EnvelopeHeader {
                version,
                size: firmware.len() as u16,
                encrypted_size: ciphertext.len() as u16,
            },
            iv,
            ciphertext,
        };
        update.signature = sign(&update.signed_region());
        update
    }

    /// Plaintext the device should end up committing.
    pub fn padded_plaintext(firmware: &[u8], message: &str) -> Vec<u8> {
        let mut plaintext = firmware.to_vec();
        plaintext.extend_from_slice(message.as_bytes());
        plaintext.push(0);
        let pad = 16 - plaintext.len() % 16;
        plaintext.extend(core::iter::repeat(pad as u8).take(pad));
        plaintext
    }
}
