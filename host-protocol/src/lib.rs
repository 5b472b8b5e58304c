// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Host to bootloader update protocol.
//! The host pushes a signed and encrypted firmware envelope over a
//! point-to-point serial link and the bootloader answers every stage with a
//! single status byte.
//!
//! Wire layout of an update, after the `'U'` command byte:
//!
//! ```text
//! signature (256) | version (2, LE) | size (2, LE) | encrypted size (2, LE) | iv (16)
//! | { frame length (2, BE) | payload } ... | 0x0000
//! ```

#![no_std]

use consts::MAX_ENCRYPTED_SIZE;

/// Length of the RSA-2048 signature that opens every update.
pub const SIGNATURE_LEN: usize = 256;

/// Length of the envelope header (version, size, encrypted size).
pub const HEADER_LEN: usize = 6;

/// Length of the AES-CBC initialization vector.
pub const IV_LEN: usize = 16;

/// Cipher block size, the ciphertext length must be a multiple of it.
pub const CIPHER_BLOCK_SIZE: usize = 16;

/// Bytes of the signed region that precede the ciphertext.
pub const SIGNED_PREFIX_LEN: usize = HEADER_LEN + IV_LEN;

/// Capacity needed to hold the whole signed region of the largest update.
pub const PENDING_CAPACITY: usize = SIGNED_PREFIX_LEN + MAX_ENCRYPTED_SIZE;

/// Length of a frame header.
pub const FRAME_HEADER_LEN: usize = 2;

/// Commands the host can send while the bootloader waits for instructions.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Command {
    /// Receive, authenticate and install a new firmware
    Update = b'U',
    /// Print the release message and jump to the installed firmware
    Boot = b'B',
}

impl Command {
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Command {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            b'U' => Ok(Command::Update),
            b'B' => Ok(Command::Boot),
            other => Err(other),
        }
    }
}

/// Status byte sent by the bootloader after every stage.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Status {
    /// Stage accepted, the host may send the next one
    Ok = 0x00,
    /// Stage rejected, the bootloader is about to reset
    Error = 0x01,
}

impl Status {
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Status {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, u8> {
        match byte {
            0x00 => Ok(Status::Ok),
            0x01 => Ok(Status::Error),
            other => Err(other),
        }
    }
}

/// Plaintext header of an update envelope.
///
/// The fields travel little-endian and are covered by the signature exactly
/// as they appear on the wire.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EnvelopeHeader {
    /// Firmware version, 0 marks a debug build
    pub version: u16,
    /// Length of the firmware image once decrypted
    pub size: u16,
    /// Length of the ciphertext that follows the IV
    pub encrypted_size: u16,
}

impl EnvelopeHeader {
    /// Version reserved for debug builds, it never advances the stored version.
    pub const DEBUG_VERSION: u16 = 0;

    pub fn from_bytes(bytes: [u8; HEADER_LEN]) -> Self {
        Self {
            version: u16::from_le_bytes([bytes[0], bytes[1]]),
            size: u16::from_le_bytes([bytes[2], bytes[3]]),
            encrypted_size: u16::from_le_bytes([bytes[4], bytes[5]]),
        }
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut bytes = [0; HEADER_LEN];
        bytes[..2].copy_from_slice(&self.version.to_le_bytes());
        bytes[2..4].copy_from_slice(&self.size.to_le_bytes());
        bytes[4..].copy_from_slice(&self.encrypted_size.to_le_bytes());
        bytes
    }

    pub fn is_debug(&self) -> bool {
        self.version == Self::DEBUG_VERSION
    }

    /// Total number of bytes of the signed region (header, IV, ciphertext).
    pub fn signed_len(&self) -> usize {
        SIGNED_PREFIX_LEN + usize::from(self.encrypted_size)
    }

    /// Check the declared lengths against what the bootloader can hold.
    pub fn check_bounds(&self) -> Result<(), BoundsError> {
        let encrypted_size = usize::from(self.encrypted_size);
        if encrypted_size > MAX_ENCRYPTED_SIZE {
            return Err(BoundsError::TooLarge {
                encrypted_size: self.encrypted_size,
            });
        }
        if encrypted_size % CIPHER_BLOCK_SIZE != 0 {
            return Err(BoundsError::Unaligned {
                encrypted_size: self.encrypted_size,
            });
        }
        if self.size > self.encrypted_size {
            return Err(BoundsError::SizeExceedsPayload {
                size: self.size,
                encrypted_size: self.encrypted_size,
            });
        }
        Ok(())
    }
}

/// Reasons a header is refused before any payload is accepted.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BoundsError {
    /// Ciphertext larger than the update buffer
    TooLarge { encrypted_size: u16 },
    /// Ciphertext not a whole number of cipher blocks
    Unaligned { encrypted_size: u16 },
    /// Plaintext image longer than the payload carrying it
    SizeExceedsPayload { size: u16, encrypted_size: u16 },
}

impl core::fmt::Display for BoundsError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::TooLarge { encrypted_size } => {
                write!(f, "encrypted size {encrypted_size} exceeds {MAX_ENCRYPTED_SIZE}")
            }
            Self::Unaligned { encrypted_size } => write!(
                f,
                "encrypted size {encrypted_size} is not a multiple of {CIPHER_BLOCK_SIZE}"
            ),
            Self::SizeExceedsPayload {
                size,
                encrypted_size,
            } => write!(f, "firmware size {size} exceeds encrypted size {encrypted_size}"),
        }
    }
}

/// Decode a frame header. Frame lengths travel big-endian.
pub fn frame_len(header: [u8; FRAME_HEADER_LEN]) -> u16 {
    u16::from_be_bytes(header)
}

/// Encode a frame header.
pub fn frame_header(len: u16) -> [u8; FRAME_HEADER_LEN] {
    len.to_be_bytes()
}

/// The zero-length frame closing the payload stream.
pub const TERMINATOR: [u8; FRAME_HEADER_LEN] = [0, 0];
