// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use core::fmt;
use embedded_storage::nor_flash::{NorFlashError, NorFlashErrorKind};
use host_protocol::BoundsError;

/// Why an update session (or a boot) gave up.
///
/// Every variant is terminal: the caller is expected to reset the device.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Abort {
    /// Malformed framing from the host
    ProtocolViolation(ProtocolViolation),
    /// Encrypted size too large, not block aligned, or smaller than the image
    SizeBoundViolation(BoundsError),
    /// Version not newer than the installed one
    RollbackAttempt { received: u16, installed: u16 },
    /// Signature does not match the envelope
    AuthenticationFailure,
    /// The verifier or the cipher refused its input
    CryptoInputError,
    /// The flash controller reported a failure
    FlashWriteFailure(FlashError),
    /// The serial link broke down
    TransportFailure(TransportFault),
}

impl Abort {
    /// Whether the host is told about this failure with an error status byte.
    ///
    /// Nothing can be sent over a broken link, and flash failures are left to
    /// the caller's reset.
    pub fn reports_status(&self) -> bool {
        !matches!(self, Abort::FlashWriteFailure(_) | Abort::TransportFailure(_))
    }
}

impl fmt::Display for Abort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProtocolViolation(violation) => write!(f, "protocol violation: {violation}"),
            Self::SizeBoundViolation(bounds) => write!(f, "size bound violation: {bounds}"),
            Self::RollbackAttempt {
                received,
                installed,
            } => write!(
                f,
                "rollback attempt: version {received} is not newer than installed {installed}"
            ),
            Self::AuthenticationFailure => write!(f, "signature verification failed"),
            Self::CryptoInputError => write!(f, "malformed input to the crypto provider"),
            Self::FlashWriteFailure(e) => write!(f, "flash write failure: {e}"),
            Self::TransportFailure(e) => write!(f, "transport failure: {e}"),
        }
    }
}

impl From<FlashError> for Abort {
    fn from(e: FlashError) -> Self {
        Abort::FlashWriteFailure(e)
    }
}

impl From<BoundsError> for Abort {
    fn from(e: BoundsError) -> Self {
        Abort::SizeBoundViolation(e)
    }
}

impl From<ProtocolViolation> for Abort {
    fn from(e: ProtocolViolation) -> Self {
        Abort::ProtocolViolation(e)
    }
}

impl From<TransportFault> for Abort {
    fn from(e: TransportFault) -> Self {
        Abort::TransportFailure(e)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProtocolViolation {
    /// Zero-length frame before the declared ciphertext was complete
    EarlyTerminator { received: usize, expected: usize },
    /// Frame longer than what is left of the declared ciphertext
    FrameOverflow { declared: usize, remaining: usize },
    /// Non-zero frame where the terminator was expected
    TrailingData { declared: u16 },
    /// Write past the capacity of the pending update buffer
    BufferOverflow { requested: usize, available: usize },
}

impl fmt::Display for ProtocolViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EarlyTerminator { received, expected } => {
                write!(f, "terminator after {received} of {expected} bytes")
            }
            Self::FrameOverflow {
                declared,
                remaining,
            } => write!(f, "frame of {declared} bytes with only {remaining} left"),
            Self::TrailingData { declared } => {
                write!(f, "frame of {declared} bytes after the declared payload")
            }
            Self::BufferOverflow {
                requested,
                available,
            } => write!(f, "{requested} bytes requested with {available} available"),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportFault {
    /// The peer stopped sending in the middle of a stage
    UnexpectedEof,
    /// The link reported an I/O error
    Io(embedded_io::ErrorKind),
}

impl fmt::Display for TransportFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedEof => write!(f, "unexpected end of stream"),
            Self::Io(kind) => write!(f, "i/o error {kind:?}"),
        }
    }
}

impl<E: embedded_io::Error> From<embedded_io::ReadExactError<E>> for TransportFault {
    fn from(e: embedded_io::ReadExactError<E>) -> Self {
        match e {
            embedded_io::ReadExactError::UnexpectedEof => TransportFault::UnexpectedEof,
            embedded_io::ReadExactError::Other(e) => TransportFault::Io(e.kind()),
        }
    }
}

/// Failure reported by the flash store, with the address it happened at.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FlashError {
    pub address: u32,
    pub kind: NorFlashErrorKind,
}

impl FlashError {
    pub fn new<E: NorFlashError>(address: u32, e: E) -> Self {
        Self {
            address,
            kind: e.kind(),
        }
    }

    fn describe(&self) -> &'static str {
        match self.kind {
            NorFlashErrorKind::NotAligned => "not aligned",
            NorFlashErrorKind::OutOfBounds => "out of bounds",
            _ => "controller error",
        }
    }
}

impl fmt::Display for FlashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {:#010x}", self.describe(), self.address)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for FlashError {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "{=str} at {=u32:#010x}", self.describe(), self.address)
    }
}
