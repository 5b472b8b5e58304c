// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Receive, authenticate and install one firmware update.
//!
//! The host drives the exchange and the bootloader answers each stage with a
//! single status byte. Nothing is decrypted or written to the firmware area
//! before the whole signed region has been received and its signature
//! checked. Every failure is final: the session reports it, and the caller
//! resets the device.

use crate::buffer::PendingBuffer;
use crate::crypto::{CryptoProvider, Keys, Verification};
use crate::error::{Abort, ProtocolViolation, TransportFault};
use crate::metadata::Metadata;
use crate::programmer::Programmer;
use consts::FW_BASE;
use embedded_io::{Read, Write};
use embedded_storage::nor_flash::NorFlash;
use host_protocol::{
    frame_len, EnvelopeHeader, Status, FRAME_HEADER_LEN, HEADER_LEN, IV_LEN, SIGNATURE_LEN, SIGNED_PREFIX_LEN,
};

/// Where the session is in the exchange.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    AwaitSignature,
    AwaitVersion,
    AwaitSize,
    AwaitEncryptedSize,
    ValidateSizeBound,
    CheckVersion,
    AwaitIv,
    AccumulateFrames,
    AwaitTerminator,
    Verify,
    Decrypt,
    Commit,
    Done,
}

impl State {
    pub fn name(&self) -> &'static str {
        match self {
            Self::AwaitSignature => "await signature",
            Self::AwaitVersion => "await version",
            Self::AwaitSize => "await size",
            Self::AwaitEncryptedSize => "await encrypted size",
            Self::ValidateSizeBound => "validate size bound",
            Self::CheckVersion => "check version",
            Self::AwaitIv => "await iv",
            Self::AccumulateFrames => "accumulate frames",
            Self::AwaitTerminator => "await terminator",
            Self::Verify => "verify",
            Self::Decrypt => "decrypt",
            Self::Commit => "commit",
            Self::Done => "done",
        }
    }
}

/// What a successful session left in flash.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Installed {
    /// Version recorded in the metadata, the previous one for debug builds
    pub version: u16,
    /// Length of the firmware image
    pub size: u16,
    /// Flash pages programmed with the decrypted payload
    pub pages: usize,
    pub debug_build: bool,
}

pub struct UpdateSession<'a, F, C> {
    programmer: &'a mut Programmer<F>,
    crypto: &'a C,
    keys: &'a Keys,
    buffer: &'a mut PendingBuffer,
    state: State,
    signature: [u8; SIGNATURE_LEN],
    header: EnvelopeHeader,
    recorded_version: u16,
    pages: usize,
}

impl<'a, F: NorFlash, C: CryptoProvider> UpdateSession<'a, F, C> {
    pub fn new(programmer: &'a mut Programmer<F>, crypto: &'a C, keys: &'a Keys, buffer: &'a mut PendingBuffer) -> Self {
        buffer.clear();
        Self {
            programmer,
            crypto,
            keys,
            buffer,
            state: State::AwaitSignature,
            signature: [0; SIGNATURE_LEN],
            header: EnvelopeHeader {
                version: 0,
                size: 0,
                encrypted_size: 0,
            },
            recorded_version: 0,
            pages: 0,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Run the exchange to completion over `link`.
    ///
    /// On failure the host is sent an error status when the link still works,
    /// and the reason is returned for the caller to log and reset on.
    pub fn run<L: Read + Write>(&mut self, link: &mut L) -> Result<Installed, Abort> {
        loop {
            match self.step(link) {
                Ok(State::Done) => {
                    self.state = State::Done;
                    let installed = Installed {
                        version: self.recorded_version,
                        size: self.header.size,
                        pages: self.pages,
                        debug_build: self.header.is_debug(),
                    };
                    info!(
                        "update installed: version {} size {} ({} pages)",
                        installed.version,
                        installed.size,
                        installed.pages
                    );
                    return Ok(installed);
                }
                Ok(next) => {
                    debug!("update: {} -> {}", self.state.name(), next.name());
                    self.state = next;
                }
                Err(abort) => {
                    error!("update aborted in {}: {}", self.state.name(), abort);
                    if abort.reports_status() {
                        // The link may be what failed, the reset follows anyway
                        let _ = send(link, Status::Error);
                    }
                    return Err(abort);
                }
            }
        }
    }

    fn step<L: Read + Write>(&mut self, link: &mut L) -> Result<State, Abort> {
        match self.state {
            State::AwaitSignature => {
                link.read_exact(&mut self.signature).map_err(TransportFault::from)?;
                send(link, Status::Ok)?;
                Ok(State::AwaitVersion)
            }
            State::AwaitVersion => {
                self.buffer.fill_from(link, 2)?;
                Ok(State::AwaitSize)
            }
            State::AwaitSize => {
                self.buffer.fill_from(link, 2)?;
                Ok(State::AwaitEncryptedSize)
            }
            State::AwaitEncryptedSize => {
                self.buffer.fill_from(link, 2)?;
                let mut header = [0; HEADER_LEN];
                header.copy_from_slice(&self.buffer.as_slice()[..HEADER_LEN]);
                self.header = EnvelopeHeader::from_bytes(header);
                info!(
                    "update: version {} size {} encrypted size {}",
                    self.header.version,
                    self.header.size,
                    self.header.encrypted_size
                );
                Ok(State::ValidateSizeBound)
            }
            State::ValidateSizeBound => {
                self.header.check_bounds()?;
                Ok(State::CheckVersion)
            }
            State::CheckVersion => {
                let installed = Metadata::load(self.programmer)?.version;
                if self.header.is_debug() {
                    warn!("debug build, keeping version {}", installed);
                    self.recorded_version = installed;
                } else if self.header.version <= installed {
                    return Err(Abort::RollbackAttempt {
                        received: self.header.version,
                        installed,
                    });
                } else {
                    self.recorded_version = self.header.version;
                }
                #[cfg(not(feature = "deferred-metadata"))]
                self.record_metadata()?;
                send(link, Status::Ok)?;
                Ok(State::AwaitIv)
            }
            State::AwaitIv => {
                self.buffer.fill_from(link, IV_LEN)?;
                send(link, Status::Ok)?;
                Ok(self.after_payload_bytes())
            }
            State::AccumulateFrames => {
                let declared = read_frame_len(link)?;
                let expected = usize::from(self.header.encrypted_size);
                let received = self.buffer.len() - SIGNED_PREFIX_LEN;
                if declared == 0 {
                    return Err(ProtocolViolation::EarlyTerminator { received, expected }.into());
                }
                let remaining = expected - received;
                if usize::from(declared) > remaining {
                    return Err(ProtocolViolation::FrameOverflow {
                        declared: usize::from(declared),
                        remaining,
                    }
                    .into());
                }
                self.buffer.fill_from(link, usize::from(declared))?;
                send(link, Status::Ok)?;
                Ok(self.after_payload_bytes())
            }
            State::AwaitTerminator => {
                let declared = read_frame_len(link)?;
                if declared != 0 {
                    return Err(ProtocolViolation::TrailingData { declared }.into());
                }
                send(link, Status::Ok)?;
                Ok(State::Verify)
            }
            State::Verify => {
                let verification = self
                    .crypto
                    .verify(&self.keys.signing, &self.signature, self.buffer.as_slice());
                check_authentic(verification)?;
                info!("update: signature verified");
                Ok(State::Decrypt)
            }
            State::Decrypt => {
                let (prefix, ciphertext) = self.buffer.as_mut_slice().split_at_mut(SIGNED_PREFIX_LEN);
                let mut iv = [0; IV_LEN];
                iv.copy_from_slice(&prefix[HEADER_LEN..]);
                self.crypto
                    .decrypt_in_place(&self.keys.aes, &iv, ciphertext)
                    .map_err(|_| Abort::CryptoInputError)?;
                Ok(State::Commit)
            }
            State::Commit => {
                self.pages = self
                    .programmer
                    .commit(FW_BASE, &self.buffer.as_slice()[SIGNED_PREFIX_LEN..])?;
                #[cfg(feature = "deferred-metadata")]
                self.record_metadata()?;
                send(link, Status::Ok)?;
                Ok(State::Done)
            }
            State::Done => Ok(State::Done),
        }
    }

    fn after_payload_bytes(&self) -> State {
        if self.buffer.len() == self.header.signed_len() {
            State::AwaitTerminator
        } else {
            State::AccumulateFrames
        }
    }

    fn record_metadata(&mut self) -> Result<(), Abort> {
        Metadata {
            version: self.recorded_version,
            size: self.header.size,
        }
        .store(self.programmer)?;
        Ok(())
    }
}

/// Accept only an authentic result, checked twice through a counter so that
/// a single skipped branch is not enough to get past it.
fn check_authentic(verification: Verification) -> Result<(), Abort> {
    const CF1: u32 = 3;
    const CF2: u32 = 5;
    const CFI_SUCCESS: u32 = CF1 + CF2;
    let mut control_flow_integrity_counter = 0;
    if verification == Verification::Authentic {
        control_flow_integrity_counter += CF1;
        if core::hint::black_box(verification as u32) == Verification::Authentic as u32 {
            control_flow_integrity_counter += CF2;
        }
    }
    if core::hint::black_box(control_flow_integrity_counter) == CFI_SUCCESS {
        return Ok(());
    }
    match verification {
        Verification::MalformedInput => Err(Abort::CryptoInputError),
        _ => Err(Abort::AuthenticationFailure),
    }
}

fn read_frame_len<L: Read>(link: &mut L) -> Result<u16, TransportFault> {
    let mut header = [0; FRAME_HEADER_LEN];
    link.read_exact(&mut header)?;
    Ok(frame_len(header))
}

fn send<L: Write>(link: &mut L, status: Status) -> Result<(), TransportFault> {
    link.write_all(&[status.as_byte()])
        .and_then(|()| link.flush())
        .map_err(|e| TransportFault::Io(embedded_io::Error::kind(&e)))
}
