// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Installed firmware record.
//!
//! A single flash word at [`METADATA_BASE`]: the version in the low half and
//! the image size in the high half. The release message of the installed
//! image sits right after the image, at `FW_BASE + size`.

use crate::error::FlashError;
use crate::programmer::Programmer;
use consts::{FW_BASE, MAX_RELEASE_MESSAGE, METADATA_BASE, PROVISIONING_MARKER_OFFSET};
use embedded_storage::nor_flash::{NorFlash, ReadNorFlash};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Metadata {
    pub version: u16,
    pub size: u16,
}

impl Metadata {
    pub const fn from_word(word: u32) -> Self {
        Self {
            version: word as u16,
            size: (word >> 16) as u16,
        }
    }

    pub const fn to_word(self) -> u32 {
        (self.size as u32) << 16 | self.version as u32
    }

    pub fn load<F: NorFlash>(programmer: &mut Programmer<F>) -> Result<Self, FlashError> {
        programmer.read_word(METADATA_BASE).map(Self::from_word)
    }

    /// Erase the metadata page and program the record as its only word.
    pub fn store<F: NorFlash>(self, programmer: &mut Programmer<F>) -> Result<(), FlashError> {
        debug!("metadata: version {} size {}", self.version, self.size);
        programmer.program_page(METADATA_BASE, &self.to_word().to_le_bytes())
    }
}

/// Whether the factory image still has to be installed.
///
/// The marker word reads zero only on a part whose metadata page was never
/// programmed: any metadata write erases the page and leaves it at `0xFF`.
pub fn needs_provisioning<F: NorFlash>(programmer: &mut Programmer<F>) -> Result<bool, FlashError> {
    Ok(programmer.read_word(METADATA_BASE + PROVISIONING_MARKER_OFFSET)? == 0)
}

/// Copy the release message stored after an image of `size` bytes into
/// `buf` and return it.
///
/// The message ends at the first NUL or erased byte, at the end of `buf`
/// (at most [`MAX_RELEASE_MESSAGE`]) or at the end of the flash, whichever
/// comes first.
pub fn release_message<'a, F: NorFlash>(
    programmer: &mut Programmer<F>,
    size: u16,
    buf: &'a mut [u8],
) -> Result<&'a [u8], FlashError> {
    let address = FW_BASE + u32::from(size);
    let in_flash = programmer.flash().capacity().saturating_sub(address as usize);
    let len = buf.len().min(MAX_RELEASE_MESSAGE).min(in_flash);
    programmer.read(address, &mut buf[..len])?;
    let end = buf[..len]
        .iter()
        .position(|&b| b == 0 || b == 0xFF)
        .unwrap_or(len);
    Ok(&buf[..end])
}
