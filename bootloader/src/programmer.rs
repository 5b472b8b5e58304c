// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Page-wise flash programming.
//!
//! Every page is erased before it is written, and a tail that does not end on
//! a word boundary is padded with zeroes up to the next word. Nothing is read
//! back after writing: a successful return only means the controller did not
//! report an error.

use crate::error::FlashError;
use consts::{FLASH_PAGE, FLASH_WRITE_SIZE};
use embedded_storage::nor_flash::{NorFlash, NorFlashErrorKind};

const PAGE: usize = FLASH_PAGE as usize;
const WORD: usize = FLASH_WRITE_SIZE as usize;

/// Owns the flash and enforces the erase/pad/write discipline on it.
pub struct Programmer<F> {
    flash: F,
}

impl<F: NorFlash> Programmer<F> {
    pub fn new(flash: F) -> Self {
        debug_assert!(F::ERASE_SIZE == PAGE);
        debug_assert!(WORD % F::WRITE_SIZE == 0);
        Self { flash }
    }

    pub fn flash(&mut self) -> &mut F {
        &mut self.flash
    }

    pub fn into_inner(self) -> F {
        self.flash
    }

    pub fn read(&mut self, address: u32, bytes: &mut [u8]) -> Result<(), FlashError> {
        self.flash.read(address, bytes).map_err(|e| FlashError::new(address, e))
    }

    pub fn read_word(&mut self, address: u32) -> Result<u32, FlashError> {
        let mut word = [0; WORD];
        self.read(address, &mut word)?;
        Ok(u32::from_le_bytes(word))
    }

    /// Erase the page at `page_address` and program `data` at its start.
    pub fn program_page(&mut self, page_address: u32, data: &[u8]) -> Result<(), FlashError> {
        if page_address % FLASH_PAGE != 0 {
            return Err(FlashError {
                address: page_address,
                kind: NorFlashErrorKind::NotAligned,
            });
        }
        if data.len() > PAGE {
            return Err(FlashError {
                address: page_address,
                kind: NorFlashErrorKind::OutOfBounds,
            });
        }

        self.flash
            .erase(page_address, page_address + FLASH_PAGE)
            .map_err(|e| FlashError::new(page_address, e))?;

        let aligned = data.len() - data.len() % WORD;
        if aligned > 0 {
            self.flash
                .write(page_address, &data[..aligned])
                .map_err(|e| FlashError::new(page_address, e))?;
        }

        let tail = &data[aligned..];
        if !tail.is_empty() {
            let address = page_address + aligned as u32;
            let mut word = [0; WORD];
            word[..tail.len()].copy_from_slice(tail);
            self.flash.write(address, &word).map_err(|e| FlashError::new(address, e))?;
        }
        Ok(())
    }

    /// Program `data` page by page starting at the page-aligned `base`.
    ///
    /// Returns the number of pages touched.
    pub fn commit(&mut self, base: u32, data: &[u8]) -> Result<usize, FlashError> {
        self.commit_parts(base, &[data])
    }

    /// Program the concatenation of `parts` page by page starting at `base`.
    ///
    /// The whole range is checked against the flash before the first erase.
    pub fn commit_parts(&mut self, base: u32, parts: &[&[u8]]) -> Result<usize, FlashError> {
        if base % FLASH_PAGE != 0 {
            return Err(FlashError {
                address: base,
                kind: NorFlashErrorKind::NotAligned,
            });
        }
        let total: usize = parts.iter().map(|part| part.len()).sum();
        let end = base as usize + total;
        if end > self.flash.capacity() {
            return Err(FlashError {
                address: base,
                kind: NorFlashErrorKind::OutOfBounds,
            });
        }

        let mut page = [0u8; PAGE];
        let mut filled = 0;
        let mut pages = 0;
        for part in parts {
            let mut rest = *part;
            while !rest.is_empty() {
                let n = (PAGE - filled).min(rest.len());
                page[filled..filled + n].copy_from_slice(&rest[..n]);
                filled += n;
                rest = &rest[n..];
                if filled == PAGE {
                    self.program_page(base + (pages * PAGE) as u32, &page)?;
                    pages += 1;
                    filled = 0;
                }
            }
        }
        // Last partial page, written exactly once
        if filled > 0 {
            self.program_page(base + (pages * PAGE) as u32, &page[..filled])?;
            pages += 1;
        }
        Ok(pages)
    }
}
