// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use crate::error::FlashError;
use crate::metadata::{self, Metadata};
use crate::programmer::Programmer;
use consts::{FW_ENTRY, MAX_RELEASE_MESSAGE};
use embedded_io::Write;
use embedded_storage::nor_flash::NorFlash;

/// Hands the device over to the installed firmware.
///
/// The jump itself is target specific: [`BootSelector::prepare`] only prints
/// the release message and returns the entry address.
pub struct BootSelector<'a, F> {
    programmer: &'a mut Programmer<F>,
}

impl<'a, F: NorFlash> BootSelector<'a, F> {
    pub fn new(programmer: &'a mut Programmer<F>) -> Self {
        Self { programmer }
    }

    pub fn current_version(&mut self) -> Result<u16, FlashError> {
        Ok(Metadata::load(self.programmer)?.version)
    }

    pub fn release_message<'b>(&mut self, buf: &'b mut [u8]) -> Result<&'b [u8], FlashError> {
        let size = Metadata::load(self.programmer)?.size;
        metadata::release_message(self.programmer, size, buf)
    }

    /// Print the release message on `console` and return the address to jump
    /// to, Thumb bit included.
    pub fn prepare<W: Write>(&mut self, console: &mut W) -> Result<u32, FlashError> {
        let mut buf = [0; MAX_RELEASE_MESSAGE];
        let message = self.release_message(&mut buf)?;
        info!("booting firmware at {}", FW_ENTRY);
        // The console is informational, a failing one does not stop the boot
        let _ = console
            .write_all(message)
            .and_then(|()| console.write_all(b"\n"))
            .and_then(|()| console.flush());
        Ok(FW_ENTRY)
    }
}
