// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use crate::boot::BootSelector;
use crate::buffer::PendingBuffer;
use crate::crypto::{CryptoProvider, Keys};
use crate::error::{Abort, TransportFault};
use crate::programmer::Programmer;
use crate::session::{Installed, UpdateSession};
use embedded_io::{Read, Write};
use embedded_storage::nor_flash::NorFlash;
use host_protocol::Command;

/// Result of handling one command byte.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Outcome {
    /// A new firmware was installed, keep listening
    Updated(Installed),
    /// Jump to this address
    Boot(u32),
    /// Not a command, dropped
    Ignored(u8),
}

/// Owns everything the bootloader needs between commands.
pub struct Dispatcher<'a, F, C> {
    programmer: Programmer<F>,
    crypto: C,
    keys: Keys,
    buffer: &'a mut PendingBuffer,
}

impl<'a, F: NorFlash, C: CryptoProvider> Dispatcher<'a, F, C> {
    pub fn new(programmer: Programmer<F>, crypto: C, keys: Keys, buffer: &'a mut PendingBuffer) -> Self {
        Self {
            programmer,
            crypto,
            keys,
            buffer,
        }
    }

    pub fn programmer(&mut self) -> &mut Programmer<F> {
        &mut self.programmer
    }

    /// Greet on the console.
    pub fn banner<W: Write>(&mut self, console: &mut W) {
        let _ = console.write_all(b"Send \"U\" to update, and \"B\" to run the firmware.\n");
    }

    /// Wait for one command on `link` and carry it out.
    ///
    /// Any error is final, the caller is expected to reset.
    pub fn poll<L: Read + Write, W: Write>(&mut self, link: &mut L, console: &mut W) -> Result<Outcome, Abort> {
        let mut byte = [0; 1];
        link.read_exact(&mut byte).map_err(TransportFault::from)?;
        let command = match Command::try_from(byte[0]) {
            Ok(command) => command,
            Err(other) => {
                debug!("ignoring byte {}", other);
                return Ok(Outcome::Ignored(other));
            }
        };

        link.write_all(&[command.as_byte()])
            .and_then(|()| link.flush())
            .map_err(|e| TransportFault::Io(embedded_io::Error::kind(&e)))?;

        match command {
            Command::Update => {
                info!("update requested");
                UpdateSession::new(&mut self.programmer, &self.crypto, &self.keys, self.buffer)
                    .run(link)
                    .map(Outcome::Updated)
            }
            Command::Boot => {
                info!("boot requested");
                let entry = BootSelector::new(&mut self.programmer).prepare(console)?;
                Ok(Outcome::Boot(entry))
            }
        }
    }
}
