// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Blocking `embedded_io` views of the UARTE peripherals.

use embassy_nrf::uarte::{self, Instance, Uarte, UarteTx};

/// Longest DMA transfer issued at once. Transmit buffers are bounced
/// through RAM in chunks of this size.
const CHUNK: usize = 255;

#[derive(Debug, defmt::Format)]
pub struct SerialError(uarte::Error);

impl embedded_io::Error for SerialError {
    fn kind(&self) -> embedded_io::ErrorKind {
        embedded_io::ErrorKind::Other
    }
}

/// Host link: requests in, status bytes out.
pub struct Link<'d, T: Instance>(pub Uarte<'d, T>);

impl<T: Instance> embedded_io::ErrorType for Link<'_, T> {
    type Error = SerialError;
}

impl<T: Instance> embedded_io::Read for Link<'_, T> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let len = buf.len().min(CHUNK);
        self.0.blocking_read(&mut buf[..len]).map_err(SerialError)?;
        Ok(len)
    }
}

impl<T: Instance> embedded_io::Write for Link<'_, T> {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        let len = buf.len().min(CHUNK);
        let mut ram = [0; CHUNK];
        ram[..len].copy_from_slice(&buf[..len]);
        self.0.blocking_write(&ram[..len]).map_err(SerialError)?;
        Ok(len)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Transmit only console for the banner and the release message.
pub struct Console<'d, T: Instance>(pub UarteTx<'d, T>);

impl<T: Instance> embedded_io::ErrorType for Console<'_, T> {
    type Error = SerialError;
}

impl<T: Instance> embedded_io::Write for Console<'_, T> {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        let len = buf.len().min(CHUNK);
        let mut ram = [0; CHUNK];
        ram[..len].copy_from_slice(&buf[..len]);
        self.0.blocking_write(&ram[..len]).map_err(SerialError)?;
        Ok(len)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}
