// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Device side stand-ins: RAM flash, a byte replay link and a scripted
//! bootloader speaking the wire protocol on a tokio duplex stream.

#![allow(dead_code)]

use bootloader::Metadata;
use consts::{FLASH_PAGE, METADATA_BASE};
use embedded_storage::nor_flash::{
    check_erase, check_read, check_write, ErrorType, NorFlash, NorFlashErrorKind, ReadNorFlash,
};
use host_protocol::{frame_len, EnvelopeHeader, Status, FRAME_HEADER_LEN, HEADER_LEN, IV_LEN, SIGNATURE_LEN};
use std::convert::Infallible;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

pub struct RamFlash(pub Vec<u8>);

impl RamFlash {
    pub fn erased() -> Self {
        Self(vec![0xFF; 0x20000])
    }

    /// Erased flash holding a metadata record, as left by provisioning.
    pub fn provisioned(version: u16, size: u16) -> Self {
        let mut flash = Self::erased();
        let start = METADATA_BASE as usize;
        let word = Metadata { version, size }.to_word().to_le_bytes();
        flash.0[start..start + 4].copy_from_slice(&word);
        flash
    }
}

impl ErrorType for RamFlash {
    type Error = NorFlashErrorKind;
}

impl ReadNorFlash for RamFlash {
    const READ_SIZE: usize = 1;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        check_read(self, offset, bytes.len())?;
        let start = offset as usize;
        bytes.copy_from_slice(&self.0[start..start + bytes.len()]);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.0.len()
    }
}

impl NorFlash for RamFlash {
    const WRITE_SIZE: usize = 4;
    const ERASE_SIZE: usize = FLASH_PAGE as usize;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        check_erase(self, from, to)?;
        self.0[from as usize..to as usize].fill(0xFF);
        Ok(())
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        check_write(self, offset, bytes.len())?;
        let start = offset as usize;
        for (slot, &value) in self.0[start..start + bytes.len()].iter_mut().zip(bytes) {
            *slot &= value;
        }
        Ok(())
    }
}

/// Feeds previously captured host bytes to the bootloader.
pub struct Replay {
    input: Vec<u8>,
    cursor: usize,
    pub output: Vec<u8>,
}

impl Replay {
    pub fn new(input: Vec<u8>) -> Self {
        Self {
            input,
            cursor: 0,
            output: Vec::new(),
        }
    }
}

impl embedded_io::ErrorType for Replay {
    type Error = Infallible;
}

impl embedded_io::Read for Replay {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let n = buf.len().min(self.input.len() - self.cursor);
        buf[..n].copy_from_slice(&self.input[self.cursor..self.cursor + n]);
        self.cursor += n;
        Ok(n)
    }
}

impl embedded_io::Write for Replay {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.output.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Console that drops everything.
pub struct Sink;

impl embedded_io::ErrorType for Sink {
    type Error = Infallible;
}

impl embedded_io::Write for Sink {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Where the scripted device answers ERROR instead of OK.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectAt {
    Nothing,
    Header,
    Install,
}

/// Play the bootloader side of one update on `port`, acknowledging every
/// stage without checking anything. Returns every byte the host sent.
pub async fn scripted_device(mut port: DuplexStream, reject: RejectAt) -> std::io::Result<Vec<u8>> {
    let mut received = Vec::new();

    let command = read(&mut port, &mut received, 1).await?;
    port.write_all(&command).await?;

    read(&mut port, &mut received, SIGNATURE_LEN).await?;
    ack(&mut port, true).await?;

    let header = read(&mut port, &mut received, HEADER_LEN).await?;
    let header = EnvelopeHeader::from_bytes(header.try_into().expect("HEADER_LEN bytes"));
    ack(&mut port, reject != RejectAt::Header).await?;
    if reject == RejectAt::Header {
        return Ok(received);
    }

    read(&mut port, &mut received, IV_LEN).await?;
    ack(&mut port, true).await?;

    let mut remaining = usize::from(header.encrypted_size);
    loop {
        let len = read(&mut port, &mut received, FRAME_HEADER_LEN).await?;
        let len = usize::from(frame_len(len.try_into().expect("FRAME_HEADER_LEN bytes")));
        if len == 0 {
            break;
        }
        read(&mut port, &mut received, len).await?;
        remaining = remaining.saturating_sub(len);
        ack(&mut port, true).await?;
    }
    assert_eq!(remaining, 0, "host terminated before sending the whole payload");
    ack(&mut port, true).await?;
    ack(&mut port, reject != RejectAt::Install).await?;
    Ok(received)
}

async fn read(port: &mut DuplexStream, received: &mut Vec<u8>, len: usize) -> std::io::Result<Vec<u8>> {
    let mut bytes = vec![0; len];
    port.read_exact(&mut bytes).await?;
    received.extend_from_slice(&bytes);
    Ok(bytes)
}

async fn ack(port: &mut DuplexStream, ok: bool) -> std::io::Result<()> {
    let status = if ok { Status::Ok } else { Status::Error };
    port.write_all(&[status.as_byte()]).await
}
