// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Drives the bootloader update protocol over a serial link.

use crate::envelope::Envelope;
use host_protocol::{frame_header, Command, Status, TERMINATOR};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const DEFAULT_FRAME_SIZE: usize = 16;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Stage of the exchange, for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Command,
    Signature,
    Header,
    Iv,
    Frame(usize),
    Terminator,
    Install,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Command => write!(f, "command"),
            Stage::Signature => write!(f, "signature"),
            Stage::Header => write!(f, "header"),
            Stage::Iv => write!(f, "iv"),
            Stage::Frame(idx) => write!(f, "frame {idx}"),
            Stage::Terminator => write!(f, "terminator"),
            Stage::Install => write!(f, "install"),
        }
    }
}

pub struct Updater<S> {
    link: S,
    frame_size: usize,
    timeout: Duration,
}

impl<S: AsyncRead + AsyncWrite + Unpin> Updater<S> {
    pub fn new(link: S) -> Self {
        Self {
            link,
            frame_size: DEFAULT_FRAME_SIZE,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Payload bytes per frame, between 1 and `u16::MAX`.
    pub fn frame_size(mut self, frame_size: usize) -> Result<Self, Error> {
        if frame_size == 0 || frame_size > usize::from(u16::MAX) {
            return Err(Error::InvalidFrameSize(frame_size));
        }
        self.frame_size = frame_size;
        Ok(self)
    }

    /// How long to wait for each reply.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn into_inner(self) -> S {
        self.link
    }

    /// Send `envelope` and wait until the bootloader reports it installed.
    pub async fn update(&mut self, envelope: &Envelope) -> Result<(), Error> {
        self.command(Command::Update).await?;

        self.stage(Stage::Signature, &[&envelope.signature]).await?;
        self.stage(Stage::Header, &[&envelope.header.to_bytes()]).await?;
        self.stage(Stage::Iv, &[&envelope.iv]).await?;
        for (idx, frame) in envelope.ciphertext.chunks(self.frame_size).enumerate() {
            // frame_size is at most u16::MAX
            let header = frame_header(frame.len() as u16);
            self.stage(Stage::Frame(idx), &[&header, frame]).await?;
        }
        self.stage(Stage::Terminator, &[&TERMINATOR]).await?;
        log::info!("payload sent, waiting for the bootloader to install it");
        self.expect_ok(Stage::Install).await?;
        log::info!("firmware version {} installed", envelope.header.version);
        Ok(())
    }

    /// Ask the bootloader to start the installed firmware.
    pub async fn boot(&mut self) -> Result<(), Error> {
        self.command(Command::Boot).await
    }

    async fn command(&mut self, command: Command) -> Result<(), Error> {
        self.link.write_all(&[command.as_byte()]).await.map_err(Error::Io)?;
        self.link.flush().await.map_err(Error::Io)?;
        let echo = self.read_byte(Stage::Command).await?;
        if echo != command.as_byte() {
            return Err(Error::UnexpectedReply {
                stage: Stage::Command,
                byte: echo,
            });
        }
        log::debug!("bootloader acknowledged {:?}", command);
        Ok(())
    }

    async fn stage(&mut self, stage: Stage, parts: &[&[u8]]) -> Result<(), Error> {
        for part in parts {
            self.link.write_all(part).await.map_err(Error::Io)?;
        }
        self.link.flush().await.map_err(Error::Io)?;
        self.expect_ok(stage).await?;
        log::debug!("{stage} accepted");
        Ok(())
    }

    async fn expect_ok(&mut self, stage: Stage) -> Result<(), Error> {
        let byte = self.read_byte(stage).await?;
        match Status::try_from(byte) {
            Ok(Status::Ok) => Ok(()),
            Ok(Status::Error) => Err(Error::Rejected(stage)),
            Err(byte) => Err(Error::UnexpectedReply { stage, byte }),
        }
    }

    async fn read_byte(&mut self, stage: Stage) -> Result<u8, Error> {
        match tokio::time::timeout(self.timeout, self.link.read_u8()).await {
            Ok(Ok(byte)) => Ok(byte),
            Ok(Err(e)) => Err(Error::Io(e)),
            Err(_) => Err(Error::Timeout(stage)),
        }
    }
}

#[derive(Debug)]
pub enum Error {
    InvalidFrameSize(usize),
    Io(std::io::Error),
    Rejected(Stage),
    Timeout(Stage),
    UnexpectedReply { stage: Stage, byte: u8 },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidFrameSize(size) => write!(f, "frame size {size} must be between 1 and {}", u16::MAX),
            Error::Io(e) => write!(f, "serial link error: {e}"),
            Error::Rejected(stage) => write!(f, "bootloader rejected the {stage}"),
            Error::Timeout(stage) => write!(f, "no reply from the bootloader after the {stage}"),
            Error::UnexpectedReply { stage, byte } => {
                write!(f, "unexpected reply {byte:#04x} to the {stage}")
            }
        }
    }
}

impl std::error::Error for Error {}
