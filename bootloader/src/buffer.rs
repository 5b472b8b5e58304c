// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! RAM staging area for the signed region of an update.

use crate::error::{Abort, ProtocolViolation, TransportFault};
use embedded_io::Read;
use heapless::Vec;
use host_protocol::PENDING_CAPACITY;

/// Bounded buffer holding `header | iv | ciphertext` while an update is
/// received.
///
/// Every write checks the remaining capacity before touching memory, so a
/// length field coming from the host can never move the cursor past the end.
pub struct PendingBuffer {
    data: Vec<u8, PENDING_CAPACITY>,
}

#[derive(Debug, Eq, PartialEq)]
pub enum FillError {
    Full(ProtocolViolation),
    Transport(TransportFault),
}

impl From<FillError> for Abort {
    fn from(e: FillError) -> Self {
        match e {
            FillError::Full(violation) => Abort::ProtocolViolation(violation),
            FillError::Transport(fault) => Abort::TransportFailure(fault),
        }
    }
}

impl PendingBuffer {
    pub const fn new() -> Self {
        Self { data: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    pub fn remaining(&self) -> usize {
        self.capacity() - self.len()
    }

    /// Drop the content of a previous session.
    pub fn clear(&mut self) {
        self.data.clear();
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Append `bytes`, or fail without writing anything if they do not fit.
    pub fn append(&mut self, bytes: &[u8]) -> Result<(), ProtocolViolation> {
        let available = self.remaining();
        self.data
            .extend_from_slice(bytes)
            .map_err(|_| ProtocolViolation::BufferOverflow {
                requested: bytes.len(),
                available,
            })
    }

    /// Read exactly `count` bytes from `reader` straight into the buffer.
    ///
    /// On failure the buffer is left as it was before the call.
    pub fn fill_from<R: Read>(&mut self, reader: &mut R, count: usize) -> Result<(), FillError> {
        let available = self.remaining();
        if count > available {
            return Err(FillError::Full(ProtocolViolation::BufferOverflow {
                requested: count,
                available,
            }));
        }
        let start = self.data.len();
        // Capacity was checked above
        let _ = self.data.resize(start + count, 0);
        if let Err(e) = reader.read_exact(&mut self.data[start..]) {
            self.data.truncate(start);
            return Err(FillError::Transport(e.into()));
        }
        Ok(())
    }
}

impl Default for PendingBuffer {
    fn default() -> Self {
        Self::new()
    }
}
