// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Target independent part of the bootloader.
//!
//! The device binary provides the serial link (`embedded_io`), the flash
//! (`embedded_storage` NOR flash) and the final jump; everything between the
//! first command byte and the entry address lives here.

#![no_std]

#[cfg(test)]
extern crate std;

// This must go first so the macros are visible to the other modules
mod fmt;

pub mod boot;
pub mod buffer;
pub mod crypto;
pub mod dispatch;
pub mod error;
pub mod metadata;
pub mod programmer;
pub mod provision;
pub mod session;

#[cfg(test)]
mod testutil;

pub use boot::BootSelector;
pub use buffer::PendingBuffer;
pub use crypto::{CryptoProvider, Keys, PublicKey, Verification};
pub use dispatch::{Dispatcher, Outcome};
pub use error::{Abort, FlashError};
pub use metadata::Metadata;
pub use programmer::Programmer;
pub use session::{Installed, UpdateSession};
