// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundation.xyz>
// SPDX-License-Identifier: GPL-3.0-or-later

#![no_std]

/// Start address of the bootloader in flash memory.
/// The bootloader owns everything from here up to the metadata page and is
/// the first thing the core executes out of reset.
pub const BASE_BOOTLOADER_ADDR: u32 = 0x0000_0000;

/// Size of a flash memory page in bytes (4KB)
/// This is the erase granularity of the NVMC: writing a single byte anywhere
/// inside a page requires the whole page to be erased first.
pub const FLASH_PAGE: u32 = 4096;

/// Size of a flash word in bytes.
/// The NVMC programs whole 32-bit words only, so every write is padded to a
/// multiple of this value.
pub const FLASH_WRITE_SIZE: u32 = 4;

/// Total size of the internal flash (nRF52840, 1MB).
pub const FLASH_SIZE: u32 = 0x0010_0000;

/// Address of the firmware metadata word (version in the low half, size in
/// the high half).
/// The metadata lives alone in its page because every metadata update erases
/// the whole page.
pub const METADATA_BASE: u32 = 0xF000;

/// Offset inside the metadata page that is inspected to decide whether the
/// device still needs its factory image.
/// A blank (never provisioned) part reads zero here, while a page that went
/// through a metadata write reads 0xFF past the first word.
pub const PROVISIONING_MARKER_OFFSET: u32 = 512;

/// Base address of the installed firmware image.
/// Placed on the page right after the metadata page.
pub const FW_BASE: u32 = METADATA_BASE + FLASH_PAGE;

/// Address control is transferred to when booting the firmware.
/// The low bit selects Thumb state on Cortex-M.
pub const FW_ENTRY: u32 = FW_BASE | 1;

/// Largest ciphertext an update can carry (31KB).
/// This bounds the RAM buffer the bootloader reserves for a pending update.
pub const MAX_ENCRYPTED_SIZE: usize = 31 * 1024;

/// Longest release message printed when booting.
pub const MAX_RELEASE_MESSAGE: usize = 1024;

/// Version written by factory provisioning.
pub const INITIAL_VERSION: u16 = 2;

/// Release message stored next to the factory image.
pub const INITIAL_RELEASE_MESSAGE: &str = "This is the initial release message.";
