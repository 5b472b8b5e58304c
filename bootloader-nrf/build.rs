// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Generates `memory.x` from the shared flash layout and stages the key blob
//! and the factory image for `include_bytes!`.
//!
//! `BOOTLOADER_KEYS` must point at the `bootloader_keys.bin` written by
//! `fw-tools keygen`. `INITIAL_FIRMWARE` optionally points at the image
//! installed on first boot.
//!
//! Factory programming: provisioning only runs when the word at
//! `METADATA_BASE + PROVISIONING_MARKER_OFFSET` reads zero, and erased
//! nRF52840 flash reads `0xFF`. A fresh part must have that word programmed
//! to zero together with the bootloader image, e.g.
//!
//! ```text
//! nrfjprog --chiperase --program bootloader.hex --verify
//! nrfjprog --memwr 0xF200 --val 0
//! ```
//!
//! Without it the metadata word reads `0xFFFF_FFFF`, the stored version is
//! `0xFFFF` and every update other than a debug build is refused as a
//! rollback.

use consts::{BASE_BOOTLOADER_ADDR, METADATA_BASE};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Size of the key blob, see `bootloader::crypto::KEY_BLOB_LEN`.
const KEY_BLOB_LEN: u64 = 16 + 256 + 8;

fn main() {
    let out = &PathBuf::from(env::var_os("OUT_DIR").expect("OUT_DIR is set by cargo"));

    let memory_x_content = format!(
        r##"
        BASE_BOOTLOADER_ADDR = {:#X};
        METADATA_BASE = {:#X};

        MEMORY
        {{
            /* NOTE 1 K = 1 KiBi = 1024 bytes */
            /* The bootloader owns everything below the metadata page */
            FLASH (rx) : ORIGIN = BASE_BOOTLOADER_ADDR, LENGTH = METADATA_BASE - BASE_BOOTLOADER_ADDR
            RAM : ORIGIN = 0x20000000, LENGTH = 256K
            uicr_approtect (r) : ORIGIN = 0x10001208, LENGTH = 0x4
        }}

        SECTIONS {{
            .uicr_approtect :  {{
                KEEP(*(.uicr_approtect))
                . = ALIGN(4);
            }} > uicr_approtect
        }};
        "##,
        BASE_BOOTLOADER_ADDR, METADATA_BASE
    );
    fs::write(out.join("memory.x"), memory_x_content).expect("write memory.x");
    println!("cargo:rustc-link-search={}", out.display());

    stage_keys(out);
    stage_initial_firmware(out);

    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rustc-link-arg-bins=-Tlink.x");
    println!("cargo:rustc-link-arg-bins=-Tdefmt.x");
}

fn stage_keys(out: &Path) {
    println!("cargo:rerun-if-env-changed=BOOTLOADER_KEYS");
    let Some(keys) = env::var_os("BOOTLOADER_KEYS") else {
        panic!("BOOTLOADER_KEYS must point at the key blob written by `fw-tools keygen`");
    };
    let keys = PathBuf::from(keys);
    println!("cargo:rerun-if-changed={}", keys.display());
    let len = fs::metadata(&keys)
        .unwrap_or_else(|e| panic!("cannot read {}: {e}", keys.display()))
        .len();
    assert_eq!(len, KEY_BLOB_LEN, "{} is not a bootloader key blob", keys.display());
    fs::copy(&keys, out.join("keys.bin")).expect("copy key blob");
}

fn stage_initial_firmware(out: &Path) {
    println!("cargo:rerun-if-env-changed=INITIAL_FIRMWARE");
    let target = out.join("initial_firmware.bin");
    match env::var_os("INITIAL_FIRMWARE") {
        Some(image) => {
            let image = PathBuf::from(image);
            println!("cargo:rerun-if-changed={}", image.display());
            let len = fs::metadata(&image)
                .unwrap_or_else(|e| panic!("cannot read {}: {e}", image.display()))
                .len();
            assert!(len <= u64::from(u16::MAX), "initial firmware of {len} bytes is too large");
            fs::copy(&image, target).expect("copy initial firmware");
        }
        None => fs::write(target, []).expect("write empty initial firmware"),
    }
}
