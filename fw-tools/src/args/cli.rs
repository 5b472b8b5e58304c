// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Command line arguments.

use std::path::PathBuf;

#[derive(clap::Parser)]
#[command(name = "fw-tools", about = "Secure firmware update tooling")]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(clap::Subcommand)]
pub enum Command {
    /// Generate a signing key, an AES key and the bootloader key blob.
    Keygen {
        /// Directory to write the key files to.
        #[clap(short, long)]
        out_dir: PathBuf,
    },
    /// Encrypt and sign a firmware binary.
    Protect {
        /// Path to the secrets file written by keygen.
        #[clap(long)]
        secrets: Option<PathBuf>,
        /// Path to config file.
        #[clap(long, short)]
        config: Option<PathBuf>,
        /// The firmware binary.
        #[clap(short, long)]
        input: PathBuf,
        /// Path to write the protected firmware to.
        #[clap(short, long)]
        output: PathBuf,
        /// Version to write in the header, 0 for a debug build.
        #[clap(long)]
        firmware_version: u16,
        /// Release message printed by the bootloader when booting.
        #[clap(short, long, default_value = "")]
        message: String,
    },
    /// Send a protected firmware to the bootloader.
    Update {
        /// Path to config file.
        #[clap(long, short)]
        config: Option<PathBuf>,
        /// The protected firmware.
        #[clap(short, long)]
        input: PathBuf,
        /// Serial port the bootloader listens on.
        #[clap(short, long)]
        port: Option<String>,
        /// Serial baud rate.
        #[clap(short, long)]
        baudrate: Option<u32>,
        /// Payload bytes per frame.
        #[clap(long)]
        frame_size: Option<usize>,
        /// Boot the new firmware once it is installed.
        #[clap(long)]
        boot: bool,
    },
    /// Print the contents of a protected firmware.
    Inspect {
        /// The protected firmware.
        #[clap(short, long)]
        input: PathBuf,
        /// Check the signature against this secrets file.
        #[clap(long)]
        secrets: Option<PathBuf>,
        /// Path to config file.
        #[clap(long, short)]
        config: Option<PathBuf>,
    },
}
