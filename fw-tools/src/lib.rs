// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Host side of the secure update flow: key material, protected firmware
//! envelopes and the serial updater.

pub mod envelope;
pub mod secrets;
pub mod updater;

pub use envelope::Envelope;
pub use secrets::Secrets;
pub use updater::Updater;
