// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Factory installation of the firmware shipped inside the bootloader image.

use crate::error::FlashError;
use crate::metadata::{self, Metadata};
use crate::programmer::Programmer;
use consts::{FW_BASE, INITIAL_RELEASE_MESSAGE, INITIAL_VERSION};
use embedded_storage::nor_flash::{NorFlash, NorFlashErrorKind};

/// Install `image` with the initial release message and version if the
/// device was never provisioned.
///
/// Returns the written record, or `None` when the device already carries
/// firmware. The image is trusted as is.
pub fn provision_if_blank<F: NorFlash>(
    programmer: &mut Programmer<F>,
    image: &[u8],
) -> Result<Option<Metadata>, FlashError> {
    if !metadata::needs_provisioning(programmer)? {
        return Ok(None);
    }
    let Ok(size) = u16::try_from(image.len()) else {
        return Err(FlashError {
            address: FW_BASE,
            kind: NorFlashErrorKind::OutOfBounds,
        });
    };

    info!("provisioning {} byte factory image", size);
    programmer.commit_parts(FW_BASE, &[image, INITIAL_RELEASE_MESSAGE.as_bytes(), &[0]])?;
    // Written last: an interrupted copy leaves the marker in place and runs again
    let record = Metadata {
        version: INITIAL_VERSION,
        size,
    };
    record.store(programmer)?;
    Ok(Some(record))
}
