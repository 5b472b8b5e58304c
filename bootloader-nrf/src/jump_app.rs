// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use cortex_m::peripheral::NVIC;
use defmt::info;
use embassy_nrf::interrupt::Interrupt;

/// Hands the core over to the installed firmware.
///
/// # Safety
///
/// Runs whatever is stored at `entry`. Nothing owned by the bootloader may be
/// used afterwards.
pub unsafe fn jump_to_app(entry: u32) -> ! {
    info!("jumping to {=u32:#x}", entry);

    // Disable active interrupts
    cortex_m::interrupt::disable();
    NVIC::mask(Interrupt::UARTE0_UART0);
    NVIC::mask(Interrupt::UARTE1);

    // The firmware is raw thumb code, not a vector table: branch straight to
    // it with the bootloader's stack.
    core::arch::asm!(
        "isb",
        "bx {entry}",
        entry = in(reg) entry,
        options(noreturn),
    );
}
