// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

#![no_std]
#![no_main]

mod jump_app;
mod uart;

// global logger
use defmt_rtt as _;
use embassy_nrf as _;
use panic_probe as _;

use bootloader::crypto::{RustCrypto, KEY_BLOB_LEN};
use bootloader::{provision, Dispatcher, Keys, Outcome, PendingBuffer, Programmer};
use cortex_m::peripheral::SCB;
use defmt::{error, info, warn};
use embassy_nrf::nvmc::Nvmc;
use embassy_nrf::{bind_interrupts, peripherals, uarte};
use jump_app::jump_to_app;
use linked_list_allocator::LockedHeap;
use static_cell::ConstStaticCell;
use uart::{Console, Link};

bind_interrupts!(struct Irqs {
    UARTE0_UART0 => uarte::InterruptHandler<peripherals::UARTE0>;
    UARTE1 => uarte::InterruptHandler<peripherals::UARTE1>;
});

// Big number arithmetic in the signature check allocates
const HEAP_SIZE: usize = 16 * 1024;
static mut HEAP_MEM: [u8; HEAP_SIZE] = [0; HEAP_SIZE];

#[global_allocator]
static ALLOCATOR: LockedHeap = LockedHeap::empty();

static PENDING: ConstStaticCell<PendingBuffer> = ConstStaticCell::new(PendingBuffer::new());

/// Written by `fw-tools keygen`, embedded by the build script.
static KEY_BLOB: &[u8; KEY_BLOB_LEN] = include_bytes!(concat!(env!("OUT_DIR"), "/keys.bin"));

/// Installed on first boot, empty when the build provided none.
static INITIAL_FIRMWARE: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/initial_firmware.bin"));

#[cfg(feature = "no-dbg-access")]
#[used]
#[link_section = ".uicr_approtect"]
pub static APPROTECT: u32 = 0xFFFF_FF00;

#[cortex_m_rt::entry]
fn main() -> ! {
    // SAFETY: the heap region is handed to the allocator once, before
    // anything allocates, and never touched again.
    unsafe { ALLOCATOR.lock().init(core::ptr::addr_of_mut!(HEAP_MEM) as *mut u8, HEAP_SIZE) };

    let p = embassy_nrf::init(Default::default());

    let mut config_uart = uarte::Config::default();
    config_uart.parity = uarte::Parity::EXCLUDED;
    config_uart.baudrate = uarte::Baudrate::BAUD115200;

    // Host link on UARTE0, console on UARTE1
    let mut link = Link(uarte::Uarte::new(p.UARTE0, Irqs, p.P0_08, p.P0_06, config_uart.clone()));
    let mut console = Console(uarte::UarteTx::new(p.UARTE1, Irqs, p.P1_02, config_uart));

    let mut programmer = Programmer::new(Nvmc::new(p.NVMC));
    match provision::provision_if_blank(&mut programmer, INITIAL_FIRMWARE) {
        Ok(Some(record)) => info!("provisioned version {} ({} bytes)", record.version, record.size),
        Ok(None) => {}
        Err(e) => {
            error!("provisioning failed: {}", e);
            SCB::sys_reset();
        }
    }

    let keys = Keys::from_blob(KEY_BLOB);
    let mut dispatcher = Dispatcher::new(programmer, RustCrypto, keys, PENDING.take());
    dispatcher.banner(&mut console);

    loop {
        match dispatcher.poll(&mut link, &mut console) {
            Ok(Outcome::Updated(installed)) => {
                info!("installed version {} ({} pages)", installed.version, installed.pages);
            }
            Ok(Outcome::Boot(entry)) => {
                drop(link);
                drop(console);
                // SAFETY: the peripherals were released above and the
                // entry point was taken from the firmware region.
                unsafe { jump_to_app(entry) }
            }
            Ok(Outcome::Ignored(_)) => {}
            Err(abort) => {
                warn!("resetting after {}", abort);
                SCB::sys_reset();
            }
        }
    }
}
