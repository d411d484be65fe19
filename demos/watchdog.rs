#![no_std]
#![no_main]

use atmega328p_hal::{
    config,
    drivers::SerialConsole,
    hal::{Mmio, ResetCauses, System, Usart, UsartConfig, WatchdogConfig, WatchdogMode},
};
use panic_halt as _;
use ufmt::uwriteln;

#[avr_device::entry]
fn main() -> ! {
    let mut mmio = Mmio::take().unwrap();
    let mut system = System::new(&mut mmio);

    // Before anything else: WDRF keeps the watchdog running after a reset
    let causes = system.reset_status();
    system.set_watchdog(WatchdogConfig::DISABLED);

    let mut usart = Usart::new(unsafe { Mmio::steal() });
    usart.init(&UsartConfig::default()).unwrap();
    let mut console = SerialConsole::new(usart);

    console.debug("MCUSR", causes.bits()).unwrap();
    if causes.contains(ResetCauses::WATCHDOG) {
        console.write_line("reset by watchdog").unwrap();
    }

    system.set_watchdog(WatchdogConfig::new(
        WatchdogMode::SystemReset,
        config::WATCHDOG_CYCLES,
    ));

    for round in 0..5u8 {
        uwriteln!(console, "feeding {}", round).unwrap();
        system.reset_watchdog();
        for _ in 0..100_000u32 {
            avr_device::asm::nop();
        }
    }

    console.write_line("starving the watchdog").unwrap();
    loop {}
}
