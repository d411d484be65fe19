#![no_std]
#![no_main]
#![feature(abi_avr_interrupt)]

use atmega328p_hal::{
    drivers::SerialConsole,
    hal::{
        Mmio, Module, Power, PowerState, SleepMode, System, Usart, UsartConfig, WatchdogConfig,
        WatchdogCycles, WatchdogMode,
    },
};
use panic_halt as _;
use ufmt::uwriteln;

#[avr_device::interrupt(atmega328p)]
fn WDT() {}

#[avr_device::entry]
fn main() -> ! {
    let mut mmio = Mmio::take().unwrap();
    // The console only ever touches the USART0 registers
    let mut usart = Usart::new(unsafe { Mmio::steal() });
    usart.init(&UsartConfig::default()).unwrap();
    let mut console = SerialConsole::new(usart);

    let mut power = Power::new(&mut mmio);
    let unused = Module::Spi.bit() | Module::Timer2.bit() | Module::Twi.bit() | Module::Adc.bit();
    power.change_module_powers(unused, Module::Usart0.bit()).unwrap();
    console.debug("PRR", unused).unwrap();

    // Watchdog interrupt as the periodic wake-up source; interrupts are on
    // from here
    System::new(&mut mmio).set_watchdog(WatchdogConfig::new(
        WatchdogMode::Interrupt,
        WatchdogCycles::K128,
    ));

    let mut wakeups: u16 = 0;
    loop {
        let mut power = Power::new(&mut mmio);
        if power.module_power(Module::Usart0) == PowerState::On {
            uwriteln!(console, "wake {}", wakeups).unwrap();
            console.flush().unwrap();
        }
        power.set_sleep_mode(SleepMode::PowerDown).unwrap();
        wakeups = wakeups.wrapping_add(1);
    }
}
