#![no_std]
#![no_main]

use atmega328p_hal::hal::{board, IoPin, Mmio};
use embedded_hal::digital::v2::ToggleableOutputPin;
use panic_halt as _;

fn spin(iterations: u32) {
    for _ in 0..iterations {
        avr_device::asm::nop();
    }
}

#[avr_device::entry]
fn main() -> ! {
    let mut mmio = Mmio::take().unwrap();
    let mut led = IoPin::new(&mut mmio, board::LED_BUILTIN).into_output();

    loop {
        led.toggle().unwrap();
        spin(400_000);
    }
}
