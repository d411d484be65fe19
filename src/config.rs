//! Configuration constants for the ATmega328P HAL

/// CPU frequency in Hz, taken from `F_CPU` at build time.
pub const CPU_FREQ_HZ: u32 = parse_hz(env!("MCU_FREQ_HZ"));

/// Default USART baud rate
pub const USART_BAUD: u32 = 9600;

/// Default watchdog timeout, in watchdog oscillator cycles (~1 s at 5 V)
pub const WATCHDOG_CYCLES: crate::hal::system::WatchdogCycles =
    crate::hal::system::WatchdogCycles::K128;

const fn parse_hz(text: &str) -> u32 {
    let bytes = text.as_bytes();
    let mut value: u32 = 0;
    let mut i = 0;
    while i < bytes.len() {
        let digit = bytes[i];
        assert!(digit.is_ascii_digit(), "MCU_FREQ_HZ must be decimal");
        value = value * 10 + (digit - b'0') as u32;
        i += 1;
    }
    value
}
