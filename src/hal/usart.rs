//! Polled USART0 driver
//!
//! [`Usart::init`] validates a [`UsartConfig`] completely before any register
//! is written. Transmit and receive busy-wait on the data register status
//! flags with no timeout; use the `embedded_hal::serial` implementations to
//! get `nb::Error::WouldBlock` instead and bound the wait yourself.

use core::convert::Infallible;

use ufmt::derive::uDebug;

use super::register::{Register, RegisterFile};
use crate::config::CPU_FREQ_HZ;

// UCSR0A
const MPCM0: u8 = 1 << 0;
const U2X0: u8 = 1 << 1;
const UPE0: u8 = 1 << 2;
const DOR0: u8 = 1 << 3;
const FE0: u8 = 1 << 4;
const UDRE0: u8 = 1 << 5;
const RXC0: u8 = 1 << 7;

// UCSR0B
const TXB80: u8 = 1 << 0;
const RXB80: u8 = 1 << 1;
const UCSZ02: u8 = 1 << 2;
const TXEN0: u8 = 1 << 3;
const RXEN0: u8 = 1 << 4;

// UCSR0C
const UCSZ0_SHIFT: u8 = 1;
const USBS0: u8 = 1 << 3;
const UPM0_SHIFT: u8 = 4;
const UMSEL0_SHIFT: u8 = 6;

/// XCK0 is PD4; driving it selects synchronous master clocking.
const XCK0: u8 = 1 << 4;

const UBRR_MAX: u32 = 0x0FFF;

/// Baud rates `init` accepts.
pub const SUPPORTED_BAUD_RATES: [u32; 12] = [
    2400, 4800, 9600, 14400, 19200, 28800, 38400, 57600, 76800, 115200, 230400, 250000,
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, uDebug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Not a supported rate, or its divisor does not fit UBRR0
    InvalidBaudRate,
    /// Data bits outside 5..=9
    InvalidDataBits,
    /// Stop bits other than 1 or 2
    InvalidStopBits,
    InvalidDirection,
    InvalidMode,
    InvalidParity,
    TransmitterDisabled,
    ReceiverDisabled,
    /// Stop bit of the received frame was low
    Framing,
    /// A frame arrived while the receive buffer was full
    Overrun,
    Parity,
}

impl From<Infallible> for Error {
    fn from(never: Infallible) -> Self {
        match never {}
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, uDebug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    Transmit,
    Receive,
    TransmitAndReceive,
}

impl Direction {
    const fn enable_bits(self) -> u8 {
        match self {
            Direction::Transmit => TXEN0,
            Direction::Receive => RXEN0,
            Direction::TransmitAndReceive => TXEN0 | RXEN0,
        }
    }
}

impl TryFrom<u8> for Direction {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Error> {
        match value {
            0 => Ok(Direction::Transmit),
            1 => Ok(Direction::Receive),
            2 => Ok(Direction::TransmitAndReceive),
            _ => Err(Error::InvalidDirection),
        }
    }
}

/// Operating mode. Double speed is the U2X0 flag of the asynchronous mode,
/// not a separate UMSEL0 value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, uDebug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mode {
    AsynchronousNormal,
    AsynchronousDoubleSpeed,
    SynchronousMaster,
}

impl Mode {
    const fn umsel(self) -> u8 {
        match self {
            Mode::AsynchronousNormal | Mode::AsynchronousDoubleSpeed => 0b00,
            Mode::SynchronousMaster => 0b01,
        }
    }

    /// Clock cycles per bit, before the UBRR0 + 1 factor.
    const fn divider(self) -> u32 {
        match self {
            Mode::AsynchronousNormal => 16,
            Mode::AsynchronousDoubleSpeed => 8,
            Mode::SynchronousMaster => 2,
        }
    }
}

impl TryFrom<u8> for Mode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Error> {
        match value {
            0 => Ok(Mode::AsynchronousNormal),
            1 => Ok(Mode::AsynchronousDoubleSpeed),
            2 => Ok(Mode::SynchronousMaster),
            _ => Err(Error::InvalidMode),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, uDebug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Parity {
    Disabled,
    Even,
    Odd,
}

impl Parity {
    const fn upm(self) -> u8 {
        match self {
            Parity::Disabled => 0b00,
            Parity::Even => 0b10,
            Parity::Odd => 0b11,
        }
    }
}

impl TryFrom<u8> for Parity {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Error> {
        match value {
            0 => Ok(Parity::Disabled),
            1 => Ok(Parity::Even),
            2 => Ok(Parity::Odd),
            _ => Err(Error::InvalidParity),
        }
    }
}

/// Serial link parameters. The numeric fields are checked by
/// [`UsartConfig::registers`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, uDebug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UsartConfig {
    pub baud_rate: u32,
    pub data_bits: u8,
    pub stop_bits: u8,
    pub direction: Direction,
    pub mode: Mode,
    pub parity: Parity,
}

impl Default for UsartConfig {
    /// 9600 baud 8N1, both directions.
    fn default() -> Self {
        Self {
            baud_rate: crate::config::USART_BAUD,
            data_bits: 8,
            stop_bits: 1,
            direction: Direction::TransmitAndReceive,
            mode: Mode::AsynchronousNormal,
            parity: Parity::Disabled,
        }
    }
}

/// Register values for one configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, uDebug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UsartRegisters {
    pub ubrr: u16,
    pub ucsr0a: u8,
    pub ucsr0b: u8,
    pub ucsr0c: u8,
}

/// UBRR0 value for `baud_rate`, rounded to nearest.
pub fn baud_divisor(cpu_hz: u32, baud_rate: u32, mode: Mode) -> Result<u16, Error> {
    if !SUPPORTED_BAUD_RATES.contains(&baud_rate) {
        return Err(Error::InvalidBaudRate);
    }
    let step = u64::from(mode.divider() * baud_rate);
    let divisor = ((u64::from(cpu_hz) + step / 2) / step)
        .checked_sub(1)
        .ok_or(Error::InvalidBaudRate)?;
    if divisor > u64::from(UBRR_MAX) {
        return Err(Error::InvalidBaudRate);
    }
    Ok(divisor as u16)
}

/// UCSZ0[2:0] for a character size.
const fn character_size(data_bits: u8) -> Result<u8, Error> {
    match data_bits {
        5 => Ok(0b000),
        6 => Ok(0b001),
        7 => Ok(0b010),
        8 => Ok(0b011),
        9 => Ok(0b111),
        _ => Err(Error::InvalidDataBits),
    }
}

impl UsartConfig {
    /// Validate the configuration and compute the register values for a
    /// core clock of `cpu_hz`.
    pub fn registers(&self, cpu_hz: u32) -> Result<UsartRegisters, Error> {
        let ucsz = character_size(self.data_bits)?;
        let usbs = match self.stop_bits {
            1 => 0,
            2 => USBS0,
            _ => return Err(Error::InvalidStopBits),
        };
        let ubrr = baud_divisor(cpu_hz, self.baud_rate, self.mode)?;

        let ucsr0a = match self.mode {
            Mode::AsynchronousDoubleSpeed => U2X0,
            _ => 0,
        };
        let ucsr0b = self.direction.enable_bits() | if ucsz & 0b100 != 0 { UCSZ02 } else { 0 };
        let ucsr0c = (self.mode.umsel() << UMSEL0_SHIFT)
            | (self.parity.upm() << UPM0_SHIFT)
            | usbs
            | ((ucsz & 0b011) << UCSZ0_SHIFT);

        Ok(UsartRegisters {
            ubrr,
            ucsr0a,
            ucsr0b,
            ucsr0c,
        })
    }
}

pub struct Usart<R> {
    regs: R,
    cpu_hz: u32,
}

impl<R: RegisterFile> Usart<R> {
    /// Driver for a core running at the configured `CPU_FREQ_HZ`.
    pub fn new(regs: R) -> Self {
        Self::with_clock(regs, CPU_FREQ_HZ)
    }

    pub fn with_clock(regs: R, cpu_hz: u32) -> Self {
        Self { regs, cpu_hz }
    }

    pub fn release(self) -> R {
        self.regs
    }

    pub fn init(&mut self, config: &UsartConfig) -> Result<(), Error> {
        let values = config.registers(self.cpu_hz).map_err(|error| {
            warn!("usart: rejected configuration, {}", error);
            error
        })?;
        trace!("usart: {}, UBRR0 = {=u16}", config, values.ubrr);

        if config.mode == Mode::SynchronousMaster {
            self.regs.set_bits(Register::DDRD, XCK0);
        }

        self.regs.write(Register::UBRR0H, (values.ubrr >> 8) as u8);
        self.regs.write(Register::UBRR0L, values.ubrr as u8);
        self.regs
            .modify(Register::UCSR0A, |r| (r & MPCM0) | values.ucsr0a);
        self.regs.write(Register::UCSR0C, values.ucsr0c);
        self.regs.write(Register::UCSR0B, values.ucsr0b);
        Ok(())
    }

    /// UDR0 can take another byte.
    #[inline]
    pub fn transmit_ready(&self) -> bool {
        self.regs.is_set(Register::UCSR0A, UDRE0)
    }

    /// A received frame is waiting in UDR0.
    #[inline]
    pub fn receive_ready(&self) -> bool {
        self.regs.is_set(Register::UCSR0A, RXC0)
    }

    /// Send `data`, waiting for the data register before each byte. With
    /// nine data bits every frame goes out with the ninth bit clear.
    pub fn transmit(&mut self, data: &[u8]) -> Result<(), Error> {
        self.check_enabled(TXEN0, Error::TransmitterDisabled)?;
        for &byte in data {
            while !self.transmit_ready() {}
            self.put_frame(u16::from(byte));
        }
        Ok(())
    }

    /// Fill `data`, waiting for each frame.
    ///
    /// Stops at the first frame with a receive error. That frame is consumed.
    /// Only the low eight bits are kept; use [`Usart::receive_word`] for
    /// nine-bit frames.
    pub fn receive(&mut self, data: &mut [u8]) -> Result<(), Error> {
        self.check_enabled(RXEN0, Error::ReceiverDisabled)?;
        for slot in data.iter_mut() {
            while !self.receive_ready() {}
            *slot = self.take_frame()? as u8;
        }
        Ok(())
    }

    /// Send one frame of up to nine bits.
    pub fn transmit_word(&mut self, word: u16) -> Result<(), Error> {
        self.check_enabled(TXEN0, Error::TransmitterDisabled)?;
        while !self.transmit_ready() {}
        self.put_frame(word);
        Ok(())
    }

    /// Receive one frame of up to nine bits.
    pub fn receive_word(&mut self) -> Result<u16, Error> {
        self.check_enabled(RXEN0, Error::ReceiverDisabled)?;
        while !self.receive_ready() {}
        self.take_frame()
    }

    fn check_enabled(&self, enable: u8, error: Error) -> Result<(), Error> {
        if self.regs.is_set(Register::UCSR0B, enable) {
            Ok(())
        } else {
            warn!("usart: {}", error);
            Err(error)
        }
    }

    fn put_frame(&mut self, word: u16) {
        // TXB80 has to be in place before UDR0 starts the frame
        let ninth = if word & 0x100 != 0 { TXB80 } else { 0 };
        self.regs.modify(Register::UCSR0B, |r| (r & !TXB80) | ninth);
        self.regs.write(Register::UDR0, word as u8);
    }

    /// Pop UDR0. Status and RXB80 belong to the frame at the head of the
    /// buffer, so both are read before it.
    fn take_frame(&self) -> Result<u16, Error> {
        let status = self.regs.read(Register::UCSR0A);
        let ninth = self.regs.read(Register::UCSR0B) & RXB80;
        let low = self.regs.read(Register::UDR0);

        if status & FE0 != 0 {
            Err(Error::Framing)
        } else if status & DOR0 != 0 {
            Err(Error::Overrun)
        } else if status & UPE0 != 0 {
            Err(Error::Parity)
        } else {
            Ok(u16::from(ninth != 0) << 8 | u16::from(low))
        }
    }
}

impl<R: RegisterFile> embedded_hal::serial::Read<u8> for Usart<R> {
    type Error = Error;

    /// Low eight bits of the frame; RXB80 is dropped. Nine-bit frames need
    /// [`Usart::receive_word`].
    fn read(&mut self) -> nb::Result<u8, Error> {
        if !self.receive_ready() {
            return Err(nb::Error::WouldBlock);
        }
        Ok(self.take_frame()? as u8)
    }
}

impl<R: RegisterFile> embedded_hal::serial::Write<u8> for Usart<R> {
    type Error = Error;

    fn write(&mut self, word: u8) -> nb::Result<(), Error> {
        if !self.transmit_ready() {
            return Err(nb::Error::WouldBlock);
        }
        self.put_frame(u16::from(word));
        Ok(())
    }

    /// Done once UDR0 is empty; the last frame may still be on the wire.
    fn flush(&mut self) -> nb::Result<(), Error> {
        if self.transmit_ready() {
            Ok(())
        } else {
            Err(nb::Error::WouldBlock)
        }
    }
}

impl<R: RegisterFile> embedded_hal::blocking::serial::write::Default<u8> for Usart<R> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::register::RegisterArray;
    use embedded_hal::serial::{Read, Write};

    const F_16MHZ: u32 = 16_000_000;

    #[test]
    fn test_default_config_registers() {
        let values = UsartConfig::default().registers(F_16MHZ).unwrap();
        assert_eq!(
            values,
            UsartRegisters {
                ubrr: 103,
                ucsr0a: 0,
                ucsr0b: TXEN0 | RXEN0,
                ucsr0c: 0b0000_0110,
            }
        );
    }

    #[test]
    fn test_baud_divisor_modes() {
        assert_eq!(baud_divisor(F_16MHZ, 9600, Mode::AsynchronousNormal), Ok(103));
        assert_eq!(baud_divisor(F_16MHZ, 9600, Mode::AsynchronousDoubleSpeed), Ok(207));
        assert_eq!(baud_divisor(F_16MHZ, 9600, Mode::SynchronousMaster), Ok(832));
        assert_eq!(baud_divisor(F_16MHZ, 115200, Mode::AsynchronousNormal), Ok(8));
        assert_eq!(baud_divisor(F_16MHZ, 250000, Mode::AsynchronousNormal), Ok(3));
    }

    #[test]
    fn test_baud_divisor_rejections() {
        assert_eq!(baud_divisor(F_16MHZ, 9601, Mode::AsynchronousNormal), Err(Error::InvalidBaudRate));
        // 12-bit UBRR0: 3332 fits, 4166 does not
        assert_eq!(baud_divisor(F_16MHZ, 2400, Mode::SynchronousMaster), Ok(3332));
        assert_eq!(baud_divisor(20_000_000, 2400, Mode::SynchronousMaster), Err(Error::InvalidBaudRate));
        // Rounds to zero cycles per bit
        assert_eq!(baud_divisor(1_000_000, 250000, Mode::AsynchronousNormal), Err(Error::InvalidBaudRate));
    }

    #[test]
    fn test_stop_bits() {
        for stop_bits in 0..=255u8 {
            let config = UsartConfig {
                stop_bits,
                ..UsartConfig::default()
            };
            match stop_bits {
                1 => assert_eq!(config.registers(F_16MHZ).unwrap().ucsr0c & USBS0, 0),
                2 => assert_eq!(config.registers(F_16MHZ).unwrap().ucsr0c & USBS0, USBS0),
                _ => assert_eq!(config.registers(F_16MHZ), Err(Error::InvalidStopBits)),
            }
        }
    }

    #[test]
    fn test_data_bits() {
        let expected = [(5u8, 0u8, 0u8), (6, 0b01, 0), (7, 0b10, 0), (8, 0b11, 0), (9, 0b11, UCSZ02)];
        for (data_bits, ucsz01, ucsz2) in expected {
            let config = UsartConfig {
                data_bits,
                ..UsartConfig::default()
            };
            let values = config.registers(F_16MHZ).unwrap();
            assert_eq!((values.ucsr0c >> 1) & 0b11, ucsz01);
            assert_eq!(values.ucsr0b & UCSZ02, ucsz2);
        }

        for data_bits in [0u8, 4, 10, 255] {
            let config = UsartConfig {
                data_bits,
                ..UsartConfig::default()
            };
            assert_eq!(config.registers(F_16MHZ), Err(Error::InvalidDataBits));
        }
    }

    #[test]
    fn test_mode_and_parity_fields() {
        let config = UsartConfig {
            mode: Mode::SynchronousMaster,
            parity: Parity::Odd,
            ..UsartConfig::default()
        };
        let values = config.registers(F_16MHZ).unwrap();
        assert_eq!(values.ucsr0c & 0xC0, 0x40);
        assert_eq!(values.ucsr0c & 0x30, 0x30);
        assert_eq!(values.ucsr0a & U2X0, 0);

        let config = UsartConfig {
            mode: Mode::AsynchronousDoubleSpeed,
            parity: Parity::Even,
            ..UsartConfig::default()
        };
        let values = config.registers(F_16MHZ).unwrap();
        assert_eq!(values.ucsr0c & 0xC0, 0);
        assert_eq!(values.ucsr0c & 0x30, 0x20);
        assert_eq!(values.ucsr0a, U2X0);
    }

    #[test]
    fn test_raw_enum_values() {
        assert_eq!(Direction::try_from(3u8), Err(Error::InvalidDirection));
        assert_eq!(Mode::try_from(2u8), Ok(Mode::SynchronousMaster));
        assert_eq!(Mode::try_from(3u8), Err(Error::InvalidMode));
        assert_eq!(Parity::try_from(3u8), Err(Error::InvalidParity));
    }

    #[test]
    fn test_init_writes_registers() {
        let mut regs = RegisterArray::new();
        let mut usart = Usart::with_clock(&mut regs, F_16MHZ);
        let config = UsartConfig {
            baud_rate: 2400,
            direction: Direction::Transmit,
            ..UsartConfig::default()
        };
        usart.init(&config).unwrap();

        assert_eq!(regs.read(Register::UBRR0H), 0x01);
        assert_eq!(regs.read(Register::UBRR0L), 0xA0);
        assert_eq!(regs.read(Register::UCSR0B), TXEN0);
        assert_eq!(regs.read(Register::UCSR0C), 0b0000_0110);
        assert_eq!(regs.read(Register::DDRD), 0);
    }

    #[test]
    fn test_init_synchronous_drives_xck() {
        let mut regs = RegisterArray::new();
        let config = UsartConfig {
            mode: Mode::SynchronousMaster,
            ..UsartConfig::default()
        };
        Usart::with_clock(&mut regs, F_16MHZ).init(&config).unwrap();
        assert_eq!(regs.read(Register::DDRD), 1 << 4);
    }

    #[test]
    fn test_init_rejection_leaves_registers() {
        let mut regs = RegisterArray::new();
        let config = UsartConfig {
            stop_bits: 3,
            mode: Mode::SynchronousMaster,
            ..UsartConfig::default()
        };
        let result = Usart::with_clock(&mut regs, F_16MHZ).init(&config);
        assert_eq!(result, Err(Error::InvalidStopBits));
        assert!(regs.as_bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_disabled_directions() {
        let mut regs = RegisterArray::new();
        regs.write(Register::UCSR0A, UDRE0 | RXC0);
        let mut usart = Usart::with_clock(&mut regs, F_16MHZ);

        assert_eq!(usart.transmit(b"x"), Err(Error::TransmitterDisabled));
        assert_eq!(usart.receive(&mut [0; 1]), Err(Error::ReceiverDisabled));
        assert_eq!(usart.transmit_word(0x1FF), Err(Error::TransmitterDisabled));
        assert_eq!(usart.receive_word(), Err(Error::ReceiverDisabled));
    }

    #[test]
    fn test_transmit_word_sets_ninth_bit() {
        let mut regs = RegisterArray::new();
        regs.write(Register::UCSR0A, UDRE0);
        regs.write(Register::UCSR0B, TXEN0);
        let mut usart = Usart::with_clock(&mut regs, F_16MHZ);

        usart.transmit_word(0x1A5).unwrap();
        assert_eq!(regs.read(Register::UDR0), 0xA5);
        assert_eq!(regs.read(Register::UCSR0B), TXEN0 | TXB80);

        let mut usart = Usart::with_clock(&mut regs, F_16MHZ);
        usart.transmit_word(0x05A).unwrap();
        assert_eq!(regs.read(Register::UCSR0B), TXEN0);
    }

    #[test]
    fn test_byte_writes_clear_ninth_bit() {
        let mut regs = RegisterArray::new();
        regs.write(Register::UCSR0A, UDRE0);
        regs.write(Register::UCSR0B, TXEN0 | TXB80);
        let mut usart = Usart::with_clock(&mut regs, F_16MHZ);

        assert_eq!(Write::write(&mut usart, b'n'), Ok(()));
        assert_eq!(regs.read(Register::UCSR0B), TXEN0);

        regs.set_bits(Register::UCSR0B, TXB80);
        let mut usart = Usart::with_clock(&mut regs, F_16MHZ);
        usart.transmit(b"m").unwrap();
        assert_eq!(regs.read(Register::UCSR0B), TXEN0);
        assert_eq!(regs.read(Register::UDR0), b'm');
    }

    #[test]
    fn test_receive_errors() {
        let cases = [
            (FE0, Error::Framing),
            (DOR0, Error::Overrun),
            (UPE0, Error::Parity),
            (FE0 | UPE0, Error::Framing),
        ];
        for (flags, error) in cases {
            let mut regs = RegisterArray::new();
            regs.write(Register::UCSR0A, RXC0 | flags);
            regs.write(Register::UCSR0B, RXEN0);
            let mut usart = Usart::with_clock(&mut regs, F_16MHZ);
            assert_eq!(usart.receive_word(), Err(error));
        }
    }

    #[test]
    fn test_receive_word_ninth_bit() {
        let mut regs = RegisterArray::new();
        regs.write(Register::UCSR0A, RXC0);
        regs.write(Register::UCSR0B, RXEN0 | RXB80);
        regs.write(Register::UDR0, 0x3C);
        let mut usart = Usart::with_clock(&mut regs, F_16MHZ);
        assert_eq!(usart.receive_word(), Ok(0x13C));
    }

    #[test]
    fn test_nb_would_block() {
        let mut regs = RegisterArray::new();
        regs.write(Register::UCSR0B, TXEN0 | RXEN0);
        let mut usart = Usart::with_clock(&mut regs, F_16MHZ);

        assert_eq!(Read::read(&mut usart), Err(nb::Error::WouldBlock));
        assert_eq!(Write::write(&mut usart, b'a'), Err(nb::Error::WouldBlock));
        assert_eq!(Write::flush(&mut usart), Err(nb::Error::WouldBlock));
    }

    #[test]
    fn test_nb_ready() {
        let mut regs = RegisterArray::new();
        regs.write(Register::UCSR0A, UDRE0 | RXC0);
        regs.write(Register::UDR0, b'q');
        let mut usart = Usart::with_clock(&mut regs, F_16MHZ);

        assert_eq!(Read::read(&mut usart), Ok(b'q'));
        assert_eq!(Write::write(&mut usart, b'z'), Ok(()));
        assert_eq!(Write::flush(&mut usart), Ok(()));
        assert_eq!(regs.read(Register::UDR0), b'z');
    }
}
