//! Character stream on top of a serial port
//!
//! Wraps anything implementing the `embedded_hal` 0.2 serial traits (usually
//! [`Usart`](crate::hal::Usart)) so `ufmt::uwrite!` and `core::write!` print
//! straight to the line. Output newlines become `\r\n`.

use core::fmt;

use embedded_hal::serial::{Read, Write};
use nb::block;

const HEX_CHARS: [u8; 16] = *b"0123456789ABCDEF";

pub struct SerialConsole<S> {
    serial: S,
}

impl<S, E> SerialConsole<S>
where
    S: Read<u8, Error = E> + Write<u8, Error = E>,
{
    pub fn new(serial: S) -> Self {
        Self { serial }
    }

    pub fn release(self) -> S {
        self.serial
    }

    pub fn write_byte(&mut self, byte: u8) -> Result<(), E> {
        if byte == b'\n' {
            block!(self.serial.write(b'\r'))?;
        }
        block!(self.serial.write(byte))
    }

    pub fn write_str(&mut self, s: &str) -> Result<(), E> {
        s.bytes().try_for_each(|b| self.write_byte(b))
    }

    pub fn write_line(&mut self, s: &str) -> Result<(), E> {
        self.write_str(s)?;
        self.write_byte(b'\n')
    }

    /// Two upper case hex digits.
    pub fn write_hex(&mut self, value: u8) -> Result<(), E> {
        self.write_byte(HEX_CHARS[(value >> 4) as usize])?;
        self.write_byte(HEX_CHARS[(value & 0xF) as usize])
    }

    /// `[DBG] msg: 0xNN` on its own line.
    pub fn debug(&mut self, msg: &str, value: u8) -> Result<(), E> {
        self.write_str("[DBG] ")?;
        self.write_str(msg)?;
        self.write_str(": 0x")?;
        self.write_hex(value)?;
        self.write_byte(b'\n')
    }

    /// Block until a byte arrives.
    pub fn read_byte(&mut self) -> Result<u8, E> {
        block!(self.serial.read())
    }

    pub fn flush(&mut self) -> Result<(), E> {
        block!(self.serial.flush())
    }
}

impl<S, E> ufmt::uWrite for SerialConsole<S>
where
    S: Read<u8, Error = E> + Write<u8, Error = E>,
{
    type Error = E;

    fn write_str(&mut self, s: &str) -> Result<(), E> {
        SerialConsole::write_str(self, s)
    }
}

impl<S, E> fmt::Write for SerialConsole<S>
where
    S: Read<u8, Error = E> + Write<u8, Error = E>,
{
    fn write_str(&mut self, s: &str) -> fmt::Result {
        SerialConsole::write_str(self, s).map_err(|_| fmt::Error)
    }
}
