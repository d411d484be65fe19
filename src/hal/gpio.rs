//! General purpose I/O
//!
//! Pins are addressed by [`Pin`] (port + index). The [`Gpio`] driver works on
//! any pin given at call time; [`IoPin`] is a typestate handle for one pin
//! implementing the `embedded-hal` digital traits.
//!
//! Each port owns three consecutive registers (PINx, DDRx, PORTx) and ports
//! follow each other at a stride of three, starting at PINB.

use core::convert::Infallible;
use core::marker::PhantomData;

use embedded_hal::digital::v2::{InputPin, OutputPin, StatefulOutputPin, ToggleableOutputPin};
use ufmt::derive::uDebug;

use super::register::{Register, RegisterFile};

#[derive(Clone, Copy, Debug, PartialEq, Eq, uDebug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    InvalidPort,
    InvalidPin,
    InvalidDirection,
    InvalidState,
}

impl From<Infallible> for Error {
    fn from(never: Infallible) -> Self {
        match never {}
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, uDebug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Port {
    B = 0,
    C = 1,
    D = 2,
}

impl TryFrom<u8> for Port {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Error> {
        match value {
            0 => Ok(Port::B),
            1 => Ok(Port::C),
            2 => Ok(Port::D),
            _ => Err(Error::InvalidPort),
        }
    }
}

/// The three registers of one port.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PortRegisters {
    /// Input sense; writing a one toggles the matching PORTx bit
    pub pin: Register,
    /// Data direction, 1 = output
    pub ddr: Register,
    /// Output level in output mode, pull-up enable in input mode
    pub port: Register,
}

impl Port {
    const STRIDE: u8 = 3;

    pub const fn registers(self) -> PortRegisters {
        let pin = Register::PINB.offset(self as u8 * Self::STRIDE);
        PortRegisters {
            pin,
            ddr: pin.offset(1),
            port: pin.offset(2),
        }
    }
}

/// One GPIO line. Only constructible with an index below 8.
#[derive(Clone, Copy, Debug, PartialEq, Eq, uDebug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Pin {
    port: Port,
    index: u8,
}

impl Pin {
    pub const fn new(port: Port, index: u8) -> Result<Self, Error> {
        if index < 8 {
            Ok(Pin { port, index })
        } else {
            Err(Error::InvalidPin)
        }
    }

    #[inline]
    pub const fn port(self) -> Port {
        self.port
    }

    #[inline]
    pub const fn index(self) -> u8 {
        self.index
    }

    #[inline]
    pub const fn mask(self) -> u8 {
        1 << self.index
    }
}

impl TryFrom<(Port, u8)> for Pin {
    type Error = Error;

    fn try_from((port, index): (Port, u8)) -> Result<Self, Error> {
        Pin::new(port, index)
    }
}

impl TryFrom<(u8, u8)> for Pin {
    type Error = Error;

    fn try_from((port, index): (u8, u8)) -> Result<Self, Error> {
        Pin::new(Port::try_from(port)?, index)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, uDebug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Direction {
    Output = 0,
    Input = 1,
}

impl TryFrom<u8> for Direction {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Error> {
        match value {
            0 => Ok(Direction::Output),
            1 => Ok(Direction::Input),
            _ => Err(Error::InvalidDirection),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, uDebug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum PinState {
    Low = 0,
    High = 1,
}

impl PinState {
    #[inline]
    pub const fn is_high(self) -> bool {
        matches!(self, PinState::High)
    }
}

impl From<bool> for PinState {
    fn from(high: bool) -> Self {
        if high {
            PinState::High
        } else {
            PinState::Low
        }
    }
}

impl TryFrom<u8> for PinState {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Error> {
        match value {
            0 => Ok(PinState::Low),
            1 => Ok(PinState::High),
            _ => Err(Error::InvalidState),
        }
    }
}

/// Requested pin mode. `pull_up` only matters for inputs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, uDebug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PinConfig {
    pub direction: Direction,
    pub pull_up: bool,
}

impl PinConfig {
    pub const OUTPUT: PinConfig = PinConfig {
        direction: Direction::Output,
        pull_up: false,
    };
    pub const INPUT_FLOATING: PinConfig = PinConfig {
        direction: Direction::Input,
        pull_up: false,
    };
    pub const INPUT_PULL_UP: PinConfig = PinConfig {
        direction: Direction::Input,
        pull_up: true,
    };
}

/// Raw `(direction, pull_up)` pair.
impl TryFrom<(u8, bool)> for PinConfig {
    type Error = Error;

    fn try_from((direction, pull_up): (u8, bool)) -> Result<Self, Error> {
        Ok(PinConfig {
            direction: Direction::try_from(direction)?,
            pull_up,
        })
    }
}

/// One register write of a mode transition, carrying the full new value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Step {
    Ddr(u8),
    Port(u8),
}

/// Writes that move a pin from the `(ddr, port)` snapshot to `config`.
///
/// Any intermediate state has the DDRx bit cleared, so the pin is never
/// driven to a level nobody asked for. Steps run in array order.
pub(crate) fn plan_transition(ddr: u8, port: u8, mask: u8, config: PinConfig) -> [Option<Step>; 2] {
    let output = ddr & mask != 0;
    let high = port & mask != 0;

    match (config.direction, config.pull_up) {
        (Direction::Output, _) => match (output, high) {
            (true, _) => [None, None],
            // Pull-up off first: tri-state, then drive low
            (false, true) => [Some(Step::Port(port & !mask)), Some(Step::Ddr(ddr | mask))],
            (false, false) => [Some(Step::Ddr(ddr | mask)), None],
        },
        (Direction::Input, true) => match (output, high) {
            // Release the line before enabling the pull-up
            (true, false) => [Some(Step::Ddr(ddr & !mask)), Some(Step::Port(port | mask))],
            (true, true) => [Some(Step::Ddr(ddr & !mask)), None],
            (false, false) => [Some(Step::Port(port | mask)), None],
            (false, true) => [None, None],
        },
        (Direction::Input, false) => match (output, high) {
            // Stop driving high first, passing through pull-up
            (true, true) => [Some(Step::Ddr(ddr & !mask)), Some(Step::Port(port & !mask))],
            (true, false) => [Some(Step::Ddr(ddr & !mask)), None],
            (false, true) => [Some(Step::Port(port & !mask)), None],
            (false, false) => [None, None],
        },
    }
}

fn configure_pin<R: RegisterFile>(regs: &mut R, pin: Pin, config: PinConfig) {
    let PortRegisters { ddr, port, .. } = pin.port.registers();

    // One snapshot; the writes below are computed from it and never re-read
    let ddr_value = regs.read(ddr);
    let port_value = regs.read(port);

    let steps = plan_transition(ddr_value, port_value, pin.mask(), config);
    trace!("gpio: configure {} -> {}, steps {}", pin, config, steps.iter().flatten().count());

    for step in steps.into_iter().flatten() {
        match step {
            Step::Ddr(value) => regs.write(ddr, value),
            Step::Port(value) => regs.write(port, value),
        }
    }
}

fn write_pin<R: RegisterFile>(regs: &mut R, pin: Pin, state: PinState) {
    let port = pin.port.registers().port;
    match state {
        PinState::High => regs.set_bits(port, pin.mask()),
        PinState::Low => regs.clear_bits(port, pin.mask()),
    }
}

#[inline]
fn toggle_pin<R: RegisterFile>(regs: &mut R, pin: Pin) {
    // Only the target bit is written; any other one would toggle too
    regs.write(pin.port.registers().pin, pin.mask());
}

#[inline]
fn read_pin<R: RegisterFile>(regs: &R, pin: Pin) -> PinState {
    PinState::from(regs.is_set(pin.port.registers().pin, pin.mask()))
}

fn checked<T, V>(value: V) -> Result<T, Error>
where
    V: TryInto<T>,
    Error: From<V::Error>,
{
    value.try_into().map_err(|e| {
        let error = Error::from(e);
        warn!("gpio: rejected, {}", error);
        error
    })
}

/// GPIO driver for ports B, C and D.
///
/// Every operation accepts either typed arguments or their raw encodings
/// (`(port, index)` tuples, `u8` states) and validates them before any
/// register is touched.
pub struct Gpio<R> {
    regs: R,
}

impl<R: RegisterFile> Gpio<R> {
    pub fn new(regs: R) -> Self {
        Self { regs }
    }

    pub fn release(self) -> R {
        self.regs
    }

    /// Switch a pin between input and output without glitching the line.
    ///
    /// Callers that share the port with an ISR must wrap this in a critical
    /// section themselves; the two registers are read once and written from
    /// that snapshot.
    pub fn configure<P, C>(&mut self, pin: P, config: C) -> Result<(), Error>
    where
        P: TryInto<Pin>,
        C: TryInto<PinConfig>,
        Error: From<P::Error> + From<C::Error>,
    {
        let pin = checked(pin)?;
        let config = checked(config)?;
        configure_pin(&mut self.regs, pin, config);
        Ok(())
    }

    pub fn write<P, S>(&mut self, pin: P, state: S) -> Result<(), Error>
    where
        P: TryInto<Pin>,
        S: TryInto<PinState>,
        Error: From<P::Error> + From<S::Error>,
    {
        let pin = checked(pin)?;
        let state = checked(state)?;
        write_pin(&mut self.regs, pin, state);
        Ok(())
    }

    pub fn toggle<P>(&mut self, pin: P) -> Result<(), Error>
    where
        P: TryInto<Pin>,
        Error: From<P::Error>,
    {
        let pin = checked(pin)?;
        toggle_pin(&mut self.regs, pin);
        Ok(())
    }

    /// Live input level. Output pins read back their own level.
    pub fn read<P>(&self, pin: P) -> Result<PinState, Error>
    where
        P: TryInto<Pin>,
        Error: From<P::Error>,
    {
        let pin = checked(pin)?;
        Ok(read_pin(&self.regs, pin))
    }
}

pub trait PinMode {}
pub struct Input;
pub struct Output;
impl PinMode for Input {}
impl PinMode for Output {}

/// Single pin handle with its mode in the type.
pub struct IoPin<R, MODE> {
    regs: R,
    pin: Pin,
    _mode: PhantomData<MODE>,
}

impl<R: RegisterFile> IoPin<R, Input> {
    /// Take over `pin` as a floating input.
    pub fn new(regs: R, pin: Pin) -> Self {
        let mut io = IoPin {
            regs,
            pin,
            _mode: PhantomData,
        };
        configure_pin(&mut io.regs, pin, PinConfig::INPUT_FLOATING);
        io
    }
}

impl<R: RegisterFile, MODE: PinMode> IoPin<R, MODE> {
    pub fn into_output(self) -> IoPin<R, Output> {
        self.into_mode(PinConfig::OUTPUT)
    }

    pub fn into_pull_up_input(self) -> IoPin<R, Input> {
        self.into_mode(PinConfig::INPUT_PULL_UP)
    }

    pub fn into_floating_input(self) -> IoPin<R, Input> {
        self.into_mode(PinConfig::INPUT_FLOATING)
    }

    fn into_mode<NEW: PinMode>(mut self, config: PinConfig) -> IoPin<R, NEW> {
        configure_pin(&mut self.regs, self.pin, config);
        IoPin {
            regs: self.regs,
            pin: self.pin,
            _mode: PhantomData,
        }
    }

    #[inline]
    pub fn pin(&self) -> Pin {
        self.pin
    }

    /// Live input level (PINx).
    #[inline]
    pub fn state(&self) -> PinState {
        read_pin(&self.regs, self.pin)
    }

    pub fn release(self) -> R {
        self.regs
    }
}

impl<R: RegisterFile> IoPin<R, Output> {
    #[inline]
    pub fn set_state(&mut self, state: PinState) {
        write_pin(&mut self.regs, self.pin, state);
    }
}

impl<R: RegisterFile> OutputPin for IoPin<R, Output> {
    type Error = Infallible;

    fn set_low(&mut self) -> Result<(), Infallible> {
        write_pin(&mut self.regs, self.pin, PinState::Low);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        write_pin(&mut self.regs, self.pin, PinState::High);
        Ok(())
    }
}

impl<R: RegisterFile> StatefulOutputPin for IoPin<R, Output> {
    fn is_set_high(&self) -> Result<bool, Infallible> {
        Ok(self.regs.is_set(self.pin.port.registers().port, self.pin.mask()))
    }

    fn is_set_low(&self) -> Result<bool, Infallible> {
        self.is_set_high().map(|high| !high)
    }
}

impl<R: RegisterFile> ToggleableOutputPin for IoPin<R, Output> {
    type Error = Infallible;

    fn toggle(&mut self) -> Result<(), Infallible> {
        toggle_pin(&mut self.regs, self.pin);
        Ok(())
    }
}

impl<R: RegisterFile, MODE: PinMode> InputPin for IoPin<R, MODE> {
    type Error = Infallible;

    fn is_high(&self) -> Result<bool, Infallible> {
        Ok(read_pin(&self.regs, self.pin).is_high())
    }

    fn is_low(&self) -> Result<bool, Infallible> {
        Ok(!read_pin(&self.regs, self.pin).is_high())
    }
}

// Arduino Uno pin assignments
pub mod board {
    use super::*;

    /// D13, on-board LED
    pub const LED_BUILTIN: Pin = Pin { port: Port::B, index: 5 };

    /// D0 / RXD
    pub const USART_RX: Pin = Pin { port: Port::D, index: 0 };
    /// D1 / TXD
    pub const USART_TX: Pin = Pin { port: Port::D, index: 1 };
    /// D4 / XCK, USART clock in synchronous mode
    pub const USART_XCK: Pin = Pin { port: Port::D, index: 4 };
}
