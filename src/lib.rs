//! Register-level hardware abstraction layer for the ATmega328P
//!
//! Drivers for GPIO, sleep and power reduction, the watchdog, the system
//! clock and USART0. Every driver is generic over the register file it talks
//! to: `Mmio` on the part itself, [`hal::RegisterArray`] (or any other
//! [`hal::RegisterFile`]) on the host.
//!
//! Operations that take a logical value (a pin, a sleep mode, a prescaler)
//! accept the typed value or its raw `u8` encoding and reject illegal values
//! before touching any register.

#![no_std]

#[cfg(not(feature = "atmega328p"))]
compile_error!("select the target part with the `atmega328p` feature");

#[macro_use]
mod logger;

pub mod config;
pub mod drivers;
pub mod hal;

pub use hal::Error;
