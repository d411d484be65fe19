//! Simulated ATmega328P register file for integration tests.
//!
//! On top of plain storage it models the side effects the drivers rely on:
//! PINx reflects driven levels, pull-ups and external inputs, writing PINx
//! toggles PORTx, CLKPCE clears itself once polled, UDR0 feeds a receive
//! queue and captures transmitted bytes. Every write and CPU instruction is
//! appended to a journal.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;

use atmega328p_hal::hal::{Cpu, Port, Register, RegisterArray, RegisterFile};

const SREG_I: u8 = 1 << 7;
const CLKPCE: u8 = 1 << 7;
const UDRE0: u8 = 1 << 5;
const RXC0: u8 = 1 << 7;
const RXEN0: u8 = 1 << 4;
const RXB80: u8 = 1 << 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Event {
    Write(Register, u8),
    /// `sleep` executed, with SMCR at that moment
    Sleep { smcr: u8 },
    WatchdogReset,
    InterruptsDisabled,
    InterruptsEnabled,
}

#[derive(Default)]
pub struct SimulatedMcu {
    regs: RefCell<RegisterArray>,
    /// Levels applied to the pins from outside, per port
    external: [u8; 3],
    /// Frames waiting to be read from UDR0, with their UCSR0A error flags
    rx: RefCell<VecDeque<(u16, u8)>>,
    pub tx: Vec<u8>,
    pub journal: Vec<Event>,
}

fn port_of(reg: Register) -> Option<(Port, u8)> {
    [Port::B, Port::C, Port::D].into_iter().find_map(|port| {
        let regs = port.registers();
        let offset = reg.address().checked_sub(regs.pin.address())?;
        (offset < 3).then_some((port, offset))
    })
}

impl SimulatedMcu {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set register contents without journalling.
    pub fn preset(&mut self, reg: Register, value: u8) {
        self.regs.get_mut().write(reg, value);
    }

    pub fn peek(&self, reg: Register) -> u8 {
        self.regs.borrow().read(reg)
    }

    pub fn drive_input(&mut self, port: Port, index: u8, high: bool) {
        let slot = &mut self.external[port as usize];
        if high {
            *slot |= 1 << index;
        } else {
            *slot &= !(1 << index);
        }
    }

    pub fn queue_rx(&mut self, bytes: &[u8]) {
        self.rx.get_mut().extend(bytes.iter().map(|&b| (u16::from(b), 0)));
    }

    pub fn queue_rx_word(&mut self, word: u16) {
        self.rx.get_mut().push_back((word, 0));
    }

    /// Queue a frame received with the given FE0/DOR0/UPE0 flags.
    pub fn queue_rx_error(&mut self, byte: u8, flags: u8) {
        self.rx.get_mut().push_back((u16::from(byte), flags));
    }

    pub fn rx_pending(&self) -> usize {
        self.rx.borrow().len()
    }

    pub fn writes(&self) -> Vec<(Register, u8)> {
        self.journal
            .iter()
            .filter_map(|event| match *event {
                Event::Write(reg, value) => Some((reg, value)),
                _ => None,
            })
            .collect()
    }

    pub fn writes_to(&self, reg: Register) -> Vec<u8> {
        self.writes()
            .into_iter()
            .filter(|&(r, _)| r == reg)
            .map(|(_, value)| value)
            .collect()
    }

    pub fn clear_journal(&mut self) {
        self.journal.clear();
    }
}

impl RegisterFile for SimulatedMcu {
    fn read(&self, reg: Register) -> u8 {
        if let Some((port, 0)) = port_of(reg) {
            let regs = self.regs.borrow();
            let r = port.registers();
            let ddr = regs.read(r.ddr);
            let level = regs.read(r.port);
            // Inputs read the external level, or high through the pull-up
            return (ddr & level) | (!ddr & (level | self.external[port as usize]));
        }

        match reg {
            Register::CLKPR => {
                let mut regs = self.regs.borrow_mut();
                let value = regs.read(reg);
                regs.clear_bits(reg, CLKPCE);
                value
            }
            Register::UCSR0A => {
                let regs = self.regs.borrow();
                let mut value = (regs.read(reg) & !RXC0) | UDRE0;
                if let Some(&(_, flags)) = self.rx.borrow().front() {
                    if regs.is_set(Register::UCSR0B, RXEN0) {
                        value |= RXC0 | flags;
                    }
                }
                value
            }
            Register::UCSR0B => {
                let regs = self.regs.borrow();
                let mut value = regs.read(reg) & !RXB80;
                if let Some(&(word, _)) = self.rx.borrow().front() {
                    if word & 0x100 != 0 {
                        value |= RXB80;
                    }
                }
                value
            }
            Register::UDR0 => self
                .rx
                .borrow_mut()
                .pop_front()
                .map(|(word, _)| word as u8)
                .unwrap_or(0),
            _ => self.regs.borrow().read(reg),
        }
    }

    fn write(&mut self, reg: Register, value: u8) {
        self.journal.push(Event::Write(reg, value));

        if let Some((port, 0)) = port_of(reg) {
            let r = port.registers();
            let regs = self.regs.get_mut();
            let level = regs.read(r.port);
            regs.write(r.port, level ^ value);
            return;
        }

        match reg {
            Register::UDR0 => self.tx.push(value),
            _ => self.regs.get_mut().write(reg, value),
        }
    }
}

impl Cpu for SimulatedMcu {
    fn sleep(&mut self) {
        let smcr = self.peek(Register::SMCR);
        self.journal.push(Event::Sleep { smcr });
    }

    fn watchdog_reset(&mut self) {
        self.journal.push(Event::WatchdogReset);
    }

    fn disable_interrupts(&mut self) -> bool {
        let regs = self.regs.get_mut();
        let was_enabled = regs.is_set(Register::SREG, SREG_I);
        regs.clear_bits(Register::SREG, SREG_I);
        self.journal.push(Event::InterruptsDisabled);
        was_enabled
    }

    fn enable_interrupts(&mut self) {
        self.regs.get_mut().set_bits(Register::SREG, SREG_I);
        self.journal.push(Event::InterruptsEnabled);
    }
}
