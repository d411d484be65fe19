//! Register file access for the ATmega328P
//!
//! Every driver in this crate talks to hardware through [`RegisterFile`], a
//! byte-addressed view of the I/O part of the AVR data space. On the target
//! the view is backed by volatile accesses to the real registers ([`Mmio`]);
//! on the host it is a plain [`RegisterArray`]. Driver logic is identical in
//! both cases, only the binding changes.
//!
//! Addresses are data-space addresses as listed in the datasheet register
//! summary (the I/O-space address plus `0x20` for the low I/O registers).

/// Address of one 8-bit register in the data space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Register(u8);

impl Register {
    // GPIO, three registers per port
    pub const PINB: Register = Register(0x23);
    pub const DDRB: Register = Register(0x24);
    pub const PORTB: Register = Register(0x25);
    pub const PINC: Register = Register(0x26);
    pub const DDRC: Register = Register(0x27);
    pub const PORTC: Register = Register(0x28);
    pub const PIND: Register = Register(0x29);
    pub const DDRD: Register = Register(0x2A);
    pub const PORTD: Register = Register(0x2B);

    // System control
    pub const SMCR: Register = Register(0x53);
    pub const MCUSR: Register = Register(0x54);
    pub const MCUCR: Register = Register(0x55);
    pub const SREG: Register = Register(0x5F);
    pub const WDTCSR: Register = Register(0x60);
    pub const CLKPR: Register = Register(0x61);
    pub const PRR: Register = Register(0x64);
    pub const OSCCAL: Register = Register(0x66);

    // USART0
    pub const UCSR0A: Register = Register(0xC0);
    pub const UCSR0B: Register = Register(0xC1);
    pub const UCSR0C: Register = Register(0xC2);
    pub const UBRR0L: Register = Register(0xC4);
    pub const UBRR0H: Register = Register(0xC5);
    pub const UDR0: Register = Register(0xC6);

    /// Register at a raw data-space address.
    #[inline]
    pub const fn at(address: u8) -> Self {
        Register(address)
    }

    #[inline]
    pub const fn address(self) -> u8 {
        self.0
    }

    /// Register `count` bytes above this one.
    #[inline]
    pub(crate) const fn offset(self, count: u8) -> Self {
        Register(self.0 + count)
    }
}

/// Byte-wide access to the register file.
///
/// `read` takes `&self` like a volatile load: some registers change on read
/// (UDR0 pops the receive buffer), so implementations that emulate hardware
/// need interior mutability for that.
pub trait RegisterFile {
    fn read(&self, reg: Register) -> u8;

    fn write(&mut self, reg: Register, value: u8);

    /// Read-modify-write. Not atomic with respect to interrupts.
    #[inline]
    fn modify<F>(&mut self, reg: Register, f: F)
    where
        F: FnOnce(u8) -> u8,
    {
        let value = self.read(reg);
        self.write(reg, f(value));
    }

    #[inline]
    fn set_bits(&mut self, reg: Register, mask: u8) {
        self.modify(reg, |r| r | mask);
    }

    #[inline]
    fn clear_bits(&mut self, reg: Register, mask: u8) {
        self.modify(reg, |r| r & !mask);
    }

    #[inline]
    fn is_set(&self, reg: Register, mask: u8) -> bool {
        self.read(reg) & mask != 0
    }
}

/// CPU instructions the drivers need beyond plain register access.
pub trait Cpu: RegisterFile {
    /// Execute `sleep`. Returns once an enabled interrupt wakes the core.
    fn sleep(&mut self);

    /// Execute `wdr`.
    fn watchdog_reset(&mut self);

    /// Clear the global interrupt flag and report whether it was set.
    fn disable_interrupts(&mut self) -> bool;

    /// Set the global interrupt flag.
    fn enable_interrupts(&mut self);
}

impl<R: RegisterFile> RegisterFile for &mut R {
    #[inline]
    fn read(&self, reg: Register) -> u8 {
        (**self).read(reg)
    }

    #[inline]
    fn write(&mut self, reg: Register, value: u8) {
        (**self).write(reg, value)
    }
}

impl<C: Cpu> Cpu for &mut C {
    #[inline]
    fn sleep(&mut self) {
        (**self).sleep()
    }

    #[inline]
    fn watchdog_reset(&mut self) {
        (**self).watchdog_reset()
    }

    #[inline]
    fn disable_interrupts(&mut self) -> bool {
        (**self).disable_interrupts()
    }

    #[inline]
    fn enable_interrupts(&mut self) {
        (**self).enable_interrupts()
    }
}

/// Run `f` with global interrupts disabled, restoring the previous interrupt
/// flag afterwards.
#[inline]
pub fn interrupt_free<C, T, F>(cpu: &mut C, f: F) -> T
where
    C: Cpu,
    F: FnOnce(&mut C) -> T,
{
    let was_enabled = cpu.disable_interrupts();
    let result = f(cpu);
    if was_enabled {
        cpu.enable_interrupts();
    }
    result
}

/// Host-side register file: 256 plain bytes covering the I/O data space.
///
/// No hardware side effects are emulated. Writing PINx does not toggle PORTx,
/// status flags never change by themselves and the CPU instructions are
/// no-ops, apart from the global interrupt flag which lives in SREG bit 7
/// like on the part.
#[derive(Clone, Debug)]
pub struct RegisterArray {
    bytes: [u8; 256],
}

impl RegisterArray {
    pub const fn new() -> Self {
        Self { bytes: [0; 256] }
    }

    /// Zero every register.
    pub fn reset(&mut self) {
        self.bytes = [0; 256];
    }

    pub fn as_bytes(&self) -> &[u8; 256] {
        &self.bytes
    }
}

impl Default for RegisterArray {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterFile for RegisterArray {
    #[inline]
    fn read(&self, reg: Register) -> u8 {
        self.bytes[reg.address() as usize]
    }

    #[inline]
    fn write(&mut self, reg: Register, value: u8) {
        self.bytes[reg.address() as usize] = value;
    }
}

const SREG_I: u8 = 1 << 7;

impl Cpu for RegisterArray {
    fn sleep(&mut self) {}

    fn watchdog_reset(&mut self) {}

    fn disable_interrupts(&mut self) -> bool {
        let was_enabled = self.is_set(Register::SREG, SREG_I);
        self.clear_bits(Register::SREG, SREG_I);
        was_enabled
    }

    fn enable_interrupts(&mut self) {
        self.set_bits(Register::SREG, SREG_I);
    }
}

/// The real register file of the running ATmega328P.
#[cfg(target_arch = "avr")]
#[derive(Debug)]
pub struct Mmio {
    _private: (),
}

#[cfg(target_arch = "avr")]
impl Mmio {
    /// Claim the register file. Returns `None` if the device peripherals
    /// were already taken.
    pub fn take() -> Option<Self> {
        avr_device::atmega328p::Peripherals::take().map(|_| Self { _private: () })
    }

    /// Access the register file without claiming it.
    ///
    /// # Safety
    ///
    /// Copies of the handle alias the same hardware registers. The caller is
    /// responsible for keeping concurrent users (including ISRs) from
    /// interleaving multi-step register sequences.
    pub unsafe fn steal() -> Self {
        Self { _private: () }
    }
}

#[cfg(target_arch = "avr")]
impl RegisterFile for Mmio {
    #[inline(always)]
    fn read(&self, reg: Register) -> u8 {
        unsafe { core::ptr::read_volatile(reg.address() as usize as *const u8) }
    }

    #[inline(always)]
    fn write(&mut self, reg: Register, value: u8) {
        unsafe { core::ptr::write_volatile(reg.address() as usize as *mut u8, value) }
    }
}

#[cfg(target_arch = "avr")]
impl Cpu for Mmio {
    #[inline(always)]
    fn sleep(&mut self) {
        avr_device::asm::sleep();
    }

    #[inline(always)]
    fn watchdog_reset(&mut self) {
        avr_device::asm::wdr();
    }

    #[inline(always)]
    fn disable_interrupts(&mut self) -> bool {
        let was_enabled = self.is_set(Register::SREG, SREG_I);
        avr_device::interrupt::disable();
        was_enabled
    }

    #[inline(always)]
    fn enable_interrupts(&mut self) {
        unsafe { avr_device::interrupt::enable() };
    }
}
