//! Watchdog timer and reset cause
//!
//! WDTCSR only accepts a new configuration in the write that immediately
//! follows the WDCE|WDE unlock write, and only while WDRF in MCUSR is clear.
//! [`System::set_watchdog`] runs that sequence with interrupts disabled.

use core::convert::Infallible;

use ufmt::derive::uDebug;

use super::register::{Cpu, Register};

// MCUSR
const PORF: u8 = 1 << 0;
const EXTRF: u8 = 1 << 1;
const BORF: u8 = 1 << 2;
const WDRF: u8 = 1 << 3;

// WDTCSR
const WDP_LOW_MASK: u8 = 0b111;
const WDE: u8 = 1 << 3;
const WDCE: u8 = 1 << 4;
const WDP3: u8 = 1 << 5;
const WDIE: u8 = 1 << 6;

#[derive(Clone, Copy, Debug, PartialEq, Eq, uDebug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    InvalidWatchdogMode,
    /// Cycle level above 9; WDP codes 10-15 are reserved
    InvalidWatchdogCycles,
}

impl From<Infallible> for Error {
    fn from(never: Infallible) -> Self {
        match never {}
    }
}

/// What the watchdog does on time-out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, uDebug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WatchdogMode {
    Disabled,
    Interrupt,
    SystemReset,
    InterruptAndSystemReset,
}

impl WatchdogMode {
    const fn bits(self) -> u8 {
        match self {
            WatchdogMode::Disabled => 0,
            WatchdogMode::Interrupt => WDIE,
            WatchdogMode::SystemReset => WDE,
            WatchdogMode::InterruptAndSystemReset => WDIE | WDE,
        }
    }

    const fn from_bits(wdtcsr: u8) -> Self {
        match (wdtcsr & WDIE != 0, wdtcsr & WDE != 0) {
            (false, false) => WatchdogMode::Disabled,
            (true, false) => WatchdogMode::Interrupt,
            (false, true) => WatchdogMode::SystemReset,
            (true, true) => WatchdogMode::InterruptAndSystemReset,
        }
    }
}

impl TryFrom<u8> for WatchdogMode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Error> {
        match value {
            0 => Ok(WatchdogMode::Disabled),
            1 => Ok(WatchdogMode::Interrupt),
            2 => Ok(WatchdogMode::SystemReset),
            3 => Ok(WatchdogMode::InterruptAndSystemReset),
            _ => Err(Error::InvalidWatchdogMode),
        }
    }
}

/// Watchdog oscillator cycles before time-out. At 128 kHz `K2` is about
/// 16 ms and `K1024` about 8 s.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, uDebug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum WatchdogCycles {
    K2 = 0,
    K4 = 1,
    K8 = 2,
    K16 = 3,
    K32 = 4,
    K64 = 5,
    K128 = 6,
    K256 = 7,
    K512 = 8,
    K1024 = 9,
}

impl TryFrom<u8> for WatchdogCycles {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Error> {
        match value {
            0 => Ok(WatchdogCycles::K2),
            1 => Ok(WatchdogCycles::K4),
            2 => Ok(WatchdogCycles::K8),
            3 => Ok(WatchdogCycles::K16),
            4 => Ok(WatchdogCycles::K32),
            5 => Ok(WatchdogCycles::K64),
            6 => Ok(WatchdogCycles::K128),
            7 => Ok(WatchdogCycles::K256),
            8 => Ok(WatchdogCycles::K512),
            9 => Ok(WatchdogCycles::K1024),
            _ => Err(Error::InvalidWatchdogCycles),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, uDebug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WatchdogConfig {
    pub mode: WatchdogMode,
    pub cycles: WatchdogCycles,
}

impl WatchdogConfig {
    pub const DISABLED: WatchdogConfig = WatchdogConfig {
        mode: WatchdogMode::Disabled,
        cycles: WatchdogCycles::K2,
    };

    pub const fn new(mode: WatchdogMode, cycles: WatchdogCycles) -> Self {
        Self { mode, cycles }
    }

    /// WDTCSR value. The cycle field is encoded whatever the mode.
    pub const fn encode(self) -> u8 {
        let level = self.cycles as u8;
        self.mode.bits() | (level & WDP_LOW_MASK) | ((level >> 3) << 5)
    }

    /// Decode a WDTCSR value. Flag bits (WDIF, WDCE) are ignored.
    pub fn decode(wdtcsr: u8) -> Result<Self, Error> {
        let level = (wdtcsr & WDP_LOW_MASK) | ((wdtcsr & WDP3) >> 2);
        Ok(Self {
            mode: WatchdogMode::from_bits(wdtcsr),
            cycles: WatchdogCycles::try_from(level)?,
        })
    }
}

impl TryFrom<(u8, u8)> for WatchdogConfig {
    type Error = Error;

    fn try_from((mode, cycles): (u8, u8)) -> Result<Self, Error> {
        Ok(Self::new(mode.try_into()?, cycles.try_into()?))
    }
}

/// Reset cause flags, the low nibble of MCUSR. Several may be set at once.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, uDebug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ResetCauses(u8);

impl ResetCauses {
    pub const POWER_ON: ResetCauses = ResetCauses(PORF);
    pub const EXTERNAL: ResetCauses = ResetCauses(EXTRF);
    pub const BROWN_OUT: ResetCauses = ResetCauses(BORF);
    pub const WATCHDOG: ResetCauses = ResetCauses(WDRF);

    const MASK: u8 = PORF | EXTRF | BORF | WDRF;

    pub const fn from_bits_truncate(bits: u8) -> Self {
        ResetCauses(bits & Self::MASK)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, other: ResetCauses) -> bool {
        self.0 & other.0 == other.0
    }
}

impl core::ops::BitOr for ResetCauses {
    type Output = ResetCauses;

    fn bitor(self, rhs: ResetCauses) -> ResetCauses {
        ResetCauses(self.0 | rhs.0)
    }
}

pub struct System<C> {
    cpu: C,
}

impl<C: Cpu> System<C> {
    pub fn new(cpu: C) -> Self {
        Self { cpu }
    }

    pub fn release(self) -> C {
        self.cpu
    }

    /// Reconfigure the watchdog.
    ///
    /// Runs with interrupts disabled and leaves global interrupts enabled,
    /// whatever their state on entry.
    pub fn set_watchdog(&mut self, config: WatchdogConfig) {
        let value = config.encode();
        trace!("system: watchdog {}, WDTCSR <- {=u8:#x}", config, value);

        self.cpu.disable_interrupts();
        self.cpu.watchdog_reset();
        // WDRF forces WDE on, so it has to go before WDE can be cleared
        self.cpu.clear_bits(Register::MCUSR, WDRF);
        timed_watchdog_write(&mut self.cpu, value);
        self.cpu.enable_interrupts();
    }

    /// Restart the watchdog count.
    #[inline]
    pub fn reset_watchdog(&mut self) {
        self.cpu.watchdog_reset();
    }

    /// Current watchdog configuration.
    pub fn watchdog(&self) -> Result<WatchdogConfig, Error> {
        WatchdogConfig::decode(self.cpu.read(Register::WDTCSR))
    }

    /// Read and clear the reset cause flags.
    ///
    /// The read and the clearing write are not protected against an
    /// interrupt handler touching MCUSR in between; wrap the call in
    /// [`interrupt_free`](super::register::interrupt_free) if one can.
    pub fn reset_status(&mut self) -> ResetCauses {
        let causes = ResetCauses::from_bits_truncate(self.cpu.read(Register::MCUSR));
        self.cpu.write(Register::MCUSR, 0);
        debug!("system: reset causes {=u8:#x}", causes.bits());
        causes
    }
}

/// Unlock WDTCSR and write `value` in the next access. Nothing else may
/// touch the register file between the two writes.
#[inline(always)]
fn timed_watchdog_write<C: Cpu>(cpu: &mut C, value: u8) {
    let unlock = cpu.read(Register::WDTCSR) | WDCE | WDE;
    cpu.write(Register::WDTCSR, unlock);
    cpu.write(Register::WDTCSR, value);
}
