//! Sleep modes and peripheral power reduction

use core::convert::Infallible;

use ufmt::derive::uDebug;

use super::register::{Cpu, Register};

// SMCR
const SE: u8 = 1 << 0;
const SM_SHIFT: u8 = 1;
const SM_MASK: u8 = 0b111 << SM_SHIFT;

// PRR bit 4 has no module behind it
const PRR_RESERVED: u8 = 1 << 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq, uDebug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Sleep mode code is reserved or out of range
    IllegalSleepMode,
    /// Power reduction bit 4, which controls nothing
    ReservedBit,
    /// Module bit position above 7
    UnknownModule,
    /// A module was asked to be powered on and off in the same call
    SameBitSetForOnAndOff,
}

impl From<Infallible> for Error {
    fn from(never: Infallible) -> Self {
        match never {}
    }
}

/// Sleep modes; discriminants are the SM2..0 field values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, uDebug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum SleepMode {
    Idle = 0,
    AdcNoiseReduction = 1,
    PowerDown = 2,
    PowerSave = 3,
    Standby = 6,
    ExtendedStandby = 7,
}

impl TryFrom<u8> for SleepMode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Error> {
        match value {
            0 => Ok(SleepMode::Idle),
            1 => Ok(SleepMode::AdcNoiseReduction),
            2 => Ok(SleepMode::PowerDown),
            3 => Ok(SleepMode::PowerSave),
            6 => Ok(SleepMode::Standby),
            7 => Ok(SleepMode::ExtendedStandby),
            _ => Err(Error::IllegalSleepMode),
        }
    }
}

/// Peripherals with a power reduction bit; discriminants are PRR bit
/// positions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, uDebug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Module {
    Adc = 0,
    Usart0 = 1,
    Spi = 2,
    Timer1 = 3,
    Timer0 = 5,
    Timer2 = 6,
    Twi = 7,
}

impl Module {
    /// PRR mask of this module, for building bulk change masks.
    #[inline]
    pub const fn bit(self) -> u8 {
        1 << self as u8
    }
}

impl TryFrom<u8> for Module {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Error> {
        match value {
            0 => Ok(Module::Adc),
            1 => Ok(Module::Usart0),
            2 => Ok(Module::Spi),
            3 => Ok(Module::Timer1),
            4 => Err(Error::ReservedBit),
            5 => Ok(Module::Timer0),
            6 => Ok(Module::Timer2),
            7 => Ok(Module::Twi),
            _ => Err(Error::UnknownModule),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, uDebug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PowerState {
    Off,
    On,
}

impl From<bool> for PowerState {
    fn from(on: bool) -> Self {
        if on {
            PowerState::On
        } else {
            PowerState::Off
        }
    }
}

/// Check a bulk power change request.
pub fn validate_power_masks(power_off: u8, power_on: u8) -> Result<(), Error> {
    if (power_off | power_on) & PRR_RESERVED != 0 {
        return Err(Error::ReservedBit);
    }
    // Identical masks (the empty pair included) say nothing unambiguous
    if power_off & power_on != 0 || power_off == power_on {
        return Err(Error::SameBitSetForOnAndOff);
    }
    Ok(())
}

/// New PRR value for a validated bulk change. Bits in neither mask are kept.
#[inline]
pub const fn apply_power_masks(prr: u8, power_off: u8, power_on: u8) -> u8 {
    (prr | power_off) & !power_on
}

pub struct Power<C> {
    cpu: C,
}

impl<C: Cpu> Power<C> {
    pub fn new(cpu: C) -> Self {
        Self { cpu }
    }

    pub fn release(self) -> C {
        self.cpu
    }

    /// Select `mode` and put the core to sleep until an interrupt wakes it.
    ///
    /// The sleep enable bit is cleared again before returning, whatever woke
    /// the core.
    pub fn set_sleep_mode<M>(&mut self, mode: M) -> Result<(), Error>
    where
        M: TryInto<SleepMode>,
        Error: From<M::Error>,
    {
        let mode = mode.try_into().map_err(|e| {
            let error = Error::from(e);
            warn!("power: rejected sleep mode, {}", error);
            error
        })?;

        trace!("power: sleep in {}", mode);
        self.cpu
            .modify(Register::SMCR, |r| (r & !SM_MASK) | ((mode as u8) << SM_SHIFT));
        self.enable_sleep();
        self.cpu.sleep();
        self.disable_sleep();
        Ok(())
    }

    /// Mode currently selected in SMCR, if it is a legal one.
    pub fn sleep_mode(&self) -> Result<SleepMode, Error> {
        SleepMode::try_from((self.cpu.read(Register::SMCR) & SM_MASK) >> SM_SHIFT)
    }

    #[inline]
    fn enable_sleep(&mut self) {
        self.cpu.set_bits(Register::SMCR, SE);
    }

    #[inline]
    fn disable_sleep(&mut self) {
        self.cpu.clear_bits(Register::SMCR, SE);
    }

    /// Gate or ungate the clock of one module. A module that was off may need
    /// to be reinitialised.
    pub fn set_module_power<M, S>(&mut self, module: M, state: S) -> Result<(), Error>
    where
        M: TryInto<Module>,
        S: Into<PowerState>,
        Error: From<M::Error>,
    {
        let module = module.try_into().map_err(|e| {
            let error = Error::from(e);
            warn!("power: rejected module, {}", error);
            error
        })?;

        match state.into() {
            PowerState::On => self.cpu.clear_bits(Register::PRR, module.bit()),
            PowerState::Off => self.cpu.set_bits(Register::PRR, module.bit()),
        }
        Ok(())
    }

    pub fn module_power(&self, module: Module) -> PowerState {
        PowerState::from(!self.cpu.is_set(Register::PRR, module.bit()))
    }

    /// Power several modules off and on with a single PRR write.
    ///
    /// Masks are ORs of [`Module::bit`]. Modules in neither mask keep their
    /// state.
    pub fn change_module_powers(&mut self, power_off: u8, power_on: u8) -> Result<(), Error> {
        if let Err(error) = validate_power_masks(power_off, power_on) {
            warn!("power: rejected masks {=u8:#x}/{=u8:#x}, {}", power_off, power_on, error);
            return Err(error);
        }

        let prr = self.cpu.read(Register::PRR);
        let new_state = apply_power_masks(prr, power_off, power_on);
        trace!("power: PRR {=u8:#x} -> {=u8:#x}", prr, new_state);
        self.cpu.write(Register::PRR, new_state);
        Ok(())
    }
}
