//! Internal RC oscillator calibration and system clock prescaler

use core::convert::Infallible;

use ufmt::derive::uDebug;

use super::register::{Register, RegisterFile};

// CLKPR
const CLKPS_MASK: u8 = 0x0F;
const CLKPCE: u8 = 1 << 7;

// OSCCAL
const CAL_RANGE_SHIFT: u8 = 7;
const CAL_MAGNITUDE_MASK: u8 = 0x7F;

#[derive(Clone, Copy, Debug, PartialEq, Eq, uDebug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Divisor index past 8 (256x), or a reserved CLKPS code read back
    InvalidPrescaler,
}

impl From<Infallible> for Error {
    fn from(never: Infallible) -> Self {
        match never {}
    }
}

/// OSCCAL range half. The two halves overlap in frequency.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, uDebug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum CalibrationRange {
    Low = 0,
    High = 1,
}

/// Oscillator calibration value.
///
/// Ordering compares the range first, then the magnitude. That is the order
/// of the raw OSCCAL byte, not the order of the resulting frequencies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, uDebug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OscillatorCalibration {
    pub range: CalibrationRange,
    /// 7 bits, higher is faster within a range
    pub magnitude: u8,
}

impl OscillatorCalibration {
    /// Magnitudes above 127 are truncated to 7 bits.
    pub const fn new(range: CalibrationRange, magnitude: u8) -> Self {
        Self {
            range,
            magnitude: magnitude & CAL_MAGNITUDE_MASK,
        }
    }

    pub const fn decode(raw: u8) -> Self {
        let range = match (raw >> CAL_RANGE_SHIFT) & 1 {
            0 => CalibrationRange::Low,
            _ => CalibrationRange::High,
        };
        Self {
            range,
            magnitude: raw & CAL_MAGNITUDE_MASK,
        }
    }

    pub const fn encode(self) -> u8 {
        ((self.range as u8) << CAL_RANGE_SHIFT) | (self.magnitude & CAL_MAGNITUDE_MASK)
    }
}

impl From<u8> for OscillatorCalibration {
    fn from(raw: u8) -> Self {
        Self::decode(raw)
    }
}

impl From<OscillatorCalibration> for u8 {
    fn from(cal: OscillatorCalibration) -> u8 {
        cal.encode()
    }
}

/// System clock division factor; discriminants are the CLKPS codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, uDebug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Prescaler {
    Div1 = 0,
    Div2 = 1,
    Div4 = 2,
    Div8 = 3,
    Div16 = 4,
    Div32 = 5,
    Div64 = 6,
    Div128 = 7,
    Div256 = 8,
}

impl Prescaler {
    pub const fn divisor(self) -> u16 {
        1 << self as u8
    }

    /// Core clock for a source frequency of `source_hz`.
    pub const fn apply(self, source_hz: u32) -> u32 {
        source_hz >> self as u8
    }
}

impl TryFrom<u8> for Prescaler {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self, Error> {
        match code {
            0 => Ok(Prescaler::Div1),
            1 => Ok(Prescaler::Div2),
            2 => Ok(Prescaler::Div4),
            3 => Ok(Prescaler::Div8),
            4 => Ok(Prescaler::Div16),
            5 => Ok(Prescaler::Div32),
            6 => Ok(Prescaler::Div64),
            7 => Ok(Prescaler::Div128),
            8 => Ok(Prescaler::Div256),
            _ => Err(Error::InvalidPrescaler),
        }
    }
}

pub struct Clock<R> {
    regs: R,
}

impl<R: RegisterFile> Clock<R> {
    pub fn new(regs: R) -> Self {
        Self { regs }
    }

    pub fn release(self) -> R {
        self.regs
    }

    pub fn read_oscillator_calibration(&self) -> OscillatorCalibration {
        OscillatorCalibration::decode(self.regs.read(Register::OSCCAL))
    }

    pub fn write_oscillator_calibration(&mut self, calibration: OscillatorCalibration) {
        trace!("clock: OSCCAL <- {=u8:#x}", calibration.encode());
        self.regs.write(Register::OSCCAL, calibration.encode());
    }

    /// Current division factor. Fails on a reserved CLKPS code.
    pub fn prescaler(&self) -> Result<Prescaler, Error> {
        Prescaler::try_from(self.regs.read(Register::CLKPR) & CLKPS_MASK)
    }

    /// True while a prescaler change has been enabled but not yet taken.
    #[inline]
    pub fn prescaler_change_pending(&self) -> bool {
        self.regs.is_set(Register::CLKPR, CLKPCE)
    }

    /// Switch the system clock division factor.
    ///
    /// Blocks until the change enable bit reads clear.
    pub fn change_prescaler<P>(&mut self, prescaler: P) -> Result<(), Error>
    where
        P: TryInto<Prescaler>,
        Error: From<P::Error>,
    {
        let prescaler = prescaler.try_into().map_err(|e| {
            let error = Error::from(e);
            warn!("clock: rejected prescaler, {}", error);
            error
        })?;

        trace!("clock: prescaler {}", prescaler);
        self.regs.write(Register::CLKPR, CLKPCE);
        while self.prescaler_change_pending() {}
        self.regs.write(Register::CLKPR, prescaler as u8);
        Ok(())
    }
}
