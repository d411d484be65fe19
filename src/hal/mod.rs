pub mod clock;
pub mod gpio;
pub mod power;
pub mod register;
pub mod system;
pub mod usart;

use ufmt::derive::uDebug;

pub use clock::{CalibrationRange, Clock, OscillatorCalibration, Prescaler};
pub use gpio::{board, Direction, Gpio, Input, IoPin, Output, Pin, PinConfig, PinState, Port};
pub use power::{Module, Power, PowerState, SleepMode};
#[cfg(target_arch = "avr")]
pub use register::Mmio;
pub use register::{interrupt_free, Cpu, Register, RegisterArray, RegisterFile};
pub use system::{ResetCauses, System, WatchdogConfig, WatchdogCycles, WatchdogMode};
pub use usart::{Usart, UsartConfig};

/// Any driver error, for code that drives several peripherals and wants `?`
/// across them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, uDebug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    Gpio(gpio::Error),
    Power(power::Error),
    System(system::Error),
    Clock(clock::Error),
    Usart(usart::Error),
}

impl From<gpio::Error> for Error {
    fn from(e: gpio::Error) -> Self {
        Error::Gpio(e)
    }
}

impl From<power::Error> for Error {
    fn from(e: power::Error) -> Self {
        Error::Power(e)
    }
}

impl From<system::Error> for Error {
    fn from(e: system::Error) -> Self {
        Error::System(e)
    }
}

impl From<clock::Error> for Error {
    fn from(e: clock::Error) -> Self {
        Error::Clock(e)
    }
}

impl From<usart::Error> for Error {
    fn from(e: usart::Error) -> Self {
        Error::Usart(e)
    }
}
