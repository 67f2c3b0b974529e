/*
  rtuhub, a PROFINET sensor hub / remote terminal unit core.
  Copyright (C) 2026 rtuhub contributors.

  rtuhub is free software: you can redistribute it and/or modify
  it under the terms of the GNU General Public License as published by
  the Free Software Foundation, either version 3 of the License, or
  (at your option) any later version.

  rtuhub is distributed in the hope that it will be useful,
  but WITHOUT ANY WARRANTY; without even the implied warranty of
  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
  GNU General Public License for more details.

  You should have received a copy of the GNU General Public License
  along with this program.  If not, see <http://www.gnu.org/licenses/>.
*/

//! Definitions for the physical I/O primitives the sensor and actuator
//! drivers consume: GPIO pins and SPI-bus ADCs (spec.md §6.3).
//!
//! The goal of this module is to abstract away exactly how the hardware
//! talks so the sensor/actuator driver dispatch in `sensor_manager` and
//! `actuator` can focus on business logic.

pub mod spi;

use std::time::Duration;

use gpio_cdev::LineHandle;

use crate::error::RtuError;

/// A trait for GPIO pins.
pub trait GpioPin {
    /// Perform a GPIO read on this pin.
    /// Returns `true` if the pin is pulled high, and `false` otherwise.
    ///
    /// # Errors
    ///
    /// This can return an error if the read failed.
    fn read(&mut self) -> Result<bool, gpio_cdev::Error>;

    /// Perform a GPIO write on this pin, setting the pin's logic level to `value`.
    ///
    /// # Errors
    ///
    /// This can return an error if the write failed.
    fn write(&mut self, value: bool) -> Result<(), gpio_cdev::Error>;
}

/// A generic trait for an ADC (Analog-to-Digital Converter), used for the
/// `Adc` sensor variant (spec.md §3) and for dependency-injection testing.
pub trait Adc {
    /// Perform an ADC read.
    ///
    /// To account for multi-channel ADCs, `channel` is the index of the channel.
    /// On an 8-channel ADC, the valid values for the channel would be between 0 and 7.
    ///
    /// # Errors
    ///
    /// This function will return an error if we are unable to read the ADC value.
    fn read(&mut self, channel: u8) -> Result<u16, RtuError>;
}

/// A structure for interfacing with the MCP3208 ADC: an 8-channel SPI ADC
/// with 12 bits of resolution.
pub struct Mcp3208<'a, P: GpioPin> {
    /// The SPI device associated with this ADC.
    device: spi::Device<'a, P>,
}

/// A structure for testing GPIO writes.
///
/// A `ListenerPin` stores the history of all writes to it.
/// When read from, a `ListenerPin` will return the last written value of the pin.
pub struct ListenerPin(Vec<bool>);

impl<'a, P: GpioPin> Mcp3208<'a, P> {
    /// The minimum frequency at which the SPI clock can operate for the MCP3208 to work correctly.
    pub const SPI_MIN_FREQUENCY: u64 = 10_000;

    #[must_use]
    /// Construct a new `Mcp3208`.
    ///
    /// # Panics
    ///
    /// Panics if the clock period of `device` is slower than the MCP3208's
    /// minimum operating frequency.
    pub fn new(device: spi::Device<'a, P>) -> Mcp3208<'a, P> {
        assert!(device.clock_period() < Duration::from_micros(1_000_000 / Mcp3208::<P>::SPI_MIN_FREQUENCY));
        Mcp3208 { device }
    }
}

impl ListenerPin {
    #[must_use]
    /// Construct a new `ListenerPin` with only one reading in its history.
    pub fn new(last_value: bool) -> ListenerPin {
        ListenerPin(vec![last_value])
    }

    #[must_use]
    /// Get access to the history inside this pin.
    pub fn history(&self) -> &Vec<bool> {
        &self.0
    }
}

impl<P: GpioPin> Adc for Mcp3208<'_, P> {
    /// Perform an ADC read on channel `channel`, returning the raw 12-bit
    /// reading. Blocking.
    ///
    /// # Panics
    ///
    /// Panics if `channel` is not in `0..8`.
    ///
    /// # Errors
    ///
    /// Returns an error if the SPI transfer fails.
    fn read(&mut self, channel: u8) -> Result<u16, RtuError> {
        assert!((0..8).contains(&channel));

        // Two "high" bits plus the channel select for single-ended mode.
        let outgoing = [0x18 | channel, 0, 0];
        let mut incoming = [0; 3];
        assert_eq!(outgoing.len(), incoming.len());

        self.device.transfer(&outgoing, &mut incoming)?;

        // The back two bytes of `incoming` carry the reading, big-endian.
        Ok(u16::from_be_bytes([incoming[1], incoming[2]]))
    }
}

impl GpioPin for ListenerPin {
    fn read(&mut self) -> Result<bool, gpio_cdev::Error> {
        Ok(*self.0.last().unwrap())
    }

    fn write(&mut self, value: bool) -> Result<(), gpio_cdev::Error> {
        self.0.push(value);
        Ok(())
    }
}

impl GpioPin for LineHandle {
    fn read(&mut self) -> Result<bool, gpio_cdev::Error> {
        Ok(1 == self.get_value()?)
    }

    fn write(&mut self, value: bool) -> Result<(), gpio_cdev::Error> {
        let int_value = u8::from(value);
        self.set_value(int_value)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listener_pin_read_returns_last_write() {
        let mut pin = ListenerPin::new(false);
        pin.write(true).unwrap();
        pin.write(false).unwrap();
        assert_eq!(pin.read().unwrap(), false);
        assert_eq!(pin.history(), &vec![false, true, false]);
    }
}
