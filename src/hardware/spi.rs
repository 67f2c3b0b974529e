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

//! Structures and tools for interfacing via Serial Peripheral Interface (SPI).

use std::{sync::Mutex, thread::sleep, time::Duration};

use crate::error::RtuError;

use super::GpioPin;

/// An SPI bus. Contains enough information to talk on SPI, but no
/// per-device data.
pub struct Bus<P: GpioPin> {
    /// The clock period: the time between two rising edges on the clock.
    /// The length of a pulse is half this period.
    pub period: Duration,
    /// The clock pin, actuated on a regular timescale during a transfer.
    pub pin_clk: P,
    /// The Master Output - Slave Input pin.
    pub pin_mosi: P,
    /// The Master Input - Slave Output pin.
    pub pin_miso: P,
}

/// An SPI device: a wrapper for a single chip-selection pin on a shared bus.
pub struct Device<'a, P: GpioPin> {
    /// A reference to the bus this device lives on.
    bus: &'a Mutex<Bus<P>>,
    /// The chip selection pin.
    pin_cs: P,
}

impl<'a, P: GpioPin> Device<'a, P> {
    /// Construct a new device over an existing bus.
    pub fn new(bus: &'a Mutex<Bus<P>>, pin_cs: P) -> Device<'a, P> {
        Device { bus, pin_cs }
    }

    #[must_use]
    /// Get the clock period of this device.
    ///
    /// # Panics
    ///
    /// Panics if the bus mutex is poisoned.
    pub fn clock_period(&self) -> Duration {
        self.bus.lock().unwrap().period
    }

    /// Perform a big-endian SPI transfer: the most significant bit of each
    /// byte goes out (and comes back) first.
    ///
    /// # Panics
    ///
    /// Panics if `outgoing` and `incoming` differ in length.
    ///
    /// # Errors
    ///
    /// Returns an error if a GPIO operation fails or the bus lock is
    /// poisoned.
    pub fn transfer(&mut self, outgoing: &[u8], incoming: &mut [u8]) -> Result<(), RtuError> {
        assert_eq!(outgoing.len(), incoming.len());
        let mut bus_handle = self.bus.lock()?;
        let half_period = bus_handle.period / 2;

        // pull chip select down to begin talking
        self.pin_cs.write(false)?;

        for (byte_out, byte_in) in outgoing.iter().zip(incoming.iter_mut()) {
            for bit_idx in (0..8).rev() {
                bus_handle.pin_mosi.write((1 << bit_idx & byte_out) != 0)?;
                sleep(half_period);
                // rising edge on the clock corresponds to read from device
                bus_handle.pin_clk.write(true)?;
                let bit_in = u8::from(bus_handle.pin_miso.read()?);
                *byte_in |= bit_in << bit_idx;

                sleep(half_period);
                // falling edge on the clock corresponds to write to device
                bus_handle.pin_clk.write(false)?;
            }
        }

        // bring chip select back up to let it know that we're done talking
        self.pin_cs.write(true)?;

        Ok(())
    }
}
