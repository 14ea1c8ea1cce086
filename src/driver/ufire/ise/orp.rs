//! Oxidation-reduction potential.
//!
//! ORP is the raw electrode potential. Eh adds the probe's own potential, kept
//! in an EEPROM slot on the board.

use std::ops::{Deref, DerefMut};

use embedded_hal::blocking::{
    delay::DelayMs,
    i2c::{Read, Write},
};

use super::{
    finite_or_invalid,
    registers::{INVALID, POTENTIAL_EEPROM_ADDRESS},
    Error, IseProbe,
};

pub struct Orp<P> {
    probe: P,
    pub orp: f32,
    pub eh: f32,
}

impl<P> Orp<P> {
    pub fn new(probe: P) -> Self {
        Self {
            probe,
            orp: INVALID,
            eh: INVALID,
        }
    }

    pub fn into_inner(self) -> P {
        self.probe
    }
}

impl<P: Deref> Deref for Orp<P> {
    type Target = P::Target;

    fn deref(&self) -> &Self::Target {
        &*self.probe
    }
}

impl<P: DerefMut> DerefMut for Orp<P> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.probe
    }
}

impl<P, I2C, D> Orp<P>
where
    P: DerefMut<Target = IseProbe<I2C, D>>,
    I2C: Read + Write,
    D: DelayMs<u16>,
{
    fn update(&mut self, potential: f32) {
        let mv = self.probe.mv;
        if !self.probe.mv_valid() {
            self.probe.mv = INVALID;
            self.orp = INVALID;
            self.eh = INVALID;
            return;
        }

        self.orp = mv;
        self.eh = finite_or_invalid(mv + potential, "Eh");
    }

    /// Measures ORP, in mV. `eh` is refreshed alongside.
    ///
    /// In non-blocking mode only the measurement is started and the cached ORP
    /// is returned; the probe potential is read by [`Orp::read_data`] once the
    /// device has settled.
    pub fn measure_orp(&mut self) -> Result<f32, Error> {
        self.probe.measure_mv()?;
        if !self.probe.blocking() {
            return Ok(self.orp);
        }

        let potential = self.get_probe_potential()?;
        self.update(potential);
        Ok(self.orp)
    }

    /// Recomputes ORP and Eh from the result registers, for non-blocking use.
    pub fn read_data(&mut self) -> Result<f32, Error> {
        self.probe.read_data()?;
        let potential = self.get_probe_potential()?;
        self.update(potential);
        Ok(self.orp)
    }

    pub fn set_probe_potential(&mut self, potential: f32) -> Result<(), Error> {
        self.probe.write_eeprom(POTENTIAL_EEPROM_ADDRESS, potential)
    }

    pub fn get_probe_potential(&mut self) -> Result<f32, Error> {
        self.probe.read_eeprom(POTENTIAL_EEPROM_ADDRESS)
    }
}
