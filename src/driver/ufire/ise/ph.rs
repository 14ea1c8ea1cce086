//! pH on top of the raw mV probe.
//!
//! The conversion assumes the Nernstian slope of a standard electrode at 25°C
//! and must stay exactly as is: stored calibrations were fit against it.

use std::ops::{Deref, DerefMut};

use embedded_hal::blocking::{
    delay::DelayMs,
    i2c::{Read, Write},
};

use super::{
    registers::{INVALID, TEMP_DISCONNECTED},
    Error, IseProbe,
};

pub const MV_PER_PH: f64 = 59.2;
pub const TEMP_CORRECTION_FACTOR: f64 = 0.03;

pub fn mv_to_ph(mv: f32) -> f32 {
    (7.0 - f64::from(mv) / MV_PER_PH).abs() as f32
}

pub fn ph_to_mv(ph: f32) -> f32 {
    (f64::from(7.0 - ph) * MV_PER_PH) as f32
}

/// Coarse correction added to a raw pH reading taken at `temp_c`.
///
/// Zero whenever the reading rounds to 7 or the temperature rounds to within
/// 10 degrees of 25°C.
pub fn temperature_correction(ph: f32, temp_c: f32) -> f32 {
    let distance_from_7 = (7.0 - ph.round()).abs();
    let distance_from_25 = ((25.0 - temp_c.round()).abs() / 10.0).floor();
    let multiplier =
        (f64::from(distance_from_25 * distance_from_7) * TEMP_CORRECTION_FACTOR) as f32;

    if (ph >= 8.0 && temp_c >= 35.0) || (ph <= 6.0 && temp_c <= 15.0) {
        -multiplier
    } else {
        multiplier
    }
}

/// Returns `(pH, pOH)`, both -1 unless pH is finite and in (0, 14].
pub fn ph_validity_gate(ph: f32) -> (f32, f32) {
    if !ph.is_finite() || ph <= 0.0 || ph > 14.0 {
        (INVALID, INVALID)
    } else {
        (ph, (ph - 14.0).abs())
    }
}

pub struct Ph<P> {
    probe: P,
    pub ph: f32,
    pub poh: f32,
    compensation: Option<f32>,
}

impl<P> Ph<P> {
    pub fn new(probe: P) -> Self {
        Self {
            probe,
            ph: INVALID,
            poh: INVALID,
            compensation: None,
        }
    }

    pub fn into_inner(self) -> P {
        self.probe
    }
}

impl<P: Deref> Deref for Ph<P> {
    type Target = P::Target;

    fn deref(&self) -> &Self::Target {
        &*self.probe
    }
}

impl<P: DerefMut> DerefMut for Ph<P> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.probe
    }
}

impl<P, I2C, D> Ph<P>
where
    P: DerefMut<Target = IseProbe<I2C, D>>,
    I2C: Read + Write,
    D: DelayMs<u16>,
{
    fn update(&mut self, mv: f32) -> f32 {
        if mv == INVALID {
            self.ph = INVALID;
            self.poh = INVALID;
            return INVALID;
        }

        let mut ph = mv_to_ph(mv);
        if let Some(temp_c) = self.compensation.filter(|t| *t != TEMP_DISCONNECTED) {
            ph += temperature_correction(ph, temp_c);
        }

        (self.ph, self.poh) = ph_validity_gate(ph);
        self.ph
    }

    /// Measures pH. With `Some(temp_c)` the device's temperature compensation
    /// is switched on and the reading is corrected for `temp_c`, unless it is
    /// the disconnected sentinel.
    pub fn measure_ph(&mut self, temp_c: Option<f32>) -> Result<f32, Error> {
        if temp_c.is_some() {
            self.probe.use_temperature_compensation(true)?;
        }
        self.compensation = temp_c;

        let mv = self.probe.measure_mv()?;
        Ok(self.update(mv))
    }

    /// Recomputes pH from the result registers, for non-blocking use.
    pub fn read_data(&mut self) -> Result<f32, Error> {
        self.probe.read_data()?;
        let mv = self.probe.mv;
        Ok(self.update(mv))
    }

    /// Returns the stored offset, in mV.
    pub fn calibrate_single(&mut self, solution_ph: f32) -> Result<f32, Error> {
        self.probe.calibrate_single(ph_to_mv(solution_ph))
    }

    pub fn calibrate_probe_low(&mut self, solution_ph: f32) -> Result<f32, Error> {
        let reading = self.probe.calibrate_probe_low(ph_to_mv(solution_ph))?;
        Ok(mv_to_ph(reading))
    }

    pub fn calibrate_probe_high(&mut self, solution_ph: f32) -> Result<f32, Error> {
        let reading = self.probe.calibrate_probe_high(ph_to_mv(solution_ph))?;
        Ok(mv_to_ph(reading))
    }

    pub fn get_calibrate_low_reference(&mut self) -> Result<f32, Error> {
        Ok(mv_to_ph(self.probe.get_calibrate_low_reference()?))
    }

    pub fn get_calibrate_low_reading(&mut self) -> Result<f32, Error> {
        Ok(mv_to_ph(self.probe.get_calibrate_low_reading()?))
    }

    pub fn get_calibrate_high_reference(&mut self) -> Result<f32, Error> {
        Ok(mv_to_ph(self.probe.get_calibrate_high_reference()?))
    }

    pub fn get_calibrate_high_reading(&mut self) -> Result<f32, Error> {
        Ok(mv_to_ph(self.probe.get_calibrate_high_reading()?))
    }
}
