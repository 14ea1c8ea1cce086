//! Driver for the uFire ISE probe interface (pH / ORP / raw mV + temperature).
//!
//! The board exposes a flat register file. Floats are stored as four
//! little-endian bytes and read back one byte per transaction; work is started
//! by writing a task code to the task register and waiting for it to settle.

use bytes::{Buf, BufMut, BytesMut};
use embedded_hal::blocking::{
    delay::DelayMs,
    i2c::{Read, Write},
};
use thiserror::Error;
use tracing::{debug, trace, warn};

pub mod calibration;
pub mod orp;
pub mod ph;
pub mod registers;

#[cfg(test)]
pub(crate) mod sim;

pub use calibration::{Calibration, DeviceState};
use registers::{addresses, config_bits, timing, Task};

#[derive(Debug, Error)]
pub enum Error {
    #[error("i2c error")]
    I2c,
    #[error("invalid i2c address {0:#04x}")]
    InvalidAddress(u8),
}

pub struct IseProbe<I2C, D> {
    pub i2c: I2C,
    delay: D,
    address: u8,
    blocking: bool,

    /// Last measured electrode potential.
    pub mv: f32,
    mv_valid: bool,
    /// Last measured or manually set temperature.
    pub temp_c: f32,
    pub temp_f: f32,
}

/// Fahrenheit for a Celsius reading, keeping the disconnected sentinel intact.
pub fn to_fahrenheit(temp_c: f32) -> f32 {
    if temp_c == registers::TEMP_DISCONNECTED {
        registers::TEMP_DISCONNECTED
    } else {
        ((temp_c * 9.0) / 5.0) + 32.0
    }
}

pub(crate) fn finite_or_invalid(value: f32, what: &str) -> f32 {
    if value.is_finite() {
        value
    } else {
        warn!("non-finite {what} reading ({value}), reporting as invalid");
        registers::INVALID
    }
}

impl<I2C, D> IseProbe<I2C, D> {
    pub fn new(i2c: I2C, delay: D) -> Self {
        Self::with_address(i2c, delay, registers::DEFAULT_ADDRESS)
    }

    pub fn with_address(i2c: I2C, delay: D, address: u8) -> Self {
        Self {
            i2c,
            delay,
            address,
            blocking: true,
            mv: registers::INVALID,
            mv_valid: false,
            temp_c: registers::INVALID,
            temp_f: registers::INVALID,
        }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    /// In non-blocking mode measurement commands return immediately with the
    /// cached value; call [`IseProbe::read_data`] once the settle time passed.
    pub fn set_blocking(&mut self, blocking: bool) {
        self.blocking = blocking;
    }

    pub fn blocking(&self) -> bool {
        self.blocking
    }

    /// Whether `mv` holds a real reading rather than the -1 stand-in for a
    /// missing or non-finite one.
    pub fn mv_valid(&self) -> bool {
        self.mv_valid
    }

    pub fn release(self) -> (I2C, D) {
        (self.i2c, self.delay)
    }
}

impl<I2C, D> IseProbe<I2C, D>
where
    I2C: Read + Write,
    D: DelayMs<u16>,
{
    fn change_register(&mut self, register: u8) -> Result<(), Error> {
        self.i2c
            .write(self.address, &[register])
            .map_err(|_| Error::I2c)?;
        self.delay.delay_ms(timing::BUS_SETTLE);
        Ok(())
    }

    fn send_command(&mut self, task: Task) -> Result<(), Error> {
        trace!("sending task {task:?} to {:#04x}", self.address);
        self.i2c
            .write(self.address, &[addresses::TASK, task as u8])
            .map_err(|_| Error::I2c)?;
        self.delay.delay_ms(timing::BUS_SETTLE);
        Ok(())
    }

    fn write_register(&mut self, register: u8, value: f32) -> Result<(), Error> {
        let mut frame = BytesMut::with_capacity(5);
        frame.put_u8(register);
        frame.put_f32_le(value);

        self.i2c
            .write(self.address, &frame[..])
            .map_err(|_| Error::I2c)?;
        self.delay.delay_ms(timing::BUS_SETTLE);
        Ok(())
    }

    fn read_register(&mut self, register: u8) -> Result<f32, Error> {
        self.change_register(register)?;

        let mut raw = [0u8; 4];
        for byte in raw.iter_mut() {
            let mut buf = [0u8; 1];
            self.i2c
                .read(self.address, &mut buf)
                .map_err(|_| Error::I2c)?;
            *byte = buf[0];
            self.delay.delay_ms(timing::BUS_SETTLE);
        }

        Ok((&raw[..]).get_f32_le())
    }

    fn write_byte(&mut self, register: u8, value: u8) -> Result<(), Error> {
        self.i2c
            .write(self.address, &[register, value])
            .map_err(|_| Error::I2c)?;
        self.delay.delay_ms(timing::BUS_SETTLE);
        Ok(())
    }

    fn read_byte(&mut self, register: u8) -> Result<u8, Error> {
        self.change_register(register)?;
        let mut buf = [0u8; 1];
        self.i2c
            .read(self.address, &mut buf)
            .map_err(|_| Error::I2c)?;
        self.delay.delay_ms(timing::BUS_SETTLE);
        Ok(buf[0])
    }

    fn config_bit(&mut self, bit: u8) -> Result<bool, Error> {
        let config = self.read_byte(addresses::CONFIG)?;
        Ok((config >> bit) & 1 == 1)
    }

    fn set_config_bit(&mut self, bit: u8, enable: bool) -> Result<(), Error> {
        let mut config = self.read_byte(addresses::CONFIG)?;
        if enable {
            config |= 1 << bit;
        } else {
            config &= !(1 << bit);
        }
        self.write_byte(addresses::CONFIG, config)
    }

    fn update_mv(&mut self) -> Result<(), Error> {
        let raw = self.read_register(addresses::MV)?;
        self.mv_valid = raw.is_finite();
        self.mv = finite_or_invalid(raw, "mV");
        Ok(())
    }

    fn update_temp(&mut self) -> Result<(), Error> {
        let raw = self.read_register(addresses::TEMP)?;
        self.temp_c = if raw == registers::TEMP_DISCONNECTED {
            raw
        } else {
            finite_or_invalid(raw, "temperature")
        };
        self.temp_f = to_fahrenheit(self.temp_c);
        Ok(())
    }

    /// Checks that something answers at the configured address and logs its
    /// versions.
    pub fn begin(&mut self) -> bool {
        if !self.connected() {
            warn!("no ISE probe answering at {:#04x}", self.address);
            return false;
        }

        match (self.get_version(), self.get_firmware()) {
            (Ok(hw), Ok(fw)) => debug!(
                "ISE probe at {:#04x}, hardware version {hw}, firmware {fw}",
                self.address
            ),
            _ => debug!("ISE probe at {:#04x}, version unavailable", self.address),
        }
        true
    }

    /// Starts an mV measurement. Non-finite readings become -1.
    pub fn measure_mv(&mut self) -> Result<f32, Error> {
        self.send_command(Task::MeasureMv)?;
        if !self.blocking {
            return Ok(self.mv);
        }

        self.delay.delay_ms(timing::MV_MEASURE);
        self.update_mv()?;
        Ok(self.mv)
    }

    /// Starts a temperature measurement.
    ///
    /// A reading of -127 means no temperature sensor is attached; it is passed
    /// through and Fahrenheit is set to -127 as well.
    pub fn measure_temp(&mut self) -> Result<f32, Error> {
        self.send_command(Task::MeasureTemp)?;
        if !self.blocking {
            return Ok(self.temp_c);
        }

        self.delay.delay_ms(timing::TEMP_MEASURE);
        self.update_temp()?;
        Ok(self.temp_c)
    }

    /// Overrides the temperature the device uses for compensation.
    pub fn set_temp(&mut self, temp_c: f32) -> Result<(), Error> {
        self.write_register(addresses::TEMP, temp_c)?;
        self.temp_c = temp_c;
        self.temp_f = to_fahrenheit(temp_c);
        Ok(())
    }

    /// Refreshes the cached mV and temperature from the result registers
    /// without starting a measurement.
    pub fn read_data(&mut self) -> Result<(), Error> {
        self.update_mv()?;
        self.update_temp()
    }

    /// Single-point calibration against a solution of known mV. Returns the
    /// offset the device stored.
    pub fn calibrate_single(&mut self, solution_mv: f32) -> Result<f32, Error> {
        debug!("single point calibration at {solution_mv} mV");
        self.write_register(addresses::SOLUTION, solution_mv)?;
        self.send_command(Task::CalibrateSingle)?;
        self.delay.delay_ms(timing::MV_MEASURE);
        self.get_calibrate_offset()
    }

    /// Calibrates the low dual-point pair. Returns the stored low reading.
    pub fn calibrate_probe_low(&mut self, solution_mv: f32) -> Result<f32, Error> {
        debug!("low point calibration at {solution_mv} mV");
        self.write_register(addresses::SOLUTION, solution_mv)?;
        self.send_command(Task::CalibrateLow)?;
        self.delay.delay_ms(timing::MV_MEASURE);
        self.get_calibrate_low_reading()
    }

    /// Calibrates the high dual-point pair. Returns the stored high reading.
    pub fn calibrate_probe_high(&mut self, solution_mv: f32) -> Result<f32, Error> {
        debug!("high point calibration at {solution_mv} mV");
        self.write_register(addresses::SOLUTION, solution_mv)?;
        self.send_command(Task::CalibrateHigh)?;
        self.delay.delay_ms(timing::MV_MEASURE);
        self.get_calibrate_high_reading()
    }

    /// Writes all four dual-point values as given, with no device-side
    /// computation.
    pub fn set_dual_point_calibration(
        &mut self,
        ref_low: f32,
        ref_high: f32,
        read_low: f32,
        read_high: f32,
    ) -> Result<(), Error> {
        self.write_register(addresses::CALIBRATE_REF_LOW, ref_low)?;
        self.write_register(addresses::CALIBRATE_REF_HIGH, ref_high)?;
        self.write_register(addresses::CALIBRATE_READ_LOW, read_low)?;
        self.write_register(addresses::CALIBRATE_READ_HIGH, read_high)
    }

    pub fn get_calibrate_offset(&mut self) -> Result<f32, Error> {
        self.read_register(addresses::CALIBRATE_SINGLE)
    }

    pub fn get_calibrate_high_reference(&mut self) -> Result<f32, Error> {
        self.read_register(addresses::CALIBRATE_REF_HIGH)
    }

    pub fn get_calibrate_low_reference(&mut self) -> Result<f32, Error> {
        self.read_register(addresses::CALIBRATE_REF_LOW)
    }

    pub fn get_calibrate_high_reading(&mut self) -> Result<f32, Error> {
        self.read_register(addresses::CALIBRATE_READ_HIGH)
    }

    pub fn get_calibrate_low_reading(&mut self) -> Result<f32, Error> {
        self.read_register(addresses::CALIBRATE_READ_LOW)
    }

    pub fn calibration(&mut self) -> Result<Calibration, Error> {
        Ok(Calibration {
            offset: self.get_calibrate_offset()?,
            ref_low: self.get_calibrate_low_reference()?,
            ref_high: self.get_calibrate_high_reference()?,
            read_low: self.get_calibrate_low_reading()?,
            read_high: self.get_calibrate_high_reading()?,
        })
    }

    /// Writes a previously captured snapshot back to the device.
    pub fn restore_calibration(&mut self, cal: &Calibration) -> Result<(), Error> {
        debug!("restoring calibration {cal:?}");
        self.write_register(addresses::CALIBRATE_SINGLE, cal.offset)?;
        self.set_dual_point_calibration(cal.ref_low, cal.ref_high, cal.read_low, cal.read_high)
    }

    pub fn state(&mut self) -> Result<DeviceState, Error> {
        if !self.connected() {
            return Ok(DeviceState::Disconnected);
        }
        Ok(DeviceState::from_calibration(&self.calibration()?))
    }

    pub fn use_temperature_compensation(&mut self, enable: bool) -> Result<(), Error> {
        debug!("temperature compensation: {enable}");
        self.set_config_bit(config_bits::TEMP_COMPENSATION, enable)
    }

    pub fn using_temperature_compensation(&mut self) -> Result<bool, Error> {
        self.config_bit(config_bits::TEMP_COMPENSATION)
    }

    pub fn use_dual_point(&mut self, enable: bool) -> Result<(), Error> {
        debug!("dual point calibration: {enable}");
        self.set_config_bit(config_bits::DUAL_POINT, enable)
    }

    pub fn using_dual_point(&mut self) -> Result<bool, Error> {
        self.config_bit(config_bits::DUAL_POINT)
    }

    /// Hardware version of the board.
    pub fn get_version(&mut self) -> Result<u8, Error> {
        self.read_byte(addresses::VERSION)
    }

    pub fn get_firmware(&mut self) -> Result<u8, Error> {
        self.read_byte(addresses::FW_VERSION)
    }

    /// Clears every calibration register to NaN and turns temperature
    /// compensation off. There is no way back other than recalibrating.
    pub fn reset(&mut self) -> Result<(), Error> {
        debug!("resetting calibration of {:#04x}", self.address);
        for register in [
            addresses::CALIBRATE_SINGLE,
            addresses::CALIBRATE_REF_HIGH,
            addresses::CALIBRATE_REF_LOW,
            addresses::CALIBRATE_READ_HIGH,
            addresses::CALIBRATE_READ_LOW,
        ] {
            self.write_register(register, f32::NAN)?;
            self.delay.delay_ms(timing::BUS_SETTLE);
        }
        self.use_temperature_compensation(false)
    }

    /// Permanently moves the device to a new address. The device has to be
    /// found again at `address` afterwards.
    pub fn set_i2c_address(&mut self, address: u8) -> Result<(), Error> {
        if !(1..=127).contains(&address) {
            return Err(Error::InvalidAddress(address));
        }

        debug!("moving ISE probe {:#04x} -> {address:#04x}", self.address);
        self.write_register(addresses::SOLUTION, address as f32)?;
        self.send_command(Task::ChangeAddress)?;
        self.address = address;
        Ok(())
    }

    pub fn read_eeprom(&mut self, address: u8) -> Result<f32, Error> {
        self.write_register(addresses::SOLUTION, address as f32)?;
        self.send_command(Task::MemoryRead)?;
        self.read_register(addresses::BUFFER)
    }

    pub fn write_eeprom(&mut self, address: u8, value: f32) -> Result<(), Error> {
        self.write_register(addresses::SOLUTION, address as f32)?;
        self.write_register(addresses::BUFFER, value)?;
        self.send_command(Task::MemoryWrite)
    }

    /// `false` if the firmware register reads as an idle bus or the
    /// transaction fails outright.
    pub fn connected(&mut self) -> bool {
        match self.read_byte(addresses::FW_VERSION) {
            Ok(version) => version != registers::BUS_IDLE,
            Err(err) => {
                trace!("connectivity check failed: {err}");
                false
            }
        }
    }
}
