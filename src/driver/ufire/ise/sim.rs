//! In-memory stand-in for the ISE board, used by the unit tests.

use std::collections::HashMap;

use embedded_hal::blocking::{
    delay::DelayMs,
    i2c::{Read, Write},
};
use num_traits::FromPrimitive;

use super::registers::{addresses, Task, DEFAULT_ADDRESS};

#[derive(Debug)]
pub(crate) enum SimError {
    Nack,
}

pub(crate) struct SimIse {
    pub address: u8,
    /// Behave like an empty bus: writes vanish, reads return 0xFF.
    pub disconnected: bool,
    /// Value the next mV measurement (or calibration) will see.
    pub next_mv: f32,
    pub next_temp: f32,
    pub writes: Vec<Vec<u8>>,
    pub reads: usize,
    memory: [u8; 40],
    pointer: usize,
    eeprom: HashMap<u8, f32>,
}

impl SimIse {
    pub fn new() -> Self {
        let mut sim = Self {
            address: DEFAULT_ADDRESS,
            disconnected: false,
            next_mv: 0.0,
            next_temp: 25.0,
            writes: Vec::new(),
            reads: 0,
            memory: [0u8; 40],
            pointer: 0,
            eeprom: HashMap::new(),
        };

        sim.memory[addresses::VERSION as usize] = 0x1a;
        sim.memory[addresses::FW_VERSION as usize] = 0x02;
        for register in [
            addresses::CALIBRATE_SINGLE,
            addresses::CALIBRATE_REF_HIGH,
            addresses::CALIBRATE_REF_LOW,
            addresses::CALIBRATE_READ_HIGH,
            addresses::CALIBRATE_READ_LOW,
        ] {
            sim.set_f32(register, f32::NAN);
        }
        sim
    }

    pub fn register(&self, register: u8) -> u8 {
        self.memory[register as usize]
    }

    pub fn f32_at(&self, register: u8) -> f32 {
        let r = register as usize;
        f32::from_le_bytes([
            self.memory[r],
            self.memory[r + 1],
            self.memory[r + 2],
            self.memory[r + 3],
        ])
    }

    pub fn set_f32(&mut self, register: u8, value: f32) {
        let r = register as usize;
        self.memory[r..r + 4].copy_from_slice(&value.to_le_bytes());
    }

    pub fn set_eeprom(&mut self, address: u8, value: f32) {
        self.eeprom.insert(address, value);
    }

    fn run(&mut self, task: Task) {
        let solution = self.f32_at(addresses::SOLUTION);

        match task {
            Task::MeasureMv => self.set_f32(addresses::MV, self.next_mv),
            Task::MeasureTemp => self.set_f32(addresses::TEMP, self.next_temp),
            Task::CalibrateSingle => {
                self.set_f32(addresses::CALIBRATE_SINGLE, solution - self.next_mv)
            }
            Task::CalibrateLow => {
                self.set_f32(addresses::CALIBRATE_REF_LOW, solution);
                self.set_f32(addresses::CALIBRATE_READ_LOW, self.next_mv);
            }
            Task::CalibrateHigh => {
                self.set_f32(addresses::CALIBRATE_REF_HIGH, solution);
                self.set_f32(addresses::CALIBRATE_READ_HIGH, self.next_mv);
            }
            Task::MemoryWrite => {
                let value = self.f32_at(addresses::BUFFER);
                self.eeprom.insert(solution as u8, value);
            }
            Task::MemoryRead => {
                let value = self
                    .eeprom
                    .get(&(solution as u8))
                    .copied()
                    .unwrap_or(f32::NAN);
                self.set_f32(addresses::BUFFER, value);
            }
            Task::ChangeAddress => self.address = solution as u8,
        }
    }
}

impl Write for SimIse {
    type Error = SimError;

    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), Self::Error> {
        if address != self.address {
            return Err(SimError::Nack);
        }
        self.writes.push(bytes.to_vec());
        if self.disconnected {
            return Ok(());
        }

        let (&register, payload) = bytes.split_first().ok_or(SimError::Nack)?;
        self.pointer = register as usize;

        if register == addresses::TASK && payload.len() == 1 {
            if let Some(task) = Task::from_u8(payload[0]) {
                self.run(task);
            }
            return Ok(());
        }

        for (offset, byte) in payload.iter().enumerate() {
            self.memory[self.pointer + offset] = *byte;
        }
        Ok(())
    }
}

impl Read for SimIse {
    type Error = SimError;

    fn read(&mut self, address: u8, buffer: &mut [u8]) -> Result<(), Self::Error> {
        if address != self.address {
            return Err(SimError::Nack);
        }

        for byte in buffer.iter_mut() {
            self.reads += 1;
            *byte = if self.disconnected {
                0xFF
            } else {
                self.memory.get(self.pointer).copied().unwrap_or(0)
            };
            self.pointer += 1;
        }
        Ok(())
    }
}

/// Adds up requested delays instead of sleeping.
#[derive(Debug, Default)]
pub(crate) struct SimDelay {
    pub total_ms: u32,
}

impl DelayMs<u16> for SimDelay {
    fn delay_ms(&mut self, ms: u16) {
        self.total_ms += ms as u32;
    }
}
