//! Register map and task codes of the uFire ISE board.

use num_derive::FromPrimitive;

pub const DEFAULT_ADDRESS: u8 = 0x3F;

pub mod addresses {
    pub const VERSION: u8 = 0;
    pub const MV: u8 = 1;
    pub const TEMP: u8 = 5;
    pub const CALIBRATE_SINGLE: u8 = 9;
    pub const CALIBRATE_REF_HIGH: u8 = 13;
    pub const CALIBRATE_REF_LOW: u8 = 17;
    pub const CALIBRATE_READ_HIGH: u8 = 21;
    pub const CALIBRATE_READ_LOW: u8 = 25;
    pub const SOLUTION: u8 = 29;
    pub const BUFFER: u8 = 33;
    pub const FW_VERSION: u8 = 37;
    pub const CONFIG: u8 = 38;
    pub const TASK: u8 = 39;
}

pub mod config_bits {
    pub const DUAL_POINT: u8 = 0;
    pub const TEMP_COMPENSATION: u8 = 1;
}

/// Values written to the task register.
#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive)]
#[repr(u8)]
pub enum Task {
    MeasureMv = 80,
    MeasureTemp = 40,
    CalibrateSingle = 20,
    CalibrateLow = 10,
    CalibrateHigh = 8,
    MemoryWrite = 4,
    MemoryRead = 2,
    ChangeAddress = 1,
}

/// Settle times, in milliseconds.
pub mod timing {
    pub const BUS_SETTLE: u16 = 10;
    pub const MV_MEASURE: u16 = 250;
    pub const TEMP_MEASURE: u16 = 750;
}

/// EEPROM slot holding the ORP probe potential.
pub const POTENTIAL_EEPROM_ADDRESS: u8 = 100;

/// Temperature reported when no probe is attached.
pub const TEMP_DISCONNECTED: f32 = -127.0;

/// Value exposed in place of an invalid measurement.
pub const INVALID: f32 = -1.0;

/// A bus with no device behind it reads back as all ones.
pub const BUS_IDLE: u8 = 0xFF;
