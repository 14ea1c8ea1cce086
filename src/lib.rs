//! Driver and monitor for the uFire ISE probe interface: raw mV, pH, ORP and
//! temperature over I2C.

pub mod config;
pub mod console;
pub mod driver;
pub mod monitor;
pub mod util;
