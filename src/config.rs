use std::{num::ParseIntError, time::Duration};

use anyhow::bail;
use clap::{builder::BoolishValueParser, ArgAction, Parser, ValueEnum};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProbeKind {
    Ph,
    Orp,
    Mv,
}

/// Samples an ISE probe and takes calibration commands on stdin.
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "ise-probe", version, long_about = None)]
pub struct Config {
    /// Linux I2C bus number, as in `/dev/i2c-N`
    #[arg(long, env = "ISE_I2C_BUS", default_value = "1")]
    pub bus: u8,

    /// 7-bit device address, decimal or 0x-prefixed hex
    #[arg(long, env = "ISE_ADDRESS", default_value = "0x3F", value_parser = parse_address)]
    pub address: u8,

    /// What a sample measures
    #[arg(long, env = "ISE_PROBE", value_enum, ignore_case = true, default_value = "ph")]
    pub probe: ProbeKind,

    /// Sampling period in milliseconds
    #[arg(
        long = "interval-ms",
        env = "ISE_INTERVAL_MS",
        default_value = "1000",
        value_parser = parse_millis
    )]
    pub interval: Duration,

    /// Measure temperature before every pH sample and correct for it
    #[arg(
        long,
        env = "ISE_TEMP_COMPENSATION",
        default_value = "false",
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    pub temperature_compensation: bool,

    /// Wait out settle times inside each measurement
    #[arg(
        long,
        env = "ISE_BLOCKING",
        default_value = "true",
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    pub blocking: bool,
}

/// Accepts decimal or `0x`-prefixed hex 7-bit addresses.
pub fn parse_address(s: &str) -> anyhow::Result<u8> {
    let s = s.trim();
    let address = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16)?,
        None => s.parse()?,
    };

    if !(1..=127).contains(&address) {
        bail!("address {address:#04x} is not a 7-bit i2c address");
    }
    Ok(address)
}

fn parse_millis(s: &str) -> Result<Duration, ParseIntError> {
    Ok(Duration::from_millis(s.trim().parse()?))
}
