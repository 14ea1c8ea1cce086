//! Line-based commands read from stdin.

use std::{io::BufRead, str::FromStr, thread::JoinHandle};

use thiserror::Error;
use tracing::{debug, warn};

use crate::monitor::Command;

#[derive(Debug, Error, PartialEq)]
pub enum ParseCommandError {
    #[error("empty command")]
    Empty,
    #[error("unknown command {0:?}")]
    Unknown(String),
    #[error("{0} expects {1} argument(s)")]
    Arity(&'static str, usize),
    #[error("invalid number {0:?}")]
    Number(String),
    #[error("expected on or off, got {0:?}")]
    Switch(String),
}

fn number(s: &str) -> Result<f32, ParseCommandError> {
    s.parse().map_err(|_| ParseCommandError::Number(s.to_string()))
}

fn numbers<const N: usize>(
    name: &'static str,
    args: &[&str],
) -> Result<[f32; N], ParseCommandError> {
    if args.len() != N {
        return Err(ParseCommandError::Arity(name, N));
    }

    let mut values = [0.0f32; N];
    for (value, arg) in values.iter_mut().zip(args) {
        *value = number(arg)?;
    }
    Ok(values)
}

impl FromStr for Command {
    type Err = ParseCommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let name = words.next().ok_or(ParseCommandError::Empty)?;
        let args: Vec<&str> = words.collect();

        let cmd = match name.to_ascii_lowercase().as_str() {
            "measure" => {
                numbers::<0>("measure", &args)?;
                Command::Measure
            }
            "temp" => {
                numbers::<0>("temp", &args)?;
                Command::MeasureTemp
            }
            "settemp" => {
                let [t] = numbers("settemp", &args)?;
                Command::SetTemp(t)
            }
            "single" => {
                let [v] = numbers("single", &args)?;
                Command::CalibrateSingle(v)
            }
            "low" => {
                let [v] = numbers("low", &args)?;
                Command::CalibrateLow(v)
            }
            "high" => {
                let [v] = numbers("high", &args)?;
                Command::CalibrateHigh(v)
            }
            "dual" => {
                let [ref_low, ref_high, read_low, read_high] = numbers("dual", &args)?;
                Command::SetDualPoint {
                    ref_low,
                    ref_high,
                    read_low,
                    read_high,
                }
            }
            "potential" => match args.as_slice() {
                [] => Command::ProbePotential(None),
                [v] => Command::ProbePotential(Some(number(v)?)),
                _ => return Err(ParseCommandError::Arity("potential", 1)),
            },
            "cal" => {
                numbers::<0>("cal", &args)?;
                Command::ShowCalibration
            }
            "reset" => {
                numbers::<0>("reset", &args)?;
                Command::Reset
            }
            "connected" => {
                numbers::<0>("connected", &args)?;
                Command::Connected
            }
            "tc" => match args.as_slice() {
                [v] => match v.to_ascii_lowercase().as_str() {
                    "on" => Command::TemperatureCompensation(true),
                    "off" => Command::TemperatureCompensation(false),
                    _ => return Err(ParseCommandError::Switch(v.to_string())),
                },
                _ => return Err(ParseCommandError::Arity("tc", 1)),
            },
            other => return Err(ParseCommandError::Unknown(other.to_string())),
        };

        Ok(cmd)
    }
}

/// Forwards commands typed on stdin until stdin closes or the probe thread
/// goes away.
pub fn spawn_thread(cmd_tx: flume::Sender<Command>) -> JoinHandle<()> {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();

        for line in stdin.lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(err) => {
                    warn!("failed to read stdin: {err}");
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }

            match line.parse::<Command>() {
                Ok(cmd) => {
                    if cmd_tx.send(cmd).is_err() {
                        break;
                    }
                }
                Err(err) => warn!("{err}"),
            }
        }

        debug!("console closed");
    })
}
