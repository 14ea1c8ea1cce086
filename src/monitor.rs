use std::{fmt, thread::JoinHandle, time::Duration};

use anyhow::{bail, Context};
use embedded_hal::blocking::{
    delay::DelayMs,
    i2c::{Read, Write},
};
use rppal::i2c::I2c;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::{
    config::{Config, ProbeKind},
    driver::{
        ufire::ise::{
            orp::Orp, ph::Ph, registers::INVALID, Calibration, DeviceState, Error, IseProbe,
        },
        ThreadDelay,
    },
    util::Interval,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Measure,
    MeasureTemp,
    SetTemp(f32),
    /// Values are pH for a pH probe, mV otherwise.
    CalibrateSingle(f32),
    CalibrateLow(f32),
    CalibrateHigh(f32),
    /// Raw mV values, written as given.
    SetDualPoint {
        ref_low: f32,
        ref_high: f32,
        read_low: f32,
        read_high: f32,
    },
    ProbePotential(Option<f32>),
    ShowCalibration,
    Reset,
    Connected,
    TemperatureCompensation(bool),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Event {
    Mv {
        mv: f32,
    },
    Ph {
        ph: f32,
        poh: f32,
        mv: f32,
        temp_c: Option<f32>,
    },
    Orp {
        orp: f32,
        eh: f32,
    },
    Temperature {
        c: f32,
        f: f32,
    },
    Calibrated {
        value: f32,
    },
    Calibration {
        cal: Calibration,
        state: DeviceState,
        temperature_compensation: bool,
        dual_point: bool,
    },
    ProbePotential(f32),
    Connected(bool),
    TemperatureCompensation(bool),
    Reset,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Mv { mv } => write!(f, "mV: {mv:.2}"),
            Event::Ph {
                ph,
                poh,
                mv,
                temp_c: Some(t),
            } => write!(f, "pH: {ph:.2} pOH: {poh:.2} ({mv:.2} mV at {t:.1} C)"),
            Event::Ph { ph, poh, mv, .. } => write!(f, "pH: {ph:.2} pOH: {poh:.2} ({mv:.2} mV)"),
            Event::Orp { orp, eh } => write!(f, "ORP: {orp:.2} mV Eh: {eh:.2} mV"),
            Event::Temperature { c, f: fahrenheit } => {
                write!(f, "temperature: {c:.2} C / {fahrenheit:.2} F")
            }
            Event::Calibrated { value } => write!(f, "calibrated, device reports {value}"),
            Event::Calibration {
                cal,
                state,
                temperature_compensation,
                dual_point,
            } => write!(
                f,
                "{state:?}: offset {} | low {} / {} | high {} / {} | temp. compensation {temperature_compensation} | dual point {dual_point}",
                cal.offset, cal.ref_low, cal.read_low, cal.ref_high, cal.read_high
            ),
            Event::ProbePotential(p) => write!(f, "probe potential: {p} mV"),
            Event::Connected(c) => write!(f, "connected: {c}"),
            Event::TemperatureCompensation(on) => write!(f, "temperature compensation: {on}"),
            Event::Reset => write!(f, "calibration reset"),
        }
    }
}

enum Reader<I2C, D> {
    Mv(Box<IseProbe<I2C, D>>),
    Ph(Ph<Box<IseProbe<I2C, D>>>),
    Orp(Orp<Box<IseProbe<I2C, D>>>),
}

/// Owns the probe and turns commands into driver calls.
pub struct Session<I2C, D> {
    reader: Reader<I2C, D>,
    temperature_compensation: bool,
}

impl<I2C, D> Session<I2C, D>
where
    I2C: Read + Write,
    D: DelayMs<u16>,
{
    pub fn new(probe: IseProbe<I2C, D>, kind: ProbeKind, temperature_compensation: bool) -> Self {
        let probe = Box::new(probe);
        let reader = match kind {
            ProbeKind::Mv => Reader::Mv(probe),
            ProbeKind::Ph => Reader::Ph(Ph::new(probe)),
            ProbeKind::Orp => Reader::Orp(Orp::new(probe)),
        };

        Self {
            reader,
            temperature_compensation,
        }
    }

    pub fn probe(&mut self) -> &mut IseProbe<I2C, D> {
        match &mut self.reader {
            Reader::Mv(probe) => &mut **probe,
            Reader::Ph(ph) => &mut **ph,
            Reader::Orp(orp) => &mut **orp,
        }
    }

    /// Takes one reading of the configured kind.
    ///
    /// In non-blocking mode the result registers are collected first, so each
    /// sample reports the measurement started by the previous one.
    pub fn sample(&mut self) -> Result<Event, Error> {
        let blocking = self.probe().blocking();
        let compensate = self.temperature_compensation;

        match &mut self.reader {
            Reader::Mv(probe) => {
                if !blocking {
                    probe.read_data()?;
                }
                let mv = probe.measure_mv()?;
                Ok(Event::Mv { mv })
            }
            Reader::Ph(ph) => {
                if !blocking {
                    ph.read_data()?;
                }
                let temp_c = if !compensate {
                    None
                } else if blocking {
                    Some(ph.measure_temp()?)
                } else {
                    // a temperature task would be cut short by the mV task
                    // right behind it, so use the last collected reading
                    Some(ph.temp_c).filter(|t| *t != INVALID)
                };
                ph.measure_ph(temp_c)?;
                Ok(Event::Ph {
                    ph: ph.ph,
                    poh: ph.poh,
                    mv: ph.mv,
                    temp_c,
                })
            }
            Reader::Orp(orp) => {
                if !blocking {
                    orp.read_data()?;
                }
                orp.measure_orp()?;
                Ok(Event::Orp {
                    orp: orp.orp,
                    eh: orp.eh,
                })
            }
        }
    }

    fn calibration_event(&mut self) -> Result<Event, Error> {
        let probe = self.probe();
        let cal = probe.calibration()?;
        let state = if probe.connected() {
            DeviceState::from_calibration(&cal)
        } else {
            DeviceState::Disconnected
        };

        Ok(Event::Calibration {
            cal,
            state,
            temperature_compensation: probe.using_temperature_compensation()?,
            dual_point: probe.using_dual_point()?,
        })
    }

    pub fn execute(&mut self, cmd: Command) -> Result<Event, Error> {
        trace!("executing command {cmd:?}");

        match cmd {
            Command::Measure => self.sample(),
            Command::MeasureTemp => {
                let probe = self.probe();
                probe.measure_temp()?;
                Ok(Event::Temperature {
                    c: probe.temp_c,
                    f: probe.temp_f,
                })
            }
            Command::SetTemp(temp_c) => {
                let probe = self.probe();
                probe.set_temp(temp_c)?;
                Ok(Event::Temperature {
                    c: probe.temp_c,
                    f: probe.temp_f,
                })
            }
            Command::CalibrateSingle(value) => {
                let value = match &mut self.reader {
                    Reader::Ph(ph) => ph.calibrate_single(value)?,
                    Reader::Orp(orp) => orp.calibrate_single(value)?,
                    Reader::Mv(probe) => probe.calibrate_single(value)?,
                };
                Ok(Event::Calibrated { value })
            }
            Command::CalibrateLow(value) => {
                let value = match &mut self.reader {
                    Reader::Ph(ph) => ph.calibrate_probe_low(value)?,
                    Reader::Orp(orp) => orp.calibrate_probe_low(value)?,
                    Reader::Mv(probe) => probe.calibrate_probe_low(value)?,
                };
                Ok(Event::Calibrated { value })
            }
            Command::CalibrateHigh(value) => {
                let value = match &mut self.reader {
                    Reader::Ph(ph) => ph.calibrate_probe_high(value)?,
                    Reader::Orp(orp) => orp.calibrate_probe_high(value)?,
                    Reader::Mv(probe) => probe.calibrate_probe_high(value)?,
                };
                Ok(Event::Calibrated { value })
            }
            Command::SetDualPoint {
                ref_low,
                ref_high,
                read_low,
                read_high,
            } => {
                self.probe()
                    .set_dual_point_calibration(ref_low, ref_high, read_low, read_high)?;
                self.calibration_event()
            }
            Command::ProbePotential(potential) => {
                let mut orp = Orp::new(self.probe());
                if let Some(potential) = potential {
                    orp.set_probe_potential(potential)?;
                }
                Ok(Event::ProbePotential(orp.get_probe_potential()?))
            }
            Command::ShowCalibration => self.calibration_event(),
            Command::Reset => {
                self.probe().reset()?;
                self.temperature_compensation = false;
                Ok(Event::Reset)
            }
            Command::Connected => Ok(Event::Connected(self.probe().connected())),
            Command::TemperatureCompensation(enable) => {
                self.probe().use_temperature_compensation(enable)?;
                self.temperature_compensation = enable;
                Ok(Event::TemperatureCompensation(enable))
            }
        }
    }
}

fn forward(result: Result<Event, Error>, evt_tx: &flume::Sender<Event>) -> bool {
    match result {
        Ok(evt) => evt_tx.send(evt).is_ok(),
        Err(err) => {
            warn!("probe operation failed: {err}");
            true
        }
    }
}

/// Samples every `period` and executes commands in between, until `ct` is
/// cancelled or nobody listens for events anymore.
pub fn run<I2C, D>(
    session: &mut Session<I2C, D>,
    period: Duration,
    ct: &CancellationToken,
    cmd_rx: &flume::Receiver<Command>,
    evt_tx: &flume::Sender<Event>,
) where
    I2C: Read + Write,
    D: DelayMs<u16>,
{
    let mut interval = Interval::new(period);

    while !ct.is_cancelled() {
        let wait = interval.until_next();
        if wait.is_zero() {
            interval.tick();
            if !forward(session.sample(), evt_tx) {
                break;
            }
            continue;
        }

        match cmd_rx.recv_timeout(wait) {
            Ok(cmd) => {
                if !forward(session.execute(cmd), evt_tx) {
                    break;
                }
            }
            Err(flume::RecvTimeoutError::Timeout) => {}
            // no more commands, keep sampling
            Err(flume::RecvTimeoutError::Disconnected) => std::thread::sleep(wait),
        }
    }

    debug!("probe loop finished");
}

pub fn spawn_thread(
    config: Config,
    ct: CancellationToken,
    cmd_rx: flume::Receiver<Command>,
    evt_tx: flume::Sender<Event>,
) -> JoinHandle<anyhow::Result<()>> {
    std::thread::spawn(move || {
        let i2c = I2c::with_bus(config.bus).context("failed to open i2c bus")?;
        let mut probe = IseProbe::with_address(i2c, ThreadDelay, config.address);
        probe.set_blocking(config.blocking);

        if !probe.begin() {
            bail!(
                "no ISE probe found at {:#04x} on i2c bus {}",
                config.address,
                config.bus
            );
        }
        debug!("initialized ISE probe, sampling {:?}", config.probe);

        let mut session = Session::new(probe, config.probe, config.temperature_compensation);
        run(&mut session, config.interval, &ct, &cmd_rx, &evt_tx);

        Ok(())
    })
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use tokio_util::sync::CancellationToken;

    use super::{run, Command, Event, Session};
    use crate::{
        config::ProbeKind,
        driver::ufire::ise::{
            ph::ph_to_mv,
            registers::{addresses, Task},
            sim::{SimDelay, SimIse},
            DeviceState, IseProbe,
        },
    };

    fn session(kind: ProbeKind) -> Session<SimIse, SimDelay> {
        Session::new(IseProbe::new(SimIse::new(), SimDelay::default()), kind, false)
    }

    #[test]
    fn ph_sample() {
        let mut s = session(ProbeKind::Ph);
        s.probe().i2c.next_mv = 59.2;

        assert_eq!(
            s.sample().unwrap(),
            Event::Ph {
                ph: 6.0,
                poh: 8.0,
                mv: 59.2,
                temp_c: None
            }
        );
    }

    #[test]
    fn ph_sample_with_temperature() {
        let mut s = session(ProbeKind::Ph);
        s.probe().i2c.next_mv = 0.0;
        s.probe().i2c.next_temp = 30.0;

        assert_eq!(
            s.execute(Command::TemperatureCompensation(true)).unwrap(),
            Event::TemperatureCompensation(true)
        );
        match s.sample().unwrap() {
            Event::Ph { ph, temp_c, .. } => {
                assert_eq!(ph, 7.0);
                assert_eq!(temp_c, Some(30.0));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn orp_and_mv_samples() {
        let mut s = session(ProbeKind::Orp);
        s.probe().i2c.next_mv = 100.0;
        s.execute(Command::ProbePotential(Some(200.0))).unwrap();
        assert_eq!(s.sample().unwrap(), Event::Orp { orp: 100.0, eh: 300.0 });

        let mut s = session(ProbeKind::Mv);
        s.probe().i2c.next_mv = -12.5;
        assert_eq!(s.execute(Command::Measure).unwrap(), Event::Mv { mv: -12.5 });
    }

    #[test]
    fn non_blocking_sample_reports_previous_measurement() {
        let mut s = session(ProbeKind::Mv);
        s.probe().set_blocking(false);

        s.probe().i2c.next_mv = 10.0;
        s.sample().unwrap();
        s.probe().i2c.next_mv = 20.0;
        assert_eq!(s.sample().unwrap(), Event::Mv { mv: 10.0 });
        assert_eq!(s.sample().unwrap(), Event::Mv { mv: 20.0 });
    }

    fn issued_tasks(s: &mut Session<SimIse, SimDelay>) -> Vec<u8> {
        s.probe()
            .i2c
            .writes
            .iter()
            .filter(|w| w.len() == 2 && w[0] == addresses::TASK)
            .map(|w| w[1])
            .collect()
    }

    #[test]
    fn non_blocking_samples_start_one_task() {
        for kind in [ProbeKind::Ph, ProbeKind::Orp, ProbeKind::Mv] {
            let mut s = Session::new(
                IseProbe::new(SimIse::new(), SimDelay::default()),
                kind,
                true,
            );
            s.probe().set_blocking(false);
            s.sample().unwrap();

            // collecting results may read EEPROM, but only before the new
            // measurement is started
            let tasks = issued_tasks(&mut s);
            assert_eq!(tasks.last(), Some(&(Task::MeasureMv as u8)), "{kind:?}");
            assert_eq!(
                tasks.iter().filter(|t| **t == Task::MeasureMv as u8).count(),
                1
            );
            assert!(!tasks.contains(&(Task::MeasureTemp as u8)));
        }
    }

    #[test]
    fn ph_calibration_commands() {
        let mut s = session(ProbeKind::Ph);
        s.probe().i2c.next_mv = ph_to_mv(4.0);
        match s.execute(Command::CalibrateLow(4.0)).unwrap() {
            Event::Calibrated { value } => assert!((value - 4.0).abs() < 1e-3),
            other => panic!("unexpected event {other:?}"),
        }

        s.probe().i2c.next_mv = ph_to_mv(10.0);
        s.execute(Command::CalibrateHigh(10.0)).unwrap();

        match s.execute(Command::ShowCalibration).unwrap() {
            Event::Calibration { cal, state, .. } => {
                assert_eq!(state, DeviceState::DualPoint);
                assert!((cal.ref_low - 177.6).abs() < 1e-3);
            }
            other => panic!("unexpected event {other:?}"),
        }

        assert_eq!(s.execute(Command::Reset).unwrap(), Event::Reset);
        match s.execute(Command::ShowCalibration).unwrap() {
            Event::Calibration {
                cal,
                state,
                temperature_compensation,
                ..
            } => {
                assert_eq!(state, DeviceState::Uncalibrated);
                assert!(cal.ref_low.is_nan());
                assert!(!temperature_compensation);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn restore_dual_point() {
        let mut s = session(ProbeKind::Mv);
        let evt = s
            .execute(Command::SetDualPoint {
                ref_low: 50.0,
                ref_high: 100.0,
                read_low: 48.0,
                read_high: 134.0,
            })
            .unwrap();

        match evt {
            Event::Calibration { cal, state, .. } => {
                assert_eq!(cal.ref_low, 50.0);
                assert_eq!(cal.read_high, 134.0);
                assert_eq!(state, DeviceState::DualPoint);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn disconnected_probe() {
        let mut s = session(ProbeKind::Ph);
        s.probe().i2c.disconnected = true;

        assert_eq!(s.execute(Command::Connected).unwrap(), Event::Connected(false));
        match s.sample().unwrap() {
            Event::Ph { ph, poh, mv, .. } => assert_eq!((ph, poh, mv), (-1.0, -1.0, -1.0)),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn loop_runs_commands_and_samples() {
        let mut s = session(ProbeKind::Ph);
        let ct = CancellationToken::new();
        let (cmd_tx, cmd_rx) = flume::bounded(16);
        let (evt_tx, evt_rx) = flume::unbounded();

        cmd_tx.send(Command::Connected).unwrap();
        drop(cmd_tx);

        let cancel = ct.clone();
        let stopper = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(60));
            cancel.cancel();
        });

        run(&mut s, Duration::from_millis(10), &ct, &cmd_rx, &evt_tx);
        stopper.join().unwrap();

        let events: Vec<Event> = evt_rx.try_iter().collect();
        assert_eq!(events[0], Event::Connected(true));
        assert!(events[1..]
            .iter()
            .any(|e| matches!(e, Event::Ph { ph, .. } if *ph == 7.0)));
    }
}
