/// Snapshot of the five calibration registers, in mV.
///
/// `NaN` in a field means that point was never calibrated (or was cleared by a
/// reset). It is kept as-is and never turned into a measurement sentinel.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Calibration {
    pub offset: f32,
    pub ref_low: f32,
    pub ref_high: f32,
    pub read_low: f32,
    pub read_high: f32,
}

impl Calibration {
    pub const UNCALIBRATED: Calibration = Calibration {
        offset: f32::NAN,
        ref_low: f32::NAN,
        ref_high: f32::NAN,
        read_low: f32::NAN,
        read_high: f32::NAN,
    };

    pub fn has_single_point(&self) -> bool {
        !self.offset.is_nan()
    }

    pub fn has_dual_point(&self) -> bool {
        [self.ref_low, self.ref_high, self.read_low, self.read_high]
            .iter()
            .all(|v| !v.is_nan())
    }
}

impl Default for Calibration {
    fn default() -> Self {
        Self::UNCALIBRATED
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DeviceState {
    Disconnected,
    Uncalibrated,
    SinglePoint,
    DualPoint,
}

impl DeviceState {
    /// Classifies a connected device by its stored calibration. A complete
    /// dual-point set wins over a single-point offset.
    pub fn from_calibration(cal: &Calibration) -> Self {
        if cal.has_dual_point() {
            DeviceState::DualPoint
        } else if cal.has_single_point() {
            DeviceState::SinglePoint
        } else {
            DeviceState::Uncalibrated
        }
    }
}
