use serde::{Deserialize, Serialize};

/// Default unit for loaded channels
pub const DEFAULT_UNIT: &str = "uV";

/// Default sampling rate in Hz, used when a source carries no rate metadata
pub const DEFAULT_SAMPLING_RATE_HZ: f64 = 250.0;

/// One channel of a recording
///
/// The sample buffer is in physical units (already calibrated). Channels are
/// independently sized; operations that combine channels clip to the
/// shortest one.
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    pub label: String,
    pub unit: String,
    pub physical_min: f64,
    pub physical_max: f64,
    pub digital_min: f64,
    pub digital_max: f64,
    pub sampling_rate_hz: f64,
    pub samples: Vec<f64>,
}

impl Default for Channel {
    fn default() -> Self {
        Channel {
            label: String::new(),
            unit: DEFAULT_UNIT.to_string(),
            physical_min: -1000.0,
            physical_max: 1000.0,
            digital_min: -32768.0,
            digital_max: 32767.0,
            sampling_rate_hz: DEFAULT_SAMPLING_RATE_HZ,
            samples: Vec::new(),
        }
    }
}

impl Channel {
    /// Creates a channel with default calibration metadata
    pub fn new(label: impl Into<String>, sampling_rate_hz: f64, samples: Vec<f64>) -> Self {
        Channel {
            label: label.into(),
            sampling_rate_hz,
            samples,
            ..Channel::default()
        }
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Duration in seconds (`samples / rate`, 0 for a non-positive rate)
    pub fn duration(&self) -> f64 {
        if self.sampling_rate_hz <= 0.0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sampling_rate_hz
    }

    /// Lightweight snapshot handed to visualization
    pub fn summary(&self) -> ChannelSummary {
        ChannelSummary {
            label: self.label.clone(),
            sample_count: self.samples.len(),
            sampling_rate_hz: self.sampling_rate_hz,
        }
    }
}

/// What the UI needs to lay out a channel list
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSummary {
    pub label: String,
    pub sample_count: usize,
    pub sampling_rate_hz: f64,
}

/// Header calibration of one raw EDF signal, only used while decoding
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationPair {
    pub physical_min: f64,
    pub physical_max: f64,
    pub digital_min: f64,
    pub digital_max: f64,
}

impl CalibrationPair {
    /// 物理范围和数字范围都大于阈值才算有效
    pub fn is_valid(&self, min_span: f64) -> bool {
        (self.physical_max - self.physical_min).abs() > min_span
            && (self.digital_max - self.digital_min).abs() > min_span
    }
}

/// Which rule produced a channel's scale and offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationStrategy {
    /// Linear mapping from the header's digital range to its physical range
    Header,
    /// Raw span already looks like microvolts; kept as is
    RawMicrovolts,
    /// Raw span covers the full 16-bit range; mapped to ±100 µV and centred
    FullScale,
    /// Raw span rescaled to a ±50 µV window and centred
    Rescaled,
    /// Not enough data (or no variation) to infer anything; identity
    Identity,
}

/// Linear `raw * scale + offset` conversion
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    pub scale: f64,
    pub offset: f64,
    pub strategy: CalibrationStrategy,
}

impl Calibration {
    pub fn identity() -> Self {
        Calibration {
            scale: 1.0,
            offset: 0.0,
            strategy: CalibrationStrategy::Identity,
        }
    }

    #[inline]
    pub fn apply(&self, raw: i16) -> f64 {
        raw as f64 * self.scale + self.offset
    }
}

/// Summed spectral power of the canonical EEG bands
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BandPower {
    /// 0.5-4 Hz
    pub delta: f64,
    /// 4-8 Hz
    pub theta: f64,
    /// 8-13 Hz
    pub alpha: f64,
    /// 13-30 Hz
    pub beta: f64,
    /// 30-100 Hz
    pub gamma: f64,
}

impl BandPower {
    pub const BAND_NAMES: [&'static str; 5] = ["delta", "theta", "alpha", "beta", "gamma"];

    pub fn as_array(&self) -> [f64; 5] {
        [self.delta, self.theta, self.alpha, self.beta, self.gamma]
    }

    pub fn total(&self) -> f64 {
        self.as_array().iter().sum()
    }

    /// Each band as a fraction of the five-band total (all zeros when the
    /// total is zero)
    pub fn relative(&self) -> BandPower {
        let total = self.total();
        if total <= 0.0 {
            return BandPower::default();
        }
        BandPower {
            delta: self.delta / total,
            theta: self.theta / total,
            alpha: self.alpha / total,
            beta: self.beta / total,
            gamma: self.gamma / total,
        }
    }

    /// Name of the band holding the most power, `None` when everything is zero
    pub fn dominant(&self) -> Option<&'static str> {
        let values = self.as_array();
        let (idx, max) = values
            .iter()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |acc, (i, &v)| if v > acc.1 { (i, v) } else { acc });
        if max > 0.0 {
            Some(Self::BAND_NAMES[idx])
        } else {
            None
        }
    }
}
