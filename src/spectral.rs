//! Amplitude spectra, EEG band power and spectrograms
//!
//! FFTs go through `rustfft`. [`SpectrumAnalyzer`] keeps one planner so that
//! repeated calls with the same length reuse the plan; the free functions
//! build a throwaway analyzer.

use std::f64::consts::PI;

use rustfft::{num_complex::Complex64, FftPlanner};

use crate::cancel::{self, CancelToken};
use crate::config::SpectrogramConfig;
use crate::error::{EegError, Result};
use crate::types::BandPower;

/// Power below this is reported as [`DB_FLOOR`]
pub const POWER_FLOOR: f64 = 1e-10;

/// Decibel value for (near) zero power
pub const DB_FLOOR: f64 = -100.0;

/// Canonical EEG bands as half-open `[low, high)` intervals in Hz
pub const EEG_BANDS: [(f64, f64); 5] = [(0.5, 4.0), (4.0, 8.0), (8.0, 13.0), (13.0, 30.0), (30.0, 100.0)];

/// Time-by-frequency power grid in decibels
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrogram {
    /// Centre time of each window in seconds
    pub times_sec: Vec<f64>,
    pub frequencies_hz: Vec<f64>,
    /// `power_db[window][bin]`
    pub power_db: Vec<Vec<f64>>,
    pub window_size: usize,
    pub hop_size: usize,
    /// `false` when a cancel request cut the computation short
    pub completed: bool,
}

impl Spectrogram {
    pub fn window_count(&self) -> usize {
        self.power_db.len()
    }
}

/// Number of full windows of `window_size` advancing by `hop_size`
pub fn window_count(sample_count: usize, window_size: usize, hop_size: usize) -> usize {
    if window_size == 0 || hop_size == 0 || sample_count < window_size {
        return 0;
    }
    (sample_count - window_size) / hop_size + 1
}

/// Frequency of each single-sided bin for an `n`-point transform
pub fn frequency_bins(n: usize, sampling_rate_hz: f64) -> Vec<f64> {
    if n == 0 {
        return Vec::new();
    }
    (0..=n / 2).map(|k| k as f64 * sampling_rate_hz / n as f64).collect()
}

/// Symmetric Hann window
pub fn hann_window(size: usize) -> Vec<f64> {
    if size <= 1 {
        return vec![1.0; size];
    }
    let denom = (size - 1) as f64;
    (0..size).map(|n| 0.5 * (1.0 - (2.0 * PI * n as f64 / denom).cos())).collect()
}

/// `10·log10(power)`, floored at -100 dB
pub fn power_to_db(power: f64) -> f64 {
    if power < POWER_FLOOR {
        DB_FLOOR
    } else {
        10.0 * power.log10()
    }
}

pub struct SpectrumAnalyzer {
    planner: FftPlanner<f64>,
}

impl Default for SpectrumAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl SpectrumAnalyzer {
    pub fn new() -> Self {
        SpectrumAnalyzer {
            planner: FftPlanner::new(),
        }
    }

    /// Single-sided amplitude spectrum `|X(k)| / N`, `N/2 + 1` bins
    ///
    /// Empty for empty input or a non-positive rate.
    pub fn amplitude_spectrum(&mut self, samples: &[f64], sampling_rate_hz: f64) -> Vec<f64> {
        if samples.is_empty() || !(sampling_rate_hz > 0.0) {
            return Vec::new();
        }
        let n = samples.len();
        let mut buffer: Vec<Complex64> = samples.iter().map(|&v| Complex64::new(v, 0.0)).collect();
        self.planner.plan_fft_forward(n).process(&mut buffer);

        buffer.iter().take(n / 2 + 1).map(|c| c.norm() / n as f64).collect()
    }

    /// Squared amplitudes summed per canonical band
    ///
    /// Bin `k` is placed at `k · rate / (2 · spectrum_len)`.
    pub fn band_power(&mut self, samples: &[f64], sampling_rate_hz: f64) -> BandPower {
        let spectrum = self.amplitude_spectrum(samples, sampling_rate_hz);
        let mut bands = [0.0; 5];
        if spectrum.is_empty() {
            return BandPower::default();
        }

        let resolution = sampling_rate_hz / (2.0 * spectrum.len() as f64);
        for (k, amplitude) in spectrum.iter().enumerate() {
            let freq = k as f64 * resolution;
            if let Some(band) = EEG_BANDS.iter().position(|&(lo, hi)| freq >= lo && freq < hi) {
                bands[band] += amplitude * amplitude;
            }
        }

        BandPower {
            delta: bands[0],
            theta: bands[1],
            alpha: bands[2],
            beta: bands[3],
            gamma: bands[4],
        }
    }

    /// Hann-windowed short-time power spectra in dB
    ///
    /// Each cell is `|X(k)|² / (Σw)²`, so a unit-amplitude sine centred on a
    /// bin reads about -6 dB.
    ///
    /// Window count is `(N - window_size) / hop_size + 1`. A cancelled token
    /// stops before the next window and returns the frames computed so far
    /// with `completed == false`.
    pub fn spectrogram(
        &mut self,
        samples: &[f64],
        sampling_rate_hz: f64,
        window_size: usize,
        hop_size: usize,
        cancel: Option<&CancelToken>,
    ) -> Result<Spectrogram> {
        if window_size == 0 || hop_size == 0 {
            return Err(EegError::Configuration(format!(
                "window size ({}) and hop size ({}) must be positive",
                window_size, hop_size
            )));
        }
        if !(sampling_rate_hz > 0.0) {
            return Err(EegError::Configuration(format!(
                "sampling rate must be positive, got {} Hz",
                sampling_rate_hz
            )));
        }
        let windows = window_count(samples.len(), window_size, hop_size);
        if windows == 0 {
            return Err(EegError::InsufficientData(format!(
                "{} samples is shorter than one {}-sample window",
                samples.len(),
                window_size
            )));
        }

        let fft = self.planner.plan_fft_forward(window_size);
        let taper = hann_window(window_size);
        // 用窗函数之和的平方归一化功率
        let window_gain = taper.iter().sum::<f64>().powi(2);
        let bins = window_size / 2 + 1;

        let mut result = Spectrogram {
            times_sec: Vec::with_capacity(windows),
            frequencies_hz: frequency_bins(window_size, sampling_rate_hz),
            power_db: Vec::with_capacity(windows),
            window_size,
            hop_size,
            completed: true,
        };

        let mut buffer = vec![Complex64::new(0.0, 0.0); window_size];
        for w in 0..windows {
            if cancel::is_cancelled(cancel) {
                result.completed = false;
                break;
            }
            let start = w * hop_size;
            for (slot, (&x, &t)) in buffer.iter_mut().zip(samples[start..start + window_size].iter().zip(&taper)) {
                *slot = Complex64::new(x * t, 0.0);
            }
            fft.process(&mut buffer);

            let frame = buffer
                .iter()
                .take(bins)
                .map(|c| {
                    if window_gain > 0.0 {
                        power_to_db(c.norm_sqr() / window_gain)
                    } else {
                        DB_FLOOR
                    }
                })
                .collect();
            result.power_db.push(frame);
            result
                .times_sec
                .push((start as f64 + window_size as f64 / 2.0) / sampling_rate_hz);
        }

        Ok(result)
    }

    /// [`SpectrumAnalyzer::spectrogram`] with window and hop taken from a config
    pub fn spectrogram_with(
        &mut self,
        samples: &[f64],
        sampling_rate_hz: f64,
        config: &SpectrogramConfig,
        cancel: Option<&CancelToken>,
    ) -> Result<Spectrogram> {
        self.spectrogram(samples, sampling_rate_hz, config.window_size, config.hop_size, cancel)
    }
}

/// See [`SpectrumAnalyzer::amplitude_spectrum`]
///
/// ```rust
/// use eegkit::spectral::discrete_fourier_transform;
///
/// // 4 Hz cosine sampled at 32 Hz over one second
/// let data: Vec<f64> = (0..32).map(|i| (2.0 * std::f64::consts::PI * 4.0 * i as f64 / 32.0).cos()).collect();
/// let spectrum = discrete_fourier_transform(&data, 32.0);
/// assert_eq!(spectrum.len(), 17);
/// assert!((spectrum[4] - 0.5).abs() < 1e-9);
/// ```
pub fn discrete_fourier_transform(samples: &[f64], sampling_rate_hz: f64) -> Vec<f64> {
    SpectrumAnalyzer::new().amplitude_spectrum(samples, sampling_rate_hz)
}

/// See [`SpectrumAnalyzer::band_power`]
pub fn band_power(samples: &[f64], sampling_rate_hz: f64) -> BandPower {
    SpectrumAnalyzer::new().band_power(samples, sampling_rate_hz)
}

/// See [`SpectrumAnalyzer::spectrogram`]
pub fn spectrogram(
    samples: &[f64],
    sampling_rate_hz: f64,
    window_size: usize,
    hop_size: usize,
    cancel: Option<&CancelToken>,
) -> Result<Spectrogram> {
    SpectrumAnalyzer::new().spectrogram(samples, sampling_rate_hz, window_size, hop_size, cancel)
}
