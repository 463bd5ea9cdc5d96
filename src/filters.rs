//! IIR filter building blocks
//!
//! Butterworth band-pass filters are built from cascaded second-order
//! sections (biquads) in Direct Form II Transposed. The powerline notch is
//! the classic single biquad evaluated with the plain difference equation.

use std::f64::consts::PI;

use crate::error::{EegError, Result};

/// Order used for both edges of the band-pass filter
pub const BANDPASS_ORDER: usize = 4;

/// Second-order section coefficients, normalised so that `a0 == 1`
///
/// `H(z) = (b0 + b1 z^-1 + b2 z^-2) / (1 + a1 z^-1 + a2 z^-2)`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiquadCoeffs {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

#[derive(Debug, Clone)]
struct Biquad {
    coeffs: BiquadCoeffs,
    z1: f64,
    z2: f64,
}

impl Biquad {
    fn new(coeffs: BiquadCoeffs) -> Self {
        Biquad { coeffs, z1: 0.0, z2: 0.0 }
    }

    #[inline]
    fn process(&mut self, input: f64) -> f64 {
        let c = &self.coeffs;
        let output = c.b0 * input + self.z1;
        self.z1 = c.b1 * input - c.a1 * output + self.z2;
        self.z2 = c.b2 * input - c.a2 * output;
        output
    }

    fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }
}

/// Cascade of biquad sections
#[derive(Debug, Clone)]
pub struct SosFilter {
    sections: Vec<Biquad>,
}

impl SosFilter {
    pub fn new(sections: Vec<BiquadCoeffs>) -> Self {
        SosFilter {
            sections: sections.into_iter().map(Biquad::new).collect(),
        }
    }

    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    #[inline]
    pub fn process(&mut self, input: f64) -> f64 {
        self.sections.iter_mut().fold(input, |acc, s| s.process(acc))
    }

    /// Causal, in-place filtering; state carries over between calls
    pub fn process_signal(&mut self, signal: &mut [f64]) {
        for sample in signal.iter_mut() {
            *sample = self.process(*sample);
        }
    }

    /// Forward-backward filtering: zero phase, squared magnitude response
    pub fn filtfilt(&mut self, signal: &mut [f64]) {
        self.reset();
        self.process_signal(signal);
        signal.reverse();
        self.reset();
        self.process_signal(signal);
        signal.reverse();
        self.reset();
    }

    pub fn reset(&mut self) {
        for section in &mut self.sections {
            section.reset();
        }
    }
}

/// Butterworth designs through the bilinear transform
pub struct ButterworthFilter;

impl ButterworthFilter {
    pub fn lowpass(cutoff_hz: f64, sampling_rate_hz: f64, order: usize) -> SosFilter {
        let wn = Self::prewarp(cutoff_hz, sampling_rate_hz);
        SosFilter::new(Self::design_lowpass(wn, order))
    }

    pub fn highpass(cutoff_hz: f64, sampling_rate_hz: f64, order: usize) -> SosFilter {
        let wn = Self::prewarp(cutoff_hz, sampling_rate_hz);
        SosFilter::new(Self::design_highpass(wn, order))
    }

    /// High-pass at `low_hz` cascaded with low-pass at `high_hz`
    pub fn bandpass(low_hz: f64, high_hz: f64, sampling_rate_hz: f64, order: usize) -> SosFilter {
        let mut sections = Self::design_highpass(Self::prewarp(low_hz, sampling_rate_hz), order);
        sections.extend(Self::design_lowpass(Self::prewarp(high_hz, sampling_rate_hz), order));
        SosFilter::new(sections)
    }

    fn prewarp(freq_hz: f64, sampling_rate_hz: f64) -> f64 {
        (PI * freq_hz / sampling_rate_hz).tan()
    }

    /// 2·sin(θk) 为第 k 对共轭极点的阻尼系数
    fn pole_damping(k: usize, order: usize) -> f64 {
        2.0 * (PI * (2 * k + 1) as f64 / (2 * order) as f64).sin()
    }

    fn design_lowpass(wn: f64, order: usize) -> Vec<BiquadCoeffs> {
        let mut sections = Vec::with_capacity((order + 1) / 2);
        let wn2 = wn * wn;

        for k in 0..order / 2 {
            let q = Self::pole_damping(k, order);
            let a0 = 1.0 + q * wn + wn2;
            sections.push(BiquadCoeffs {
                b0: wn2 / a0,
                b1: 2.0 * wn2 / a0,
                b2: wn2 / a0,
                a1: 2.0 * (wn2 - 1.0) / a0,
                a2: (1.0 - q * wn + wn2) / a0,
            });
        }

        if order % 2 == 1 {
            // 奇数阶时最后一节为一阶
            let k = wn / (1.0 + wn);
            sections.push(BiquadCoeffs {
                b0: k,
                b1: k,
                b2: 0.0,
                a1: (wn - 1.0) / (wn + 1.0),
                a2: 0.0,
            });
        }

        sections
    }

    fn design_highpass(wn: f64, order: usize) -> Vec<BiquadCoeffs> {
        let mut sections = Vec::with_capacity((order + 1) / 2);
        let wn2 = wn * wn;

        for k in 0..order / 2 {
            let q = Self::pole_damping(k, order);
            let a0 = 1.0 + q * wn + wn2;
            sections.push(BiquadCoeffs {
                b0: 1.0 / a0,
                b1: -2.0 / a0,
                b2: 1.0 / a0,
                a1: 2.0 * (wn2 - 1.0) / a0,
                a2: (1.0 - q * wn + wn2) / a0,
            });
        }

        if order % 2 == 1 {
            let k = 1.0 / (1.0 + wn);
            sections.push(BiquadCoeffs {
                b0: k,
                b1: -k,
                b2: 0.0,
                a1: (wn - 1.0) / (wn + 1.0),
                a2: 0.0,
            });
        }

        sections
    }
}

/// Checks `0 < low < high < rate / 2`
pub fn validate_bandpass(low_hz: f64, high_hz: f64, sampling_rate_hz: f64) -> Result<()> {
    if !(sampling_rate_hz > 0.0) {
        return Err(EegError::Configuration(format!(
            "sampling rate must be positive, got {} Hz",
            sampling_rate_hz
        )));
    }
    if !(low_hz > 0.0) || !(high_hz > low_hz) {
        return Err(EegError::Configuration(format!(
            "band edges must satisfy 0 < low < high, got {} Hz to {} Hz",
            low_hz, high_hz
        )));
    }
    let nyquist = sampling_rate_hz / 2.0;
    if high_hz >= nyquist {
        return Err(EegError::Configuration(format!(
            "high cutoff ({} Hz) must be less than Nyquist ({} Hz)",
            high_hz, nyquist
        )));
    }
    Ok(())
}

/// Caller-owned zero-phase Butterworth band-pass filter
///
/// Each instance carries its own state; nothing is shared between channels
/// or recordings. Redesigning with unchanged parameters is free.
///
/// ```rust
/// use eegkit::filters::BandpassFilter;
///
/// let mut filter = BandpassFilter::design(1.0, 40.0, 256.0)?;
/// let mut data: Vec<f64> = (0..512).map(|i| (i as f64 * 0.3).sin() + 5.0).collect();
/// filter.apply_zero_phase(&mut data);
/// assert!(data.iter().all(|v| v.is_finite()));
/// # Ok::<(), eegkit::EegError>(())
/// ```
#[derive(Debug, Clone)]
pub struct BandpassFilter {
    low_hz: f64,
    high_hz: f64,
    sampling_rate_hz: f64,
    filter: SosFilter,
}

impl BandpassFilter {
    pub fn design(low_hz: f64, high_hz: f64, sampling_rate_hz: f64) -> Result<Self> {
        validate_bandpass(low_hz, high_hz, sampling_rate_hz)?;
        Ok(BandpassFilter {
            low_hz,
            high_hz,
            sampling_rate_hz,
            filter: ButterworthFilter::bandpass(low_hz, high_hz, sampling_rate_hz, BANDPASS_ORDER),
        })
    }

    /// Re-targets the filter; returns `false` when the parameters did not change
    pub fn redesign(&mut self, low_hz: f64, high_hz: f64, sampling_rate_hz: f64) -> Result<bool> {
        if low_hz == self.low_hz && high_hz == self.high_hz && sampling_rate_hz == self.sampling_rate_hz {
            return Ok(false);
        }
        *self = Self::design(low_hz, high_hz, sampling_rate_hz)?;
        Ok(true)
    }

    pub fn low_hz(&self) -> f64 {
        self.low_hz
    }

    pub fn high_hz(&self) -> f64 {
        self.high_hz
    }

    pub fn sampling_rate_hz(&self) -> f64 {
        self.sampling_rate_hz
    }

    /// Causal single pass
    pub fn apply(&mut self, data: &mut [f64]) {
        self.filter.reset();
        self.filter.process_signal(data);
        self.filter.reset();
    }

    pub fn apply_zero_phase(&mut self, data: &mut [f64]) {
        self.filter.filtfilt(data);
    }
}

/// Second-order IIR notch, `alpha = sin(w0) / 2`
///
/// Coefficients are kept unnormalised (`a0 = 1 + alpha`) and applied with the
/// direct difference equation; the first two outputs copy the input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NotchFilter {
    pub notch_hz: f64,
    pub sampling_rate_hz: f64,
    pub b: [f64; 3],
    pub a: [f64; 3],
}

impl NotchFilter {
    pub fn design(notch_hz: f64, sampling_rate_hz: f64) -> Result<Self> {
        if !(sampling_rate_hz > 0.0) {
            return Err(EegError::Configuration(format!(
                "sampling rate must be positive, got {} Hz",
                sampling_rate_hz
            )));
        }
        let nyquist = sampling_rate_hz / 2.0;
        if !(notch_hz > 0.0) || notch_hz >= nyquist {
            return Err(EegError::Configuration(format!(
                "notch frequency ({} Hz) must lie in (0, {}) Hz",
                notch_hz, nyquist
            )));
        }

        let w0 = 2.0 * PI * notch_hz / sampling_rate_hz;
        let alpha = w0.sin() / 2.0;
        let cos_w0 = w0.cos();

        Ok(NotchFilter {
            notch_hz,
            sampling_rate_hz,
            b: [1.0, -2.0 * cos_w0, 1.0],
            a: [1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha],
        })
    }

    pub fn apply(&self, data: &mut [f64]) {
        if data.len() < 3 {
            return;
        }
        let [b0, b1, b2] = self.b;
        let [a0, a1, a2] = self.a;

        let mut y = vec![0.0; data.len()];
        y[0] = data[0];
        y[1] = data[1];
        for i in 2..data.len() {
            y[i] = (b0 * data[i] + b1 * data[i - 1] + b2 * data[i - 2] - a1 * y[i - 1] - a2 * y[i - 2]) / a0;
        }
        data.copy_from_slice(&y);
    }
}
