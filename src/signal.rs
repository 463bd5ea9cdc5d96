//! Per-channel sample operations
//!
//! Everything here works on a plain `f64` slice. Mutating operations work in
//! place; statistics return 0.0 for empty input. Filter entry points validate
//! their parameters first and leave the samples untouched when they are
//! rejected, logging a warning and returning [`EegError::Configuration`].

use log::warn;

use crate::error::{EegError, Result};
use crate::filters::{BandpassFilter, NotchFilter};

/// Default powerline frequency for [`notch_filter`]
pub const DEFAULT_NOTCH_HZ: f64 = 50.0;

pub fn apply_gain(samples: &mut [f64], factor: f64) {
    for v in samples.iter_mut() {
        *v *= factor;
    }
}

pub fn apply_offset(samples: &mut [f64], delta: f64) {
    for v in samples.iter_mut() {
        *v += delta;
    }
}

/// Rescales into `[0, 1]`
pub fn normalize(samples: &mut [f64]) {
    normalize_to(samples, 0.0, 1.0);
}

/// Linear rescale so that `min -> target_min` and `max -> target_max`
///
/// Empty or constant input is left as is.
///
/// ```rust
/// let mut data = vec![2.0, 4.0, 6.0];
/// eegkit::signal::normalize_to(&mut data, -1.0, 1.0);
/// assert_eq!(data, vec![-1.0, 0.0, 1.0]);
/// ```
pub fn normalize_to(samples: &mut [f64], target_min: f64, target_max: f64) {
    if samples.is_empty() {
        return;
    }
    let current_min = min_value(samples);
    let range = max_value(samples) - current_min;
    if !(range > 0.0) {
        return;
    }

    let target_range = target_max - target_min;
    for v in samples.iter_mut() {
        *v = target_min + (*v - current_min) / range * target_range;
    }
}

/// Subtracts the arithmetic mean
pub fn remove_dc(samples: &mut [f64]) {
    if samples.is_empty() {
        return;
    }
    let m = mean(samples);
    apply_offset(samples, -m);
}

/// Zero-phase Butterworth band-pass
///
/// DC is removed first, then a freshly designed 4th-order band-pass runs
/// forward and backward. Requires `0 < low < high < rate / 2`.
pub fn bandpass_filter(samples: &mut [f64], sampling_rate_hz: f64, low_cut_hz: f64, high_cut_hz: f64) -> Result<()> {
    let mut filter = match BandpassFilter::design(low_cut_hz, high_cut_hz, sampling_rate_hz) {
        Ok(f) => f,
        Err(e) => {
            warn!("Band-pass {}-{} Hz rejected: {}", low_cut_hz, high_cut_hz, e);
            return Err(e);
        }
    };
    if samples.is_empty() {
        return Ok(());
    }

    remove_dc(samples);
    filter.apply_zero_phase(samples);
    Ok(())
}

/// Powerline notch; see [`NotchFilter`]
///
/// Fewer than 4 samples is a silent no-op.
pub fn notch_filter(samples: &mut [f64], sampling_rate_hz: f64, notch_hz: f64) -> Result<()> {
    if samples.len() < 4 {
        return Ok(());
    }
    let notch = NotchFilter::design(notch_hz, sampling_rate_hz).map_err(|e| {
        warn!("Notch at {} Hz rejected: {}", notch_hz, e);
        e
    })?;
    notch.apply(samples);
    Ok(())
}

pub fn mean(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().sum::<f64>() / samples.len() as f64
}

/// Population standard deviation (divides by N)
pub fn standard_deviation(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let m = mean(samples);
    let variance = samples.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / samples.len() as f64;
    variance.sqrt()
}

pub fn min_value(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().copied().fold(f64::INFINITY, f64::min)
}

pub fn max_value(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}

/// Copies the samples between `start_sec` and `start_sec + duration_sec`
///
/// The index range `[floor(start·rate), floor((start+duration)·rate)]` is
/// inclusive and clamped to the buffer. An inverted or fully out-of-range
/// window yields an empty vector.
///
/// ```rust
/// use eegkit::signal::extract_time_window;
///
/// let data: Vec<f64> = (0..10).map(|i| i as f64).collect();
/// assert_eq!(extract_time_window(&data, 2.0, 1.0, 1.0), vec![2.0, 3.0, 4.0]);
/// assert!(extract_time_window(&data, 2.0, 20.0, 1.0).is_empty());
/// ```
pub fn extract_time_window(samples: &[f64], sampling_rate_hz: f64, start_sec: f64, duration_sec: f64) -> Vec<f64> {
    if samples.is_empty() || !(sampling_rate_hz > 0.0) {
        return Vec::new();
    }

    // f64 -> i64 的转换是饱和的，NaN 变成 0
    let start = ((start_sec * sampling_rate_hz).floor() as i64).max(0);
    let end = (((start_sec + duration_sec) * sampling_rate_hz).floor() as i64).min(samples.len() as i64 - 1);

    if start > end {
        return Vec::new();
    }
    samples[start as usize..=end as usize].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn test_gain_and_offset() {
        let mut data = vec![1.0, -2.0, 3.0];
        apply_gain(&mut data, 2.0);
        assert_eq!(data, vec![2.0, -4.0, 6.0]);
        apply_offset(&mut data, 1.0);
        assert_eq!(data, vec![3.0, -3.0, 7.0]);
        apply_gain(&mut data, 0.0);
        assert!(data.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_normalize_and_inverse() {
        let original = vec![-3.0, 0.5, 7.25, 2.0, -1.0];
        let (lo, hi) = (min_value(&original), max_value(&original));
        let mut data = original.clone();
        normalize(&mut data);
        assert_eq!(min_value(&data), 0.0);
        assert_eq!(max_value(&data), 1.0);

        for v in data.iter_mut() {
            *v = lo + *v * (hi - lo);
        }
        for (a, b) in data.iter().zip(&original) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn test_normalize_constant_and_empty_are_noops() {
        let mut flat = vec![4.0; 5];
        normalize(&mut flat);
        assert_eq!(flat, vec![4.0; 5]);

        let mut empty: Vec<f64> = Vec::new();
        normalize(&mut empty);
        assert!(empty.is_empty());
    }

    #[test]
    fn test_remove_dc() {
        let mut data = vec![10.0, 12.0, 14.0, 16.0];
        remove_dc(&mut data);
        assert!(mean(&data).abs() < 1e-12);
        assert_eq!(data, vec![-3.0, -1.0, 1.0, 3.0]);
    }

    #[test]
    fn test_statistics() {
        let data = vec![2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_eq!(mean(&data), 5.0);
        assert_eq!(standard_deviation(&data), 2.0);
        assert_eq!(min_value(&data), 2.0);
        assert_eq!(max_value(&data), 9.0);

        let empty: [f64; 0] = [];
        assert_eq!(mean(&empty), 0.0);
        assert_eq!(standard_deviation(&empty), 0.0);
        assert_eq!(min_value(&empty), 0.0);
        assert_eq!(max_value(&empty), 0.0);
    }

    #[test]
    fn test_bandpass_rejects_bad_cutoffs_without_touching_data() {
        let original: Vec<f64> = (0..100).map(|i| i as f64).collect();
        let mut data = original.clone();
        let err = bandpass_filter(&mut data, 250.0, 1.0, 200.0).unwrap_err();
        assert!(matches!(err, EegError::Configuration(_)));
        assert_eq!(data, original);

        assert!(bandpass_filter(&mut data, 250.0, -1.0, 30.0).is_err());
        assert!(bandpass_filter(&mut data, 0.0, 1.0, 30.0).is_err());
        assert_eq!(data, original);
    }

    #[test]
    fn test_bandpass_removes_offset() {
        let rate = 250.0;
        let mut data: Vec<f64> = (0..2500)
            .map(|i| 100.0 + (2.0 * PI * 10.0 * i as f64 / rate).sin())
            .collect();
        bandpass_filter(&mut data, rate, 1.0, 40.0).unwrap();
        assert!(mean(&data[500..2000]).abs() < 0.05);
        assert!(max_value(&data[500..2000]) > 0.8);
    }

    #[test]
    fn test_notch_short_input_is_noop() {
        let mut data = vec![1.0, 2.0, 3.0];
        notch_filter(&mut data, 250.0, 50.0).unwrap();
        assert_eq!(data, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_notch_invalid_rate_leaves_data() {
        let mut data = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        assert!(notch_filter(&mut data, 0.0, 50.0).is_err());
        assert_eq!(data, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_time_window_clamping() {
        let data: Vec<f64> = (0..10).map(|i| i as f64).collect();
        assert_eq!(extract_time_window(&data, 1.0, -5.0, 7.0), vec![0.0, 1.0, 2.0]);
        assert_eq!(extract_time_window(&data, 1.0, 8.0, 100.0), vec![8.0, 9.0]);
        assert!(extract_time_window(&data, 0.0, 0.0, 1.0).is_empty());
        assert!(extract_time_window(&[], 1.0, 0.0, 1.0).is_empty());
        assert!(extract_time_window(&data, 1.0, -10.0, 2.0).is_empty());
    }

    #[test]
    fn test_time_window_reextraction_is_stable() {
        let data: Vec<f64> = (0..50).map(|i| (i as f64).sqrt()).collect();
        let first = extract_time_window(&data, 10.0, 1.0, 2.0);
        let second = extract_time_window(&data, 10.0, 1.0, 2.0);
        assert_eq!(first, second);
        assert_eq!(first.len(), 21);
        assert_eq!(first[0], data[10]);
    }
}
