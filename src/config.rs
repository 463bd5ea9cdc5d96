//! Tunables for loading, saving and spectral analysis
//!
//! All option structs deserialize with `#[serde(default)]`, so a host can
//! persist only the fields it changes.

use serde::{Deserialize, Serialize};

use crate::types::DEFAULT_SAMPLING_RATE_HZ;

/// Maximum number of EDF data records decoded per file
pub const DEFAULT_MAX_RECORDS: usize = 10_000;

/// Maximum number of signal channels kept per loaded file
pub const DEFAULT_MAX_CHANNELS: usize = 32;

/// Decimal places used by the CSV writer
pub const DEFAULT_CSV_PRECISION: usize = 6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadOptions {
    /// Records beyond this count are not read (memory bound, reported)
    pub max_records: usize,
    /// Signal channels beyond this count are dropped (reported)
    pub max_channels: usize,
    /// Rate assigned to CSV columns, which carry no rate metadata
    pub csv_sampling_rate_hz: f64,
}

impl Default for LoadOptions {
    fn default() -> Self {
        LoadOptions {
            max_records: DEFAULT_MAX_RECORDS,
            max_channels: DEFAULT_MAX_CHANNELS,
            csv_sampling_rate_hz: DEFAULT_SAMPLING_RATE_HZ,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveOptions {
    /// Time axis rate when the first channel has no usable rate
    pub csv_default_sampling_rate_hz: f64,
    pub csv_precision: usize,
}

impl Default for SaveOptions {
    fn default() -> Self {
        SaveOptions {
            csv_default_sampling_rate_hz: DEFAULT_SAMPLING_RATE_HZ,
            csv_precision: DEFAULT_CSV_PRECISION,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectrogramConfig {
    /// Samples per analysis window
    pub window_size: usize,
    /// Samples between consecutive window starts
    pub hop_size: usize,
}

impl Default for SpectrogramConfig {
    fn default() -> Self {
        SpectrogramConfig {
            window_size: 256,
            hop_size: 128,
        }
    }
}
