//! # EEG Signal Processing Core
//!
//! A pure Rust library for loading multi-channel EEG recordings (EDF and
//! CSV), cleaning them up with zero-phase filters and powerline notches,
//! re-referencing them through montages and looking at their spectra.
//! Everything runs synchronously on the calling thread; long operations
//! accept a [`CancelToken`].
//!
//! ## Quick Start
//!
//! ### Loading and filtering a recording
//!
//! ```rust
//! use eegkit::{ChannelStore, MontageKind, Result};
//!
//! fn main() -> Result<()> {
//!     # let dir = tempfile::tempdir().unwrap();
//!     # let path = dir.path().join("session.edf");
//!     # eegkit::doctest_utils::create_multi_channel_test_file(&path)?;
//!     let mut store = ChannelStore::new();
//!     let report = store.load_from_file(&path)?;
//!     println!("Loaded {} channels ({:?})", store.channel_count(), report.format());
//!
//!     // 0.5-40 Hz band-pass and 50 Hz notch on every channel
//!     for i in 0..store.channel_count() {
//!         store.apply_bandpass(i, 0.5, 40.0)?;
//!         store.apply_notch(i, 50.0)?;
//!     }
//!
//!     // C3/C4 and O1/O2 become C3-C4 and O1-O2
//!     let montage = store.apply_montage(MontageKind::Bipolar)?;
//!     assert_eq!(montage.channels_after, 2);
//!     assert_eq!(store.channel(0)?.label, "C3-C4");
//!     Ok(())
//! }
//! ```
//!
//! ### Spectral analysis
//!
//! ```rust
//! use eegkit::spectral::{band_power, spectrogram};
//!
//! let rate = 256.0;
//! let alpha: Vec<f64> = (0..1024)
//!     .map(|i| (2.0 * std::f64::consts::PI * 10.0 * i as f64 / rate).sin())
//!     .collect();
//!
//! let power = band_power(&alpha, rate);
//! assert_eq!(power.dominant(), Some("alpha"));
//!
//! let grid = spectrogram(&alpha, rate, 256, 128, None)?;
//! assert_eq!(grid.window_count(), 7);
//! # Ok::<(), eegkit::EegError>(())
//! ```
//!
//! ## Calibration recovery
//!
//! EDF stores 16-bit integers plus a per-signal linear calibration. When
//! the header calibration is degenerate the reader infers one from the raw
//! data instead of failing; [`DecodeReport`] tells which channels were
//! affected:
//!
//! ```rust
//! use eegkit::{EdfReader, LoadOptions, CalibrationStrategy};
//! use eegkit::doctest_utils::{EdfFileBuilder, EdfSignalSpec};
//!
//! let bytes = EdfFileBuilder::new()
//!     .signal(EdfSignalSpec::new("Fz", 16)
//!         .calibration(0.0, 0.0, -32768.0, 32767.0)
//!         .samples((0..16).map(|i| i * 2).collect()))
//!     .build();
//!
//! let mut reader = EdfReader::from_reader(std::io::Cursor::new(bytes))?;
//! let decoded = reader.decode(&LoadOptions::default(), None)?;
//! let fallback: Vec<_> = decoded.report.fallback_calibrations().collect();
//! assert_eq!(fallback[0].calibration.strategy, CalibrationStrategy::RawMicrovolts);
//! assert_eq!(decoded.recording.channels[0].samples[3], 6.0);
//! # Ok::<(), eegkit::EegError>(())
//! ```

pub mod cancel;
pub mod config;
pub mod csv_format;
pub mod error;
pub mod file_io;
pub mod filters;
pub mod montage;
pub mod reader;
pub mod recording;
pub mod signal;
pub mod spectral;
pub mod types;
pub mod utils;
pub mod writer;

#[doc(hidden)]
pub mod doctest_utils; // For internal doctest support

// Re-export main types for convenience
pub use cancel::CancelToken;
pub use config::{LoadOptions, SaveOptions, SpectrogramConfig};
pub use error::{EegError, Result};
pub use file_io::{load, load_with, save, save_with, FileFormat, LoadReport, LoadedRecording};
pub use filters::{BandpassFilter, NotchFilter};
pub use montage::{MontageKind, PairingStrategy};
pub use reader::{DecodeReport, EdfDecoded, EdfHeader, EdfReader, EdfSignalHeader};
pub use recording::{ChannelStore, MontageReport, ObserverId, Recording, StoreEvent};
pub use spectral::{Spectrogram, SpectrumAnalyzer};
pub use types::{BandPower, Calibration, CalibrationPair, CalibrationStrategy, Channel, ChannelSummary};

// Important constants
pub const EDF_HEADER_BYTES: usize = 256;
pub const EDF_MAX_SIGNALS: usize = 4096;

/// Library version
///
/// ```rust
/// let version = eegkit::version();
/// assert!(version.contains('.'));
/// ```
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
