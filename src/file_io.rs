//! Extension-based load/save dispatch
//!
//! `.edf` goes to the EDF codec, `.csv`/`.txt`/`.dat` to CSV. Loading a file
//! with any other extension tries EDF first and then CSV; saving anything
//! that is not `.edf` writes CSV.

use std::path::Path;

use log::{debug, info};

use crate::cancel::CancelToken;
use crate::config::{LoadOptions, SaveOptions};
use crate::csv_format::{self, CsvReport};
use crate::error::{EegError, Result};
use crate::reader::{DecodeReport, EdfReader};
use crate::recording::Recording;
use crate::writer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Edf,
    Csv,
}

impl FileFormat {
    /// Format implied by the (case-insensitive) extension, if any
    pub fn from_path<P: AsRef<Path>>(path: P) -> Option<FileFormat> {
        let ext = path.as_ref().extension()?.to_string_lossy().to_ascii_lowercase();
        match ext.as_str() {
            "edf" => Some(FileFormat::Edf),
            "csv" | "txt" | "dat" => Some(FileFormat::Csv),
            _ => None,
        }
    }
}

/// Format-specific details of a load
#[derive(Debug, Clone, PartialEq)]
pub enum LoadReport {
    Edf(DecodeReport),
    Csv(CsvReport),
}

impl LoadReport {
    pub fn format(&self) -> FileFormat {
        match self {
            LoadReport::Edf(_) => FileFormat::Edf,
            LoadReport::Csv(_) => FileFormat::Csv,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadedRecording {
    pub recording: Recording,
    pub report: LoadReport,
}

/// Loads a recording with default options
///
/// ```rust
/// # let dir = tempfile::tempdir().unwrap();
/// # let path = dir.path().join("sleep.edf");
/// # eegkit::doctest_utils::create_multi_channel_test_file(&path)?;
/// let recording = eegkit::load(&path)?;
/// // the annotation track is skipped
/// assert_eq!(recording.channel_count(), 4);
/// assert_eq!(recording.duration(), 2.0);
/// # Ok::<(), eegkit::EegError>(())
/// ```
pub fn load<P: AsRef<Path>>(path: P) -> Result<Recording> {
    load_with(path, &LoadOptions::default(), None).map(|loaded| loaded.recording)
}

pub fn load_with<P: AsRef<Path>>(
    path: P,
    options: &LoadOptions,
    cancel: Option<&CancelToken>,
) -> Result<LoadedRecording> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(EegError::FileNotFound(path.display().to_string()));
    }

    match FileFormat::from_path(path) {
        Some(FileFormat::Edf) => load_edf(path, options, cancel),
        Some(FileFormat::Csv) => load_csv(path, options),
        None => {
            let edf_error = match load_edf(path, options, cancel) {
                Ok(loaded) => return Ok(loaded),
                // 取消不是格式问题，直接返回
                Err(EegError::Cancelled) => return Err(EegError::Cancelled),
                Err(e) => e,
            };
            debug!("{} is not EDF ({}), trying CSV", path.display(), edf_error);
            load_csv(path, options).map_err(|csv_error| {
                EegError::UnsupportedFileType(format!(
                    "{}: not EDF ({}) and not CSV ({})",
                    path.display(),
                    edf_error,
                    csv_error
                ))
            })
        }
    }
}

fn load_edf(path: &Path, options: &LoadOptions, cancel: Option<&CancelToken>) -> Result<LoadedRecording> {
    let mut reader = EdfReader::open(path)?;
    let decoded = reader.decode(options, cancel)?;
    info!(
        "Decoded {} of {} EDF records from {}",
        decoded.report.records_loaded,
        decoded.report.records_available,
        path.display()
    );
    Ok(LoadedRecording {
        recording: decoded.recording,
        report: LoadReport::Edf(decoded.report),
    })
}

fn load_csv(path: &Path, options: &LoadOptions) -> Result<LoadedRecording> {
    let (recording, report) = csv_format::load_csv(path, options)?;
    Ok(LoadedRecording {
        recording,
        report: LoadReport::Csv(report),
    })
}

pub fn save<P: AsRef<Path>>(path: P, recording: &Recording) -> Result<()> {
    save_with(path, recording, &SaveOptions::default())
}

/// `.edf` gets the minimal header writer, everything else CSV
pub fn save_with<P: AsRef<Path>>(path: P, recording: &Recording, options: &SaveOptions) -> Result<()> {
    match FileFormat::from_path(&path) {
        Some(FileFormat::Edf) => writer::save_edf(path, recording),
        _ => csv_format::save_csv(path, recording, options),
    }
}
