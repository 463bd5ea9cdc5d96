//! Delimited text import/export
//!
//! The first column is time and is ignored on import; every other column is
//! a channel. CSV carries no rate metadata, so imported channels get
//! [`LoadOptions::csv_sampling_rate_hz`].

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use log::{info, warn};

use crate::config::{LoadOptions, SaveOptions};
use crate::error::{EegError, Result};
use crate::recording::Recording;
use crate::types::Channel;

/// Delimiters tried in order on the header line
pub const CANDIDATE_DELIMITERS: [u8; 3] = [b',', b'\t', b';'];

/// Recording info given to every CSV import
pub const CSV_RECORDING_INFO: &str = "CSV Import";

/// Header of the time column written by [`write_csv`]
pub const TIME_COLUMN_HEADER: &str = "Time(s)";

/// What the CSV import skipped or inferred
#[derive(Debug, Clone, PartialEq)]
pub struct CsvReport {
    pub delimiter: u8,
    pub rows_loaded: usize,
    /// 1-based line numbers of rows dropped for a column-count mismatch
    pub skipped_rows: Vec<u64>,
}

/// First delimiter that splits `header_line` into at least two columns
///
/// ```rust
/// use eegkit::csv_format::sniff_delimiter;
///
/// assert_eq!(sniff_delimiter("time,Fp1,Fp2"), Some(b','));
/// assert_eq!(sniff_delimiter("time\tFp1"), Some(b'\t'));
/// assert_eq!(sniff_delimiter("time;Fp1"), Some(b';'));
/// assert_eq!(sniff_delimiter("just one column"), None);
/// ```
pub fn sniff_delimiter(header_line: &str) -> Option<u8> {
    CANDIDATE_DELIMITERS
        .iter()
        .copied()
        .find(|&d| header_line.split(d as char).count() >= 2)
}

fn is_content_line(line: &str) -> bool {
    let line = line.trim();
    !line.is_empty() && !line.starts_with('#')
}

/// Parses CSV text into channels
///
/// `#` lines are comments and blank lines are ignored. Rows whose column
/// count differs from the header are skipped with a warning; cells that are
/// not numbers become 0.0.
pub fn parse_csv(text: &str, options: &LoadOptions) -> Result<(Vec<Channel>, CsvReport)> {
    let header_line = text
        .lines()
        .find(|l| is_content_line(l))
        .ok_or_else(|| EegError::Format("CSV file has no header row".to_string()))?;
    let delimiter = sniff_delimiter(header_line.trim())
        .ok_or_else(|| EegError::Format("CSV header needs a time column and at least one channel".to_string()))?;

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .comment(Some(b'#'))
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let headers = reader.headers()?.clone();
    let column_count = headers.len();
    if column_count < 2 {
        return Err(EegError::Format(
            "CSV header needs a time column and at least one channel".to_string(),
        ));
    }

    let mut columns: Vec<Vec<f64>> = vec![Vec::new(); column_count - 1];
    let mut report = CsvReport {
        delimiter,
        rows_loaded: 0,
        skipped_rows: Vec::new(),
    };

    for result in reader.records() {
        let record = result?;
        if record.len() != column_count {
            let line = record.position().map(|p| p.line()).unwrap_or(0);
            warn!(
                "CSV line {} has {} values, expected {}; skipped",
                line,
                record.len(),
                column_count
            );
            report.skipped_rows.push(line);
            continue;
        }
        for (column, cell) in columns.iter_mut().zip(record.iter().skip(1)) {
            column.push(cell.parse::<f64>().unwrap_or(0.0));
        }
        report.rows_loaded += 1;
    }

    let channels = columns
        .into_iter()
        .zip(headers.iter().skip(1))
        .enumerate()
        .map(|(i, (samples, label))| {
            let label = if label.is_empty() {
                format!("Channel_{}", i + 1)
            } else {
                label.to_string()
            };
            Channel::new(label, options.csv_sampling_rate_hz, samples)
        })
        .collect();

    Ok((channels, report))
}

/// Loads a CSV file; patient info becomes the file stem
pub fn load_csv<P: AsRef<Path>>(path: P, options: &LoadOptions) -> Result<(Recording, CsvReport)> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => EegError::FileNotFound(path.display().to_string()),
        io::ErrorKind::InvalidData => EegError::Format(format!("{} is not UTF-8 text", path.display())),
        _ => EegError::Io(e),
    })?;

    let (channels, report) = parse_csv(&text, options)?;

    let mut recording = Recording::new();
    recording.channels = channels;
    recording.patient_info = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    recording.recording_info = CSV_RECORDING_INFO.to_string();

    if !report.skipped_rows.is_empty() {
        warn!(
            "Skipped {} malformed rows in {}",
            report.skipped_rows.len(),
            path.display()
        );
    }
    Ok((recording, report))
}

/// Writes a time column plus one column per channel
///
/// Rows run to the longest channel; shorter channels are padded with `0`.
/// The time step comes from the first channel's rate, or
/// [`SaveOptions::csv_default_sampling_rate_hz`] when that is not positive.
pub fn write_csv<W: Write>(writer: W, recording: &Recording, options: &SaveOptions) -> Result<()> {
    if recording.is_empty() {
        return Err(EegError::EmptyRecording);
    }

    let rate = recording
        .channels
        .first()
        .map(|c| c.sampling_rate_hz)
        .filter(|&r| r > 0.0)
        .unwrap_or(options.csv_default_sampling_rate_hz);
    let precision = options.csv_precision;
    let rows = recording.channels.iter().map(Channel::sample_count).max().unwrap_or(0);

    let mut out = csv::WriterBuilder::new().delimiter(b',').from_writer(writer);

    let mut header = vec![TIME_COLUMN_HEADER.to_string()];
    header.extend(recording.channels.iter().map(|c| c.label.clone()));
    out.write_record(&header)?;

    let mut row: Vec<String> = Vec::with_capacity(recording.channel_count() + 1);
    for i in 0..rows {
        row.clear();
        row.push(format!("{:.*}", precision, i as f64 / rate));
        for channel in &recording.channels {
            match channel.samples.get(i) {
                Some(v) => row.push(format!("{:.*}", precision, v)),
                None => row.push("0".to_string()),
            }
        }
        out.write_record(&row)?;
    }
    out.flush()?;
    Ok(())
}

pub fn save_csv<P: AsRef<Path>>(path: P, recording: &Recording, options: &SaveOptions) -> Result<()> {
    if recording.is_empty() {
        return Err(EegError::EmptyRecording);
    }
    let file = File::create(&path)?;
    write_csv(BufWriter::new(file), recording, options)?;
    info!(
        "Saved {} channels to {}",
        recording.channel_count(),
        path.as_ref().display()
    );
    Ok(())
}
