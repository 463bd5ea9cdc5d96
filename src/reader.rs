//! EDF decoding
//!
//! Files are read with the standard EDF layout: a 256-byte fixed header,
//! then the signal headers stored field by field (all labels, then all
//! transducers, and so on), then record-interleaved little-endian `i16`
//! samples. The record duration comes from the fixed header.

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use log::{debug, warn};

use crate::cancel::{self, CancelToken};
use crate::config::LoadOptions;
use crate::error::{EegError, Result};
use crate::recording::Recording;
use crate::types::{Calibration, CalibrationPair, CalibrationStrategy, Channel, DEFAULT_UNIT};
use crate::utils::{latin1_field, parse_float, parse_int, parse_positive_int};
use crate::{EDF_HEADER_BYTES, EDF_MAX_SIGNALS};

/// Spans at or below this are treated as degenerate calibration
pub const MIN_CALIBRATION_SPAN: f64 = 0.1;

/// Dynamic calibration needs more raw samples than this
pub const MIN_SAMPLES_FOR_DYNAMIC_SCALING: usize = 10;

/// Raw spans below this are assumed to already be microvolts
pub const MICROVOLT_RAW_SPAN: f64 = 100.0;

/// Raw spans above this are assumed to cover the full 16-bit range
pub const FULL_SCALE_RAW_SPAN: f64 = 30_000.0;

/// Full-scale data is mapped onto ±100 µV
pub const FULL_SCALE_PHYSICAL_SPAN_UV: f64 = 200.0;
pub const FULL_SCALE_DIGITAL_SPAN: f64 = 65_536.0;

/// Everything in between is rescaled onto ±50 µV
pub const RESCALED_TARGET_SPAN_UV: f64 = 100.0;

/// Substitutes for calibration fields that do not parse
const FALLBACK_PHYSICAL_MIN: f64 = -500.0;
const FALLBACK_PHYSICAL_MAX: f64 = 500.0;
const FALLBACK_DIGITAL_MIN: f64 = -32768.0;
const FALLBACK_DIGITAL_MAX: f64 = 32767.0;

/// Record duration used when the header field is unusable
const DEFAULT_RECORD_DURATION_SEC: f64 = 1.0;

// 标准 EDF 信号头部的字段宽度，按字段顺序排列（每个字段连续存放 N 个信号）
const LABEL_WIDTH: usize = 16;
const TRANSDUCER_WIDTH: usize = 80;
const DIMENSION_WIDTH: usize = 8;
const NUMBER_WIDTH: usize = 8;
const PREFILTER_WIDTH: usize = 80;
const RESERVED_WIDTH: usize = 32;

/// Per-signal header fields as found in the file
#[derive(Debug, Clone, PartialEq)]
pub struct EdfSignalHeader {
    pub label: String,
    pub physical_dimension: String,
    pub calibration: CalibrationPair,
    pub samples_per_record: usize,
}

impl EdfSignalHeader {
    /// EDF+ annotation tracks carry text, not samples
    pub fn is_annotation(&self) -> bool {
        self.label.to_ascii_lowercase().contains("annotation")
    }
}

/// Parsed EDF header
#[derive(Debug, Clone, PartialEq)]
pub struct EdfHeader {
    pub version: String,
    pub patient: String,
    pub recording: String,
    /// `None` when the date/time fields do not parse
    pub start: Option<NaiveDateTime>,
    /// Record count field; `-1` (unknown) and garbage are kept as read
    pub declared_records: Option<i64>,
    pub record_duration_sec: f64,
    pub signals: Vec<EdfSignalHeader>,
}

impl EdfHeader {
    /// Offset of the first data record, `256 · (N + 1)`
    pub fn header_size(&self) -> u64 {
        (EDF_HEADER_BYTES * (self.signals.len() + 1)) as u64
    }

    /// Bytes in one data record (2 per sample); `None` on overflow
    pub fn bytes_per_record(&self) -> Option<usize> {
        self.signals
            .iter()
            .try_fold(0usize, |acc, s| acc.checked_add(s.samples_per_record))?
            .checked_mul(2)
    }
}

/// Calibration chosen for one loaded channel
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelCalibration {
    pub label: String,
    pub calibration: Calibration,
}

/// What the decoder did beyond the happy path
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodeReport {
    /// Complete records present in the file
    pub records_available: usize,
    pub records_loaded: usize,
    /// `true` when `records_available` exceeded `LoadOptions::max_records`
    pub record_cap_applied: bool,
    pub declared_records: Option<i64>,
    pub calibrations: Vec<ChannelCalibration>,
    pub skipped_annotation_channels: Vec<String>,
    /// Signal channels dropped by `LoadOptions::max_channels`
    pub dropped_channels: usize,
}

impl DecodeReport {
    pub fn channel_cap_applied(&self) -> bool {
        self.dropped_channels > 0
    }

    /// Channels whose header calibration was unusable
    pub fn fallback_calibrations(&self) -> impl Iterator<Item = &ChannelCalibration> {
        self.calibrations
            .iter()
            .filter(|c| c.calibration.strategy != CalibrationStrategy::Header)
    }
}

/// Result of a successful decode
#[derive(Debug, Clone)]
pub struct EdfDecoded {
    pub recording: Recording,
    pub report: DecodeReport,
}

/// EDF file decoder
///
/// Opening a reader parses and validates the headers; [`decode`](EdfReader::decode)
/// reads the data records, resolves calibration and builds a fresh
/// [`Recording`]. Any failure during decode returns an error and nothing
/// partial escapes.
///
/// # Examples
///
/// ```rust
/// use eegkit::{EdfReader, LoadOptions};
///
/// # let dir = tempfile::tempdir().unwrap();
/// # let path = dir.path().join("recording.edf");
/// # eegkit::doctest_utils::create_simple_test_file(&path)?;
/// let mut reader = EdfReader::open(&path)?;
/// println!("Signals: {}", reader.header().signals.len());
///
/// let decoded = reader.decode(&LoadOptions::default(), None)?;
/// let channel = &decoded.recording.channels[0];
/// assert_eq!(channel.sampling_rate_hz, 256.0);
/// assert!(!decoded.report.record_cap_applied);
/// # Ok::<(), eegkit::EegError>(())
/// ```
pub struct EdfReader<R> {
    source: R,
    header: EdfHeader,
    file_size: u64,
}

impl EdfReader<BufReader<File>> {
    /// Opens and parses an EDF file
    ///
    /// # Errors
    ///
    /// * `EegError::FileNotFound` - the file can't be opened
    /// * `EegError::Format` - the header is truncated or malformed
    /// * `EegError::InvalidSignalCount` - the signal count is not in `1..=4096`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(&path).map_err(|_| EegError::FileNotFound(path.as_ref().display().to_string()))?;
        Self::from_reader(BufReader::new(file))
    }
}

impl<R: Read + Seek> EdfReader<R> {
    /// Parses the headers from any seekable source
    pub fn from_reader(mut source: R) -> Result<Self> {
        let file_size = source.seek(SeekFrom::End(0))?;
        source.seek(SeekFrom::Start(0))?;
        let header = parse_header(&mut source)?;
        Ok(EdfReader {
            source,
            header,
            file_size,
        })
    }

    pub fn header(&self) -> &EdfHeader {
        &self.header
    }

    /// Number of complete data records in the file
    pub fn records_available(&self) -> usize {
        match self.header.bytes_per_record() {
            Some(bytes_per_record) if bytes_per_record > 0 => {
                (self.file_size.saturating_sub(self.header.header_size()) / bytes_per_record as u64) as usize
            }
            _ => 0,
        }
    }

    /// Reads every data record (up to the cap) and builds a recording
    pub fn decode(&mut self, options: &LoadOptions, cancel: Option<&CancelToken>) -> Result<EdfDecoded> {
        let bytes_per_record = self
            .header
            .bytes_per_record()
            .ok_or_else(|| EegError::Format("samples per record overflow the record size".to_string()))?;
        if bytes_per_record == 0 {
            return Err(EegError::Format("data records contain no samples".to_string()));
        }

        // 分配缓冲区之前先确认文件里至少有一条完整记录
        let records_available = self.records_available();
        if records_available == 0 {
            return Err(EegError::Format(format!(
                "no complete data record: {} bytes per record, {} bytes after the header",
                bytes_per_record,
                self.file_size.saturating_sub(self.header.header_size())
            )));
        }
        let record_cap_applied = records_available > options.max_records;
        let records = records_available.min(options.max_records);
        if record_cap_applied {
            warn!(
                "EDF file holds {} records, loading only the first {}",
                records_available, records
            );
        }
        if let Some(declared) = self.header.declared_records {
            if declared >= 0 && declared as usize != records_available {
                debug!(
                    "Header declares {} records, file size gives {}",
                    declared, records_available
                );
            }
        }

        let raw = self.read_records(records, bytes_per_record, cancel)?;

        let mut report = DecodeReport {
            records_available,
            records_loaded: records,
            record_cap_applied,
            declared_records: self.header.declared_records,
            ..DecodeReport::default()
        };

        let mut recording = Recording::new();
        recording.patient_info = self.header.patient.clone();
        recording.recording_info = self.header.recording.clone();
        if let Some(start) = self.header.start {
            recording.start = start;
        }

        for (index, (signal, raw_samples)) in self.header.signals.iter().zip(&raw).enumerate() {
            if signal.is_annotation() {
                debug!("Skipping annotation track '{}'", signal.label);
                report.skipped_annotation_channels.push(signal.label.clone());
                continue;
            }
            if recording.channels.len() >= options.max_channels {
                report.dropped_channels += 1;
                continue;
            }

            let label = if signal.label.is_empty() {
                format!("CH{}", index + 1)
            } else {
                signal.label.clone()
            };
            let calibration = resolve_calibration(&signal.calibration, raw_samples);
            debug!(
                "Channel '{}': {} samples, scale {:.6}, offset {:.3} ({:?})",
                label,
                raw_samples.len(),
                calibration.scale,
                calibration.offset,
                calibration.strategy
            );

            let unit = if calibration.strategy == CalibrationStrategy::Header && !signal.physical_dimension.is_empty() {
                signal.physical_dimension.clone()
            } else {
                DEFAULT_UNIT.to_string()
            };

            recording.channels.push(Channel {
                label: label.clone(),
                unit,
                physical_min: signal.calibration.physical_min,
                physical_max: signal.calibration.physical_max,
                digital_min: signal.calibration.digital_min,
                digital_max: signal.calibration.digital_max,
                sampling_rate_hz: signal.samples_per_record as f64 / self.header.record_duration_sec,
                samples: raw_samples.iter().map(|&v| calibration.apply(v)).collect(),
            });
            report.calibrations.push(ChannelCalibration { label, calibration });
        }

        if report.dropped_channels > 0 {
            warn!(
                "Dropped {} signal channels beyond the limit of {}",
                report.dropped_channels, options.max_channels
            );
        }

        Ok(EdfDecoded { recording, report })
    }

    /// 按记录交错读取原始样本，返回每个信号的连续缓冲区
    fn read_records(
        &mut self,
        records: usize,
        bytes_per_record: usize,
        cancel: Option<&CancelToken>,
    ) -> Result<Vec<Vec<i16>>> {
        self.source.seek(SeekFrom::Start(self.header.header_size()))?;

        let mut raw: Vec<Vec<i16>> = self
            .header
            .signals
            .iter()
            .map(|s| {
                s.samples_per_record
                    .checked_mul(records)
                    .map(Vec::with_capacity)
                    .ok_or_else(|| EegError::Format(format!("signal '{}' is too large to load", s.label)))
            })
            .collect::<Result<_>>()?;
        let mut buffer = vec![0u8; bytes_per_record];

        for record in 0..records {
            if cancel::is_cancelled(cancel) {
                debug!("EDF decode cancelled at record {}", record);
                return Err(EegError::Cancelled);
            }
            read_exact_or_format(&mut self.source, &mut buffer, "data record")?;

            let mut offset = 0;
            for (signal, samples) in self.header.signals.iter().zip(raw.iter_mut()) {
                let end = offset + 2 * signal.samples_per_record;
                samples.extend(
                    buffer[offset..end]
                        .chunks_exact(2)
                        .map(|pair| i16::from_le_bytes([pair[0], pair[1]])),
                );
                offset = end;
            }
        }

        Ok(raw)
    }
}

/// Picks the raw-to-physical conversion for one signal
///
/// Header calibration wins when both ranges are usable. Otherwise the raw
/// data itself decides: small spans are taken as microvolts, full 16-bit
/// spans are mapped onto ±100 µV, anything else onto ±50 µV, always
/// centred on the raw mean. Too little data means identity.
///
/// ```rust
/// use eegkit::reader::resolve_calibration;
/// use eegkit::{CalibrationPair, CalibrationStrategy};
///
/// let pair = CalibrationPair { physical_min: -100.0, physical_max: 100.0, digital_min: -32768.0, digital_max: 32767.0 };
/// let cal = resolve_calibration(&pair, &[]);
/// assert_eq!(cal.strategy, CalibrationStrategy::Header);
/// assert!((cal.apply(16384) - 50.0).abs() < 0.01);
/// ```
pub fn resolve_calibration(pair: &CalibrationPair, raw: &[i16]) -> Calibration {
    if pair.is_valid(MIN_CALIBRATION_SPAN) {
        let scale = (pair.physical_max - pair.physical_min) / (pair.digital_max - pair.digital_min);
        return Calibration {
            scale,
            offset: pair.physical_min - pair.digital_min * scale,
            strategy: CalibrationStrategy::Header,
        };
    }

    if raw.len() <= MIN_SAMPLES_FOR_DYNAMIC_SCALING {
        return Calibration::identity();
    }

    let (lo, hi) = raw
        .iter()
        .fold((i16::MAX, i16::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let range = hi as f64 - lo as f64;
    if range <= MIN_CALIBRATION_SPAN {
        return Calibration::identity();
    }
    if range < MICROVOLT_RAW_SPAN {
        return Calibration {
            scale: 1.0,
            offset: 0.0,
            strategy: CalibrationStrategy::RawMicrovolts,
        };
    }

    let mean = raw.iter().map(|&v| v as f64).sum::<f64>() / raw.len() as f64;
    let (scale, strategy) = if range > FULL_SCALE_RAW_SPAN {
        (FULL_SCALE_PHYSICAL_SPAN_UV / FULL_SCALE_DIGITAL_SPAN, CalibrationStrategy::FullScale)
    } else {
        (RESCALED_TARGET_SPAN_UV / range, CalibrationStrategy::Rescaled)
    };
    Calibration {
        scale,
        offset: -mean * scale,
        strategy,
    }
}

/// Parses the `dd.mm.yy` / `hh.mm.ss` header fields
///
/// Two-digit years 85..=99 are 19xx, everything else 20xx.
pub fn parse_start_datetime(date: &str, time: &str) -> Option<NaiveDateTime> {
    let [day, month, year] = split_triplet(date)?;
    let [hour, minute, second] = split_triplet(time)?;
    let year = if year >= 85 { 1900 + year } else { 2000 + year };

    let date = NaiveDate::from_ymd_opt(year as i32, month, day)?;
    let time = NaiveTime::from_hms_opt(hour, minute, second)?;
    Some(NaiveDateTime::new(date, time))
}

fn split_triplet(field: &str) -> Option<[u32; 3]> {
    let mut parts = field.trim().split('.');
    let mut out = [0u32; 3];
    for slot in out.iter_mut() {
        let part = parts.next()?;
        if part.len() != 2 || !part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        *slot = part.parse().ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(out)
}

fn read_exact_or_format<R: Read>(source: &mut R, buffer: &mut [u8], what: &str) -> Result<()> {
    source.read_exact(buffer).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => EegError::Format(format!("file ends inside the {}", what)),
        _ => EegError::Io(e),
    })
}

/// 读取一个字段块（N 个定宽字段连续存放）
fn read_field_block<R: Read>(source: &mut R, width: usize, count: usize, what: &str) -> Result<Vec<String>> {
    let mut block = vec![0u8; width * count];
    read_exact_or_format(source, &mut block, what)?;
    Ok(block.chunks_exact(width).map(latin1_field).collect())
}

fn parse_header<R: Read>(source: &mut R) -> Result<EdfHeader> {
    let mut fixed = [0u8; EDF_HEADER_BYTES];
    read_exact_or_format(source, &mut fixed, "256-byte fixed header")?;

    let signals_field = latin1_field(&fixed[252..256]);
    let signal_count = match parse_positive_int(&signals_field) {
        Some(n) if n as usize <= EDF_MAX_SIGNALS => n as usize,
        _ => {
            return Err(EegError::InvalidSignalCount(format!(
                "'{}' is not a signal count in 1..={}",
                signals_field, EDF_MAX_SIGNALS
            )))
        }
    };

    let start = parse_start_datetime(&latin1_field(&fixed[168..176]), &latin1_field(&fixed[176..184]));
    if start.is_none() {
        debug!("Unparsable start date/time, keeping default timestamp");
    }

    let record_duration_sec = parse_float(&latin1_field(&fixed[244..252]))
        .filter(|&d| d > 0.0)
        .unwrap_or(DEFAULT_RECORD_DURATION_SEC);

    let labels = read_field_block(source, LABEL_WIDTH, signal_count, "signal labels")?;
    read_field_block(source, TRANSDUCER_WIDTH, signal_count, "transducer fields")?;
    let dimensions = read_field_block(source, DIMENSION_WIDTH, signal_count, "physical dimensions")?;
    let physical_min = read_field_block(source, NUMBER_WIDTH, signal_count, "physical minimum")?;
    let physical_max = read_field_block(source, NUMBER_WIDTH, signal_count, "physical maximum")?;
    let digital_min = read_field_block(source, NUMBER_WIDTH, signal_count, "digital minimum")?;
    let digital_max = read_field_block(source, NUMBER_WIDTH, signal_count, "digital maximum")?;
    read_field_block(source, PREFILTER_WIDTH, signal_count, "prefilter fields")?;
    let samples_per_record = read_field_block(source, NUMBER_WIDTH, signal_count, "samples per record")?;
    read_field_block(source, RESERVED_WIDTH, signal_count, "signal reserved fields")?;

    let mut signals = Vec::with_capacity(signal_count);
    for i in 0..signal_count {
        let calibration = CalibrationPair {
            physical_min: parse_float(&physical_min[i]).unwrap_or(FALLBACK_PHYSICAL_MIN),
            physical_max: parse_float(&physical_max[i]).unwrap_or(FALLBACK_PHYSICAL_MAX),
            digital_min: parse_float(&digital_min[i]).unwrap_or(FALLBACK_DIGITAL_MIN),
            digital_max: parse_float(&digital_max[i]).unwrap_or(FALLBACK_DIGITAL_MAX),
        };
        if !calibration.is_valid(MIN_CALIBRATION_SPAN) {
            warn!(
                "Signal {} ('{}') has degenerate calibration: physical {}..{}, digital {}..{}",
                i, labels[i], calibration.physical_min, calibration.physical_max, calibration.digital_min, calibration.digital_max
            );
        }

        let samples_per_record = match parse_int(&samples_per_record[i]) {
            Some(n) if n < 0 => {
                return Err(EegError::Format(format!(
                    "signal {} has negative samples per record ({})",
                    i, n
                )))
            }
            Some(n) => n as usize,
            None => 1,
        };

        signals.push(EdfSignalHeader {
            label: labels[i].clone(),
            physical_dimension: dimensions[i].clone(),
            calibration,
            samples_per_record,
        });
    }

    Ok(EdfHeader {
        version: latin1_field(&fixed[0..8]),
        patient: latin1_field(&fixed[8..88]),
        recording: latin1_field(&fixed[88..168]),
        start,
        declared_records: parse_int(&latin1_field(&fixed[236..244])),
        record_duration_sec,
        signals,
    })
}
