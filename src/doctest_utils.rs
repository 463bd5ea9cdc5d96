// Internal utilities for documentation tests and integration tests
// Builds standard EDF files byte by byte so that corrupt headers can be produced on purpose

use crate::utils::write_padded;
use crate::{Result, EDF_HEADER_BYTES};
use std::path::Path;

/// One signal of a synthetic EDF file
///
/// Numeric header fields are stored as text so tests can put garbage in them.
#[derive(Debug, Clone)]
pub struct EdfSignalSpec {
    pub label: String,
    pub dimension: String,
    pub physical_min: String,
    pub physical_max: String,
    pub digital_min: String,
    pub digital_max: String,
    pub samples_per_record: usize,
    pub samples_per_record_field: String,
    pub samples: Vec<i16>,
}

impl EdfSignalSpec {
    /// ±200 uV over the full 16-bit range
    pub fn new(label: &str, samples_per_record: usize) -> Self {
        EdfSignalSpec {
            label: label.to_string(),
            dimension: "uV".to_string(),
            physical_min: "-200".to_string(),
            physical_max: "200".to_string(),
            digital_min: "-32768".to_string(),
            digital_max: "32767".to_string(),
            samples_per_record,
            samples_per_record_field: samples_per_record.to_string(),
            samples: Vec::new(),
        }
    }

    pub fn dimension(mut self, dimension: &str) -> Self {
        self.dimension = dimension.to_string();
        self
    }

    pub fn calibration(self, physical_min: f64, physical_max: f64, digital_min: f64, digital_max: f64) -> Self {
        self.calibration_fields(
            &physical_min.to_string(),
            &physical_max.to_string(),
            &digital_min.to_string(),
            &digital_max.to_string(),
        )
    }

    /// Physical range equal to the digital range, so raw values come back unchanged
    pub fn identity_calibration(self) -> Self {
        self.calibration(-32768.0, 32767.0, -32768.0, 32767.0)
    }

    pub fn calibration_fields(mut self, physical_min: &str, physical_max: &str, digital_min: &str, digital_max: &str) -> Self {
        self.physical_min = physical_min.to_string();
        self.physical_max = physical_max.to_string();
        self.digital_min = digital_min.to_string();
        self.digital_max = digital_max.to_string();
        self
    }

    /// Overrides only the text written to the header, not the record layout
    pub fn samples_per_record_field(mut self, field: &str) -> Self {
        self.samples_per_record_field = field.to_string();
        self
    }

    pub fn samples(mut self, samples: Vec<i16>) -> Self {
        self.samples = samples;
        self
    }

    /// Converts physical values to digital ones using this signal's calibration
    pub fn physical_samples(self, values: &[f64]) -> Self {
        let pmin: f64 = self.physical_min.parse().unwrap_or(-200.0);
        let pmax: f64 = self.physical_max.parse().unwrap_or(200.0);
        let dmin: f64 = self.digital_min.parse().unwrap_or(-32768.0);
        let dmax: f64 = self.digital_max.parse().unwrap_or(32767.0);
        let scale = (pmax - pmin) / (dmax - dmin);
        let offset = pmin - dmin * scale;
        let digital = values
            .iter()
            .map(|v| ((v - offset) / scale).round().clamp(dmin, dmax) as i16)
            .collect();
        self.samples(digital)
    }

    fn record_count(&self) -> usize {
        if self.samples_per_record == 0 {
            return 0;
        }
        (self.samples.len() + self.samples_per_record - 1) / self.samples_per_record
    }
}

/// Writes a standard EDF file: fixed header, field-major signal headers,
/// record-interleaved little-endian samples
#[derive(Debug, Clone)]
pub struct EdfFileBuilder {
    patient: String,
    recording: String,
    start_date: String,
    start_time: String,
    record_duration: String,
    records_field: Option<String>,
    signal_count_field: Option<String>,
    reserved: String,
    signals: Vec<EdfSignalSpec>,
}

impl Default for EdfFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EdfFileBuilder {
    pub fn new() -> Self {
        EdfFileBuilder {
            patient: "X X X X".to_string(),
            recording: "Startdate X X X X".to_string(),
            start_date: "01.01.24".to_string(),
            start_time: "00.00.00".to_string(),
            record_duration: "1".to_string(),
            records_field: None,
            signal_count_field: None,
            reserved: String::new(),
            signals: Vec::new(),
        }
    }

    pub fn patient(mut self, patient: &str) -> Self {
        self.patient = patient.to_string();
        self
    }

    pub fn recording(mut self, recording: &str) -> Self {
        self.recording = recording.to_string();
        self
    }

    pub fn start(mut self, date: &str, time: &str) -> Self {
        self.start_date = date.to_string();
        self.start_time = time.to_string();
        self
    }

    pub fn record_duration(mut self, field: &str) -> Self {
        self.record_duration = field.to_string();
        self
    }

    /// Overrides the declared record count (defaults to the real count)
    pub fn records_field(mut self, field: &str) -> Self {
        self.records_field = Some(field.to_string());
        self
    }

    /// Overrides the signal count text (defaults to the number of signals)
    pub fn signal_count_field(mut self, field: &str) -> Self {
        self.signal_count_field = Some(field.to_string());
        self
    }

    pub fn reserved(mut self, reserved: &str) -> Self {
        self.reserved = reserved.to_string();
        self
    }

    pub fn signal(mut self, signal: EdfSignalSpec) -> Self {
        self.signals.push(signal);
        self
    }

    /// Records needed to hold the longest signal; shorter ones are zero-padded
    pub fn record_count(&self) -> usize {
        self.signals.iter().map(EdfSignalSpec::record_count).max().unwrap_or(0)
    }

    pub fn build(&self) -> Vec<u8> {
        let n = self.signals.len();
        let records = self.record_count();

        let mut header = vec![b' '; EDF_HEADER_BYTES];
        write_padded(&mut header[0..8], "0");
        write_padded(&mut header[8..88], &self.patient);
        write_padded(&mut header[88..168], &self.recording);
        write_padded(&mut header[168..176], &self.start_date);
        write_padded(&mut header[176..184], &self.start_time);
        write_padded(&mut header[184..192], &(EDF_HEADER_BYTES * (n + 1)).to_string());
        write_padded(&mut header[192..236], &self.reserved);
        let records_field = self.records_field.clone().unwrap_or_else(|| records.to_string());
        write_padded(&mut header[236..244], &records_field);
        write_padded(&mut header[244..252], &self.record_duration);
        let count_field = self.signal_count_field.clone().unwrap_or_else(|| n.to_string());
        write_padded(&mut header[252..256], &count_field);

        // 字段按顺序排列，每个字段连续存放 N 个信号
        let fields: [(usize, fn(&EdfSignalSpec) -> String); 10] = [
            (16, |s| s.label.clone()),
            (80, |_| String::new()),
            (8, |s| s.dimension.clone()),
            (8, |s| s.physical_min.clone()),
            (8, |s| s.physical_max.clone()),
            (8, |s| s.digital_min.clone()),
            (8, |s| s.digital_max.clone()),
            (80, |_| String::new()),
            (8, |s| s.samples_per_record_field.clone()),
            (32, |_| String::new()),
        ];
        for (width, value) in fields.iter() {
            for signal in &self.signals {
                let mut field = vec![b' '; *width];
                write_padded(&mut field, &value(signal));
                header.extend_from_slice(&field);
            }
        }

        for record in 0..records {
            for signal in &self.signals {
                let spr = signal.samples_per_record;
                for i in record * spr..(record + 1) * spr {
                    let value = signal.samples.get(i).copied().unwrap_or(0);
                    header.extend_from_slice(&value.to_le_bytes());
                }
            }
        }

        header
    }

    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, self.build())?;
        Ok(())
    }
}

/// Creates a one-channel EDF file: one second of a 10 Hz, 50 uV sine at 256 Hz
pub fn create_simple_test_file<P: AsRef<Path>>(path: P) -> Result<()> {
    let samples: Vec<f64> = (0..256)
        .map(|i| 50.0 * (2.0 * std::f64::consts::PI * 10.0 * i as f64 / 256.0).sin())
        .collect();

    EdfFileBuilder::new()
        .patient("DOC001 M 01-JAN-1990 Test_Patient")
        .signal(EdfSignalSpec::new("EEG Fp1", 256).physical_samples(&samples))
        .write_to(path)
}

/// Creates a four-channel 10-20 EDF file (two seconds at 128 Hz) plus an annotation track
pub fn create_multi_channel_test_file<P: AsRef<Path>>(path: P) -> Result<()> {
    let rate = 128;
    let mut builder = EdfFileBuilder::new().patient("DOC002 F 15-MAR-1985 Multi_Channel");
    for (k, label) in ["C3", "C4", "O1", "O2"].iter().enumerate() {
        let freq = 6.0 + 2.0 * k as f64;
        let samples: Vec<f64> = (0..2 * rate)
            .map(|i| 40.0 * (2.0 * std::f64::consts::PI * freq * i as f64 / rate as f64).sin())
            .collect();
        builder = builder.signal(EdfSignalSpec::new(label, rate).physical_samples(&samples));
    }
    builder
        .signal(EdfSignalSpec::new("EDF Annotations", 30).identity_calibration())
        .write_to(path)
}
