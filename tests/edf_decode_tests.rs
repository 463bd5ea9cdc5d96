use eegkit::doctest_utils::{EdfFileBuilder, EdfSignalSpec};
use eegkit::{CalibrationStrategy, CancelToken, EdfReader, EegError, LoadOptions};
use chrono::{Datelike, NaiveDate, Timelike};
use std::io::Cursor;

// 从内存字节解码的辅助函数
fn decode_bytes(bytes: Vec<u8>, options: &LoadOptions) -> eegkit::Result<eegkit::EdfDecoded> {
    let mut reader = EdfReader::from_reader(Cursor::new(bytes))?;
    reader.decode(options, None)
}

fn decode(builder: EdfFileBuilder) -> eegkit::EdfDecoded {
    decode_bytes(builder.build(), &LoadOptions::default()).unwrap()
}

#[test]
fn test_standard_calibration_scenario() {
    let raw = vec![0i16, 16384, -16384];
    let builder = EdfFileBuilder::new()
        .signal(EdfSignalSpec::new("Fp1", 3).calibration(-100.0, 100.0, -32768.0, 32767.0).samples(raw.clone()))
        .signal(EdfSignalSpec::new("Fp2", 3).calibration(-100.0, 100.0, -32768.0, 32767.0).samples(raw));

    let decoded = decode(builder);
    assert_eq!(decoded.recording.channel_count(), 2);
    for channel in &decoded.recording.channels {
        let expected = [0.0, 50.0, -50.0];
        for (value, want) in channel.samples.iter().zip(expected.iter()) {
            assert!((value - want).abs() < 0.01, "{} vs {}", value, want);
        }
        assert_eq!(channel.unit, "uV");
        assert_eq!(channel.physical_min, -100.0);
        assert_eq!(channel.digital_max, 32767.0);
    }
    assert!(decoded.report.fallback_calibrations().next().is_none());
    let scale = decoded.report.calibrations[0].calibration.scale;
    assert!((scale - 0.003052).abs() < 1e-6);
}

#[test]
fn test_degenerate_calibration_small_range_keeps_raw_values() {
    let raw: Vec<i16> = (0..12).map(|i| (i % 5) * 10).collect();
    let decoded = decode(
        EdfFileBuilder::new().signal(
            EdfSignalSpec::new("Cz", 12)
                .calibration(10.0, 10.0, -32768.0, 32767.0)
                .samples(raw.clone()),
        ),
    );

    let channel = &decoded.recording.channels[0];
    let expected: Vec<f64> = raw.iter().map(|&v| v as f64).collect();
    assert_eq!(channel.samples, expected);
    assert_eq!(
        decoded.report.calibrations[0].calibration.strategy,
        CalibrationStrategy::RawMicrovolts
    );
    // 回退校准时单位使用默认值
    assert_eq!(channel.unit, "uV");
}

#[test]
fn test_degenerate_digital_range_full_scale() {
    let raw: Vec<i16> = (0..20).map(|i| if i % 2 == 0 { -16000 } else { 16000 }).collect();
    let decoded = decode(
        EdfFileBuilder::new().signal(
            EdfSignalSpec::new("O1", 20)
                .dimension("mV")
                .calibration(-100.0, 100.0, 5.0, 5.0)
                .samples(raw),
        ),
    );

    let cal = decoded.report.calibrations[0].calibration;
    assert_eq!(cal.strategy, CalibrationStrategy::FullScale);
    let channel = &decoded.recording.channels[0];
    assert!((channel.samples[1] - 16000.0 * 200.0 / 65536.0).abs() < 1e-9);
    assert_eq!(channel.unit, "uV");
}

#[test]
fn test_degenerate_calibration_rescaled_and_centred() {
    let raw: Vec<i16> = (0..20).map(|i| 500 + (i % 2) * 2000).collect();
    let decoded = decode(
        EdfFileBuilder::new().signal(
            EdfSignalSpec::new("O2", 20)
                .calibration_fields("x", "y", "0", "0")
                .samples(raw),
        ),
    );

    assert_eq!(
        decoded.report.calibrations[0].calibration.strategy,
        CalibrationStrategy::Rescaled
    );
    let samples = &decoded.recording.channels[0].samples;
    let max = samples.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let min = samples.iter().cloned().fold(f64::INFINITY, f64::min);
    assert!((max - 50.0).abs() < 1e-9);
    assert!((min + 50.0).abs() < 1e-9);
}

#[test]
fn test_degenerate_calibration_too_few_samples_is_identity() {
    let decoded = decode(
        EdfFileBuilder::new().signal(
            EdfSignalSpec::new("T3", 5)
                .calibration(0.0, 0.0, 0.0, 0.0)
                .samples(vec![1000, -1000, 3, 4, 5]),
        ),
    );
    assert_eq!(decoded.recording.channels[0].samples, vec![1000.0, -1000.0, 3.0, 4.0, 5.0]);
    assert_eq!(
        decoded.report.calibrations[0].calibration.strategy,
        CalibrationStrategy::Identity
    );
}

#[test]
fn test_record_cap() {
    let records = 10_001;
    let builder = EdfFileBuilder::new()
        .signal(EdfSignalSpec::new("Fz", 1).identity_calibration().samples(vec![7; records]));

    let decoded = decode(builder);
    let report = &decoded.report;
    assert_eq!(report.records_available, 10_001);
    assert_eq!(report.records_loaded, 10_000);
    assert!(report.record_cap_applied);
    assert_eq!(decoded.recording.channels[0].sample_count(), 10_000);
}

#[test]
fn test_record_cap_from_options() {
    let builder = EdfFileBuilder::new()
        .signal(EdfSignalSpec::new("A", 4).samples(vec![0; 40]))
        .signal(EdfSignalSpec::new("B", 2).samples(vec![0; 20]));
    let options = LoadOptions {
        max_records: 3,
        ..LoadOptions::default()
    };

    let decoded = decode_bytes(builder.build(), &options).unwrap();
    assert_eq!(decoded.recording.channels[0].sample_count(), 12);
    assert_eq!(decoded.recording.channels[1].sample_count(), 6);
    assert!(decoded.report.record_cap_applied);
}

#[test]
fn test_annotation_channels_skipped() {
    let builder = EdfFileBuilder::new()
        .signal(EdfSignalSpec::new("C3", 2).samples(vec![1, 2]))
        .signal(EdfSignalSpec::new("EDF Annotations", 3))
        .signal(EdfSignalSpec::new("C4", 2).samples(vec![3, 4]));

    let decoded = decode(builder);
    let labels: Vec<&str> = decoded.recording.channels.iter().map(|c| c.label.as_str()).collect();
    assert_eq!(labels, vec!["C3", "C4"]);
    assert_eq!(decoded.report.skipped_annotation_channels, vec!["EDF Annotations".to_string()]);
}

#[test]
fn test_channel_cap() {
    let mut builder = EdfFileBuilder::new().signal(EdfSignalSpec::new("EDF annotations", 1));
    for i in 0..34 {
        builder = builder.signal(EdfSignalSpec::new(&format!("E{}", i), 1).samples(vec![i as i16]));
    }

    let decoded = decode(builder);
    assert_eq!(decoded.recording.channel_count(), 32);
    assert_eq!(decoded.recording.channels[31].label, "E31");
    assert_eq!(decoded.report.dropped_channels, 2);
    assert!(decoded.report.channel_cap_applied());
}

#[test]
fn test_sampling_rate_from_record_duration() {
    let decoded = decode(
        EdfFileBuilder::new()
            .record_duration("0.5")
            .signal(EdfSignalSpec::new("A", 64).samples(vec![0; 128])),
    );
    let channel = &decoded.recording.channels[0];
    assert_eq!(channel.sampling_rate_hz, 128.0);
    assert_eq!(channel.duration(), 1.0);
}

#[test]
fn test_metadata_and_start_time() {
    let decoded = decode(
        EdfFileBuilder::new()
            .patient("  MCH-0234567 F 02-MAY-1951 Haagse_Harry  ")
            .recording("Startdate 02-MAR-2002 EMG561")
            .start("02.03.02", "14.30.15")
            .signal(EdfSignalSpec::new("A", 1).samples(vec![0])),
    );
    let recording = &decoded.recording;
    assert_eq!(recording.patient_info, "MCH-0234567 F 02-MAY-1951 Haagse_Harry");
    assert_eq!(recording.recording_info, "Startdate 02-MAR-2002 EMG561");
    assert_eq!(recording.start.date(), NaiveDate::from_ymd_opt(2002, 3, 2).unwrap());
    assert_eq!(recording.start.hour(), 14);
    assert_eq!(recording.start.second(), 15);
}

#[test]
fn test_unparsable_start_keeps_default() {
    let decoded = decode(
        EdfFileBuilder::new()
            .start("yesterday", "noon")
            .signal(EdfSignalSpec::new("A", 1).samples(vec![0])),
    );
    // 默认时间戳是创建时刻
    assert!(decoded.recording.start.year() >= 2024);
}

#[test]
fn test_declared_record_count_is_not_trusted() {
    let decoded = decode(
        EdfFileBuilder::new()
            .records_field("99")
            .signal(EdfSignalSpec::new("A", 2).samples(vec![1, 2, 3, 4])),
    );
    assert_eq!(decoded.report.declared_records, Some(99));
    assert_eq!(decoded.report.records_loaded, 2);
}

#[test]
fn test_trailing_partial_record_ignored() {
    let mut bytes = EdfFileBuilder::new()
        .signal(EdfSignalSpec::new("A", 2).samples(vec![1, 2, 3, 4]))
        .build();
    bytes.extend_from_slice(&[9, 9, 9]);

    let decoded = decode_bytes(bytes, &LoadOptions::default()).unwrap();
    assert_eq!(decoded.recording.channels[0].sample_count(), 4);
}

#[test]
fn test_oversized_records_rejected_before_reading() {
    // 4096 个信号 × 99999999 样本，头部声明的记录远大于文件本身
    let mut builder = EdfFileBuilder::new();
    for i in 0..4096 {
        builder = builder.signal(EdfSignalSpec::new(&format!("S{}", i), 0).samples_per_record_field("99999999"));
    }
    let bytes = builder.build();
    assert_eq!(bytes.len(), 256 * 4097);

    let mut reader = EdfReader::from_reader(Cursor::new(bytes)).unwrap();
    assert_eq!(reader.header().bytes_per_record(), Some(2 * 4096 * 99_999_999));
    assert_eq!(reader.records_available(), 0);
    assert!(matches!(
        reader.decode(&LoadOptions::default(), None),
        Err(EegError::Format(_))
    ));
}

#[test]
fn test_header_without_data_records() {
    let bytes = EdfFileBuilder::new()
        .records_field("5")
        .signal(EdfSignalSpec::new("A", 256))
        .build();
    let result = decode_bytes(bytes, &LoadOptions::default());
    assert!(matches!(result, Err(EegError::Format(_))));
}

#[test]
fn test_truncated_fixed_header() {
    let bytes = EdfFileBuilder::new()
        .signal(EdfSignalSpec::new("A", 1).samples(vec![0]))
        .build();
    let result = decode_bytes(bytes[..200].to_vec(), &LoadOptions::default());
    assert!(matches!(result, Err(EegError::Format(_))));
}

#[test]
fn test_truncated_signal_header() {
    let bytes = EdfFileBuilder::new()
        .signal(EdfSignalSpec::new("A", 1).samples(vec![0]))
        .signal(EdfSignalSpec::new("B", 1).samples(vec![0]))
        .build();
    let result = decode_bytes(bytes[..700].to_vec(), &LoadOptions::default());
    assert!(matches!(result, Err(EegError::Format(_))));
}

#[test]
fn test_invalid_signal_counts() {
    for field in ["0", "-3", "abc", "", "5000"] {
        let bytes = EdfFileBuilder::new()
            .signal_count_field(field)
            .signal(EdfSignalSpec::new("A", 1).samples(vec![0]))
            .build();
        let result = EdfReader::from_reader(Cursor::new(bytes));
        assert!(
            matches!(result, Err(EegError::InvalidSignalCount(_))),
            "signal count field {:?}",
            field
        );
    }
}

#[test]
fn test_cancelled_decode_returns_nothing() {
    let bytes = EdfFileBuilder::new()
        .signal(EdfSignalSpec::new("A", 10).samples(vec![1; 100]))
        .build();
    let token = CancelToken::new();
    token.cancel();

    let mut reader = EdfReader::from_reader(Cursor::new(bytes)).unwrap();
    let result = reader.decode(&LoadOptions::default(), Some(&token));
    assert!(matches!(result, Err(EegError::Cancelled)));

    // 重置后同一个 reader 可以再次解码
    token.reset();
    let decoded = reader.decode(&LoadOptions::default(), Some(&token)).unwrap();
    assert_eq!(decoded.recording.channels[0].sample_count(), 100);
}

#[test]
fn test_decode_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("simple.edf");
    eegkit::doctest_utils::create_simple_test_file(&path).unwrap();

    let mut reader = EdfReader::open(&path).unwrap();
    assert_eq!(reader.header().signals[0].label, "EEG Fp1");
    let decoded = reader.decode(&LoadOptions::default(), None).unwrap();
    let samples = &decoded.recording.channels[0].samples;
    let peak = samples.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    // 量化误差小于一个 LSB（约 0.006 uV）
    assert!((peak - 50.0).abs() < 0.05, "peak {}", peak);
}
