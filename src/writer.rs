use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use log::info;

use crate::error::{EegError, Result};
use crate::recording::Recording;
use crate::utils::write_padded;
use crate::EDF_HEADER_BYTES;

/// Writes the 256-byte fixed EDF header for a recording
///
/// Only version, patient, recording, start date, start time and signal
/// count are filled in; every other byte is a space. Per-signal headers and
/// sample data are **not** written, so a file produced this way is not a
/// lossless copy of the recording and will not load back its channels.
/// Use the CSV format when the samples must survive.
///
/// # Errors
///
/// * `EegError::EmptyRecording` - the recording has no channels
/// * `EegError::Io` - the underlying writer failed
///
/// # Examples
///
/// ```rust
/// use eegkit::{Channel, Recording};
/// use eegkit::writer::write_edf_header;
///
/// let mut recording = Recording::new();
/// recording.patient_info = "P001".to_string();
/// recording.channels.push(Channel::new("Cz", 256.0, vec![0.0; 256]));
///
/// let mut bytes = Vec::new();
/// write_edf_header(&mut bytes, &recording)?;
/// assert_eq!(bytes.len(), 256);
/// assert_eq!(&bytes[0..8], b"0       ");
/// assert_eq!(&bytes[252..256], b"1   ");
/// # Ok::<(), eegkit::EegError>(())
/// ```
pub fn write_edf_header<W: Write>(writer: &mut W, recording: &Recording) -> Result<()> {
    if recording.is_empty() {
        return Err(EegError::EmptyRecording);
    }

    let mut header = vec![b' '; EDF_HEADER_BYTES];
    write_padded(&mut header[0..8], "0");
    write_padded(&mut header[8..88], &recording.patient_info);
    write_padded(&mut header[88..168], &recording.recording_info);
    write_padded(&mut header[168..176], &recording.start.format("%d.%m.%y").to_string());
    write_padded(&mut header[176..184], &recording.start.format("%H.%M.%S").to_string());
    write_padded(&mut header[252..256], &recording.channel_count().to_string());

    writer.write_all(&header)?;
    Ok(())
}

/// Creates `path` and writes the minimal EDF header into it
pub fn save_edf<P: AsRef<Path>>(path: P, recording: &Recording) -> Result<()> {
    if recording.is_empty() {
        return Err(EegError::EmptyRecording);
    }

    let mut writer = BufWriter::new(File::create(&path)?);
    write_edf_header(&mut writer, recording)?;
    writer.flush()?;

    info!(
        "Wrote minimal EDF header for {} channels to {}",
        recording.channel_count(),
        path.as_ref().display()
    );
    Ok(())
}
