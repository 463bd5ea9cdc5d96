//! The in-memory recording and the store that mutates it
//!
//! [`Recording`] is plain data: channels plus patient/recording metadata.
//! [`ChannelStore`] owns one recording, applies index-addressed operations to
//! it, swaps in whole new channel sets (loads, montages) atomically, and
//! tells registered observers what changed.

use std::path::Path;

use chrono::{Local, NaiveDateTime};
use log::{info, warn};

use crate::cancel::CancelToken;
use crate::config::{LoadOptions, SaveOptions, SpectrogramConfig};
use crate::error::{EegError, Result};
use crate::file_io::{self, LoadReport};
use crate::montage::{self, MontageKind, PairingStrategy};
use crate::signal;
use crate::spectral::{Spectrogram, SpectrumAnalyzer};
use crate::types::{Channel, ChannelSummary};

/// A loaded recording: ordered channels plus metadata
#[derive(Debug, Clone, PartialEq)]
pub struct Recording {
    pub channels: Vec<Channel>,
    pub patient_info: String,
    pub recording_info: String,
    pub start: NaiveDateTime,
}

impl Default for Recording {
    fn default() -> Self {
        Self::new()
    }
}

impl Recording {
    /// Empty recording starting now
    pub fn new() -> Self {
        Recording {
            channels: Vec::new(),
            patient_info: String::new(),
            recording_info: String::new(),
            start: Local::now().naive_local(),
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Highest channel rate, 0 for an empty recording
    pub fn max_sampling_rate(&self) -> f64 {
        self.channels.iter().map(|c| c.sampling_rate_hz).fold(0.0, f64::max)
    }

    /// Longest channel duration in seconds, 0 for an empty recording
    pub fn duration(&self) -> f64 {
        self.channels.iter().map(Channel::duration).fold(0.0, f64::max)
    }

    pub fn labels(&self) -> Vec<String> {
        self.channels.iter().map(|c| c.label.clone()).collect()
    }

    /// Removes every channel, empties metadata and resets the start to now
    pub fn clear(&mut self) {
        *self = Recording::new();
    }
}

/// Notifications sent to store observers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreEvent {
    DataChanged,
    ChannelAdded(usize),
    ChannelRemoved(usize),
    ChannelCountChanged(usize),
}

/// Handle returned by [`ChannelStore::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// Outcome of [`ChannelStore::apply_montage`]
#[derive(Debug, Clone, PartialEq)]
pub struct MontageReport {
    pub kind: MontageKind,
    pub channels_before: usize,
    pub channels_after: usize,
    pub pairing: Option<PairingStrategy>,
    pub non_finite_replaced: usize,
}

type Observer = Box<dyn FnMut(&StoreEvent)>;

/// Owns a [`Recording`] and notifies observers about every change
///
/// ```rust
/// use std::cell::RefCell;
/// use std::rc::Rc;
/// use eegkit::{Channel, ChannelStore, StoreEvent};
///
/// let mut store = ChannelStore::new();
/// let seen = Rc::new(RefCell::new(Vec::new()));
/// let sink = seen.clone();
/// store.subscribe(move |e: &StoreEvent| sink.borrow_mut().push(*e));
///
/// store.add_channel(Channel::new("Fp1", 256.0, vec![1.0, 2.0, 3.0]));
/// store.apply_gain(0, 2.0)?;
/// assert_eq!(store.channel(0)?.samples, vec![2.0, 4.0, 6.0]);
/// assert_eq!(*seen.borrow(), vec![StoreEvent::ChannelAdded(0), StoreEvent::DataChanged]);
/// # Ok::<(), eegkit::EegError>(())
/// ```
pub struct ChannelStore {
    recording: Recording,
    observers: Vec<(ObserverId, Observer)>,
    next_observer: u64,
}

impl Default for ChannelStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ChannelStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelStore")
            .field("recording", &self.recording)
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl ChannelStore {
    pub fn new() -> Self {
        Self::with_recording(Recording::new())
    }

    pub fn with_recording(recording: Recording) -> Self {
        ChannelStore {
            recording,
            observers: Vec::new(),
            next_observer: 0,
        }
    }

    pub fn subscribe<F>(&mut self, observer: F) -> ObserverId
    where
        F: FnMut(&StoreEvent) + 'static,
    {
        let id = ObserverId(self.next_observer);
        self.next_observer += 1;
        self.observers.push((id, Box::new(observer)));
        id
    }

    /// Returns `false` when the id was not registered
    pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(oid, _)| *oid != id);
        self.observers.len() != before
    }

    fn notify(&mut self, event: StoreEvent) {
        for (_, observer) in self.observers.iter_mut() {
            observer(&event);
        }
    }

    fn checked_index(&self, index: usize) -> Result<usize> {
        if index < self.recording.channels.len() {
            Ok(index)
        } else {
            Err(EegError::InvalidChannelIndex(index))
        }
    }

    fn channel_mut(&mut self, index: usize) -> Result<&mut Channel> {
        let index = self.checked_index(index)?;
        Ok(&mut self.recording.channels[index])
    }

    pub fn recording(&self) -> &Recording {
        &self.recording
    }

    pub fn channels(&self) -> &[Channel] {
        &self.recording.channels
    }

    pub fn channel(&self, index: usize) -> Result<&Channel> {
        self.recording
            .channels
            .get(index)
            .ok_or(EegError::InvalidChannelIndex(index))
    }

    pub fn channel_count(&self) -> usize {
        self.recording.channel_count()
    }

    pub fn is_empty(&self) -> bool {
        self.recording.is_empty()
    }

    pub fn max_sampling_rate(&self) -> f64 {
        self.recording.max_sampling_rate()
    }

    pub fn duration(&self) -> f64 {
        self.recording.duration()
    }

    /// Snapshot of label, sample count and rate for every channel
    pub fn channel_summaries(&self) -> Vec<ChannelSummary> {
        self.recording.channels.iter().map(Channel::summary).collect()
    }

    pub fn set_patient_info(&mut self, info: impl Into<String>) {
        self.recording.patient_info = info.into();
    }

    pub fn set_recording_info(&mut self, info: impl Into<String>) {
        self.recording.recording_info = info.into();
    }

    pub fn set_start(&mut self, start: NaiveDateTime) {
        self.recording.start = start;
    }

    pub fn clear(&mut self) {
        let had_channels = !self.recording.is_empty();
        self.recording.clear();
        if had_channels {
            self.notify(StoreEvent::ChannelCountChanged(0));
        }
        self.notify(StoreEvent::DataChanged);
    }

    pub fn add_channel(&mut self, channel: Channel) {
        self.recording.channels.push(channel);
        let index = self.recording.channels.len() - 1;
        self.notify(StoreEvent::ChannelAdded(index));
    }

    pub fn remove_channel(&mut self, index: usize) -> Result<Channel> {
        let index = self.checked_index(index)?;
        let removed = self.recording.channels.remove(index);
        self.notify(StoreEvent::ChannelRemoved(index));
        Ok(removed)
    }

    /// Swaps in a whole recording
    pub fn replace_recording(&mut self, recording: Recording) -> Recording {
        let old = std::mem::replace(&mut self.recording, recording);
        if old.channel_count() != self.recording.channel_count() {
            self.notify(StoreEvent::ChannelCountChanged(self.recording.channel_count()));
        }
        self.notify(StoreEvent::DataChanged);
        old
    }

    /// Overwrites the current data with a copy of `other`
    pub fn copy_from(&mut self, other: &Recording) {
        self.replace_recording(other.clone());
    }

    /// Loads a file, replacing the current recording only on success
    pub fn load_from_file<P: AsRef<Path>>(&mut self, path: P) -> Result<LoadReport> {
        self.load_from_file_with(path, &LoadOptions::default(), None)
    }

    pub fn load_from_file_with<P: AsRef<Path>>(
        &mut self,
        path: P,
        options: &LoadOptions,
        cancel: Option<&CancelToken>,
    ) -> Result<LoadReport> {
        let loaded = file_io::load_with(path.as_ref(), options, cancel)?;
        info!(
            "Loaded {} channels ({:.1} s) from {}",
            loaded.recording.channel_count(),
            loaded.recording.duration(),
            path.as_ref().display()
        );
        self.replace_recording(loaded.recording);
        Ok(loaded.report)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        file_io::save(path, &self.recording)
    }

    pub fn save_to_file_with<P: AsRef<Path>>(&self, path: P, options: &SaveOptions) -> Result<()> {
        file_io::save_with(path, &self.recording, options)
    }

    /// Rescales to `[0, 1]`; the physical range follows
    pub fn normalize_channel(&mut self, index: usize) -> Result<()> {
        let channel = self.channel_mut(index)?;
        signal::normalize(&mut channel.samples);
        channel.physical_min = 0.0;
        channel.physical_max = 1.0;
        self.notify(StoreEvent::DataChanged);
        Ok(())
    }

    pub fn apply_gain(&mut self, index: usize, gain: f64) -> Result<()> {
        let channel = self.channel_mut(index)?;
        signal::apply_gain(&mut channel.samples, gain);
        channel.physical_min *= gain;
        channel.physical_max *= gain;
        self.notify(StoreEvent::DataChanged);
        Ok(())
    }

    pub fn apply_offset(&mut self, index: usize, offset: f64) -> Result<()> {
        let channel = self.channel_mut(index)?;
        signal::apply_offset(&mut channel.samples, offset);
        channel.physical_min += offset;
        channel.physical_max += offset;
        self.notify(StoreEvent::DataChanged);
        Ok(())
    }

    /// Subtracts the channel mean; the physical range shifts by the same amount
    pub fn remove_dc(&mut self, index: usize) -> Result<()> {
        let channel = self.channel_mut(index)?;
        let dc = signal::mean(&channel.samples);
        signal::remove_dc(&mut channel.samples);
        channel.physical_min -= dc;
        channel.physical_max -= dc;
        self.notify(StoreEvent::DataChanged);
        Ok(())
    }

    /// Band-pass at the channel's own rate; rejected parameters leave it as is
    pub fn apply_bandpass(&mut self, index: usize, low_cut_hz: f64, high_cut_hz: f64) -> Result<()> {
        let channel = self.channel_mut(index)?;
        let rate = channel.sampling_rate_hz;
        signal::bandpass_filter(&mut channel.samples, rate, low_cut_hz, high_cut_hz)?;
        self.notify(StoreEvent::DataChanged);
        Ok(())
    }

    pub fn apply_notch(&mut self, index: usize, notch_hz: f64) -> Result<()> {
        let channel = self.channel_mut(index)?;
        let rate = channel.sampling_rate_hz;
        signal::notch_filter(&mut channel.samples, rate, notch_hz)?;
        self.notify(StoreEvent::DataChanged);
        Ok(())
    }

    /// Re-references every channel and swaps the result in
    ///
    /// Output channels inherit unit, rate and calibration metadata from their
    /// source channel. On error nothing changes.
    pub fn apply_montage(&mut self, kind: MontageKind) -> Result<MontageReport> {
        let labels = self.recording.labels();
        let snapshot: Vec<Vec<f64>> = self.recording.channels.iter().map(|c| c.samples.clone()).collect();

        let output = montage::apply_montage(kind, snapshot, &labels).map_err(|e| {
            warn!("{:?} montage not applied: {}", kind, e);
            e
        })?;

        let channels_before = self.recording.channel_count();
        let new_channels: Vec<Channel> = output
            .channels
            .into_iter()
            .zip(output.labels)
            .zip(&output.sources)
            .map(|((samples, label), &source)| Channel {
                label,
                samples,
                ..self.recording.channels[source].clone()
            })
            .collect();
        let channels_after = new_channels.len();

        self.recording.channels = new_channels;
        if channels_after != channels_before {
            self.notify(StoreEvent::ChannelCountChanged(channels_after));
        }
        self.notify(StoreEvent::DataChanged);

        Ok(MontageReport {
            kind,
            channels_before,
            channels_after,
            pairing: output.pairing,
            non_finite_replaced: output.non_finite_replaced,
        })
    }

    pub fn channel_means(&self) -> Vec<f64> {
        self.recording.channels.iter().map(|c| signal::mean(&c.samples)).collect()
    }

    pub fn channel_std_devs(&self) -> Vec<f64> {
        self.recording
            .channels
            .iter()
            .map(|c| signal::standard_deviation(&c.samples))
            .collect()
    }

    /// Copy of a channel's samples between `start_sec` and `start_sec + duration_sec`
    pub fn time_series(&self, index: usize, start_sec: f64, duration_sec: f64) -> Result<Vec<f64>> {
        let channel = self.channel(index)?;
        Ok(signal::extract_time_window(
            &channel.samples,
            channel.sampling_rate_hz,
            start_sec,
            duration_sec,
        ))
    }

    /// Spectrogram of one channel at its own sampling rate
    pub fn spectrogram(
        &self,
        index: usize,
        config: &SpectrogramConfig,
        cancel: Option<&CancelToken>,
    ) -> Result<Spectrogram> {
        let channel = self.channel(index)?;
        SpectrumAnalyzer::new().spectrogram_with(&channel.samples, channel.sampling_rate_hz, config, cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn store_with(channels: Vec<Channel>) -> ChannelStore {
        let mut recording = Recording::new();
        recording.channels = channels;
        ChannelStore::with_recording(recording)
    }

    fn recorder(store: &mut ChannelStore) -> Rc<RefCell<Vec<StoreEvent>>> {
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = events.clone();
        store.subscribe(move |e: &StoreEvent| sink.borrow_mut().push(*e));
        events
    }

    #[test]
    fn test_empty_recording_statistics() {
        let store = ChannelStore::new();
        assert!(store.is_empty());
        assert_eq!(store.duration(), 0.0);
        assert_eq!(store.max_sampling_rate(), 0.0);
        assert!(store.channel_means().is_empty());
    }

    #[test]
    fn test_duration_and_rate_use_maxima() {
        let store = store_with(vec![
            Channel::new("A", 100.0, vec![0.0; 300]),
            Channel::new("B", 250.0, vec![0.0; 250]),
        ]);
        assert_eq!(store.max_sampling_rate(), 250.0);
        assert_eq!(store.duration(), 3.0);
    }

    #[test]
    fn test_invalid_index_is_consistent() {
        let mut store = store_with(vec![Channel::new("A", 100.0, vec![1.0; 10])]);
        assert!(matches!(store.apply_gain(3, 2.0), Err(EegError::InvalidChannelIndex(3))));
        assert!(matches!(store.apply_offset(1, 2.0), Err(EegError::InvalidChannelIndex(1))));
        assert!(matches!(store.normalize_channel(5), Err(EegError::InvalidChannelIndex(5))));
        assert!(matches!(store.remove_dc(2), Err(EegError::InvalidChannelIndex(2))));
        assert!(matches!(store.apply_bandpass(9, 1.0, 30.0), Err(EegError::InvalidChannelIndex(9))));
        assert!(matches!(store.apply_notch(9, 50.0), Err(EegError::InvalidChannelIndex(9))));
        assert!(matches!(store.time_series(1, 0.0, 1.0), Err(EegError::InvalidChannelIndex(1))));
        assert!(matches!(store.remove_channel(1), Err(EegError::InvalidChannelIndex(1))));
        assert!(store.channel(1).is_err());
    }

    #[test]
    fn test_physical_range_tracks_operations() {
        let mut store = store_with(vec![Channel::new("A", 100.0, vec![1.0, 3.0])]);
        store.apply_gain(0, 2.0).unwrap();
        assert_eq!(store.channel(0).unwrap().physical_max, 2000.0);
        store.apply_offset(0, 10.0).unwrap();
        assert_eq!(store.channel(0).unwrap().physical_min, -1990.0);

        // 样本现在是 [12, 16]，均值 14
        store.remove_dc(0).unwrap();
        let ch = store.channel(0).unwrap();
        assert_eq!(ch.samples, vec![-2.0, 2.0]);
        assert_eq!(ch.physical_min, -2004.0);

        store.normalize_channel(0).unwrap();
        let ch = store.channel(0).unwrap();
        assert_eq!(ch.samples, vec![0.0, 1.0]);
        assert_eq!((ch.physical_min, ch.physical_max), (0.0, 1.0));
    }

    #[test]
    fn test_bad_bandpass_leaves_channel_and_skips_notification() {
        let mut store = store_with(vec![Channel::new("A", 100.0, vec![1.0, 2.0, 3.0, 4.0])]);
        let events = recorder(&mut store);
        let err = store.apply_bandpass(0, 1.0, 80.0).unwrap_err();
        assert!(err.is_recoverable());
        assert_eq!(store.channel(0).unwrap().samples, vec![1.0, 2.0, 3.0, 4.0]);
        assert!(events.borrow().is_empty());
    }

    #[test]
    fn test_bipolar_montage_replaces_channel_set() {
        let mut store = store_with(vec![
            Channel::new("C3", 200.0, vec![3.0, 4.0]),
            Channel::new("C4", 200.0, vec![1.0, 1.0]),
            Channel::new("Cz", 200.0, vec![9.0, 9.0]),
        ]);
        let events = recorder(&mut store);
        let report = store.apply_montage(MontageKind::Bipolar).unwrap();

        assert_eq!(report.channels_before, 3);
        assert_eq!(report.channels_after, 1);
        assert_eq!(store.channel_count(), 1);
        let ch = store.channel(0).unwrap();
        assert_eq!(ch.label, "C3-C4");
        assert_eq!(ch.samples, vec![2.0, 3.0]);
        assert_eq!(ch.sampling_rate_hz, 200.0);
        assert_eq!(
            *events.borrow(),
            vec![StoreEvent::ChannelCountChanged(1), StoreEvent::DataChanged]
        );
    }

    #[test]
    fn test_failed_montage_leaves_store_untouched() {
        let mut store = store_with(vec![
            Channel::new("A", 100.0, vec![1.0]),
            Channel::new("B", 100.0, vec![2.0]),
        ]);
        let before = store.recording().clone();
        assert!(store.apply_montage(MontageKind::Laplacian).is_err());
        assert_eq!(store.recording(), &before);
    }

    #[test]
    fn test_clear_resets_metadata() {
        let mut store = store_with(vec![Channel::new("A", 100.0, vec![1.0])]);
        store.set_patient_info("P001");
        store.set_recording_info("Night 1");
        let events = recorder(&mut store);
        store.clear();
        assert!(store.is_empty());
        assert!(store.recording().patient_info.is_empty());
        assert!(store.recording().recording_info.is_empty());
        assert_eq!(
            *events.borrow(),
            vec![StoreEvent::ChannelCountChanged(0), StoreEvent::DataChanged]
        );
    }

    #[test]
    fn test_unsubscribe() {
        let mut store = ChannelStore::new();
        let count = Rc::new(RefCell::new(0));
        let sink = count.clone();
        let id = store.subscribe(move |_: &StoreEvent| *sink.borrow_mut() += 1);
        store.add_channel(Channel::new("A", 100.0, vec![]));
        assert!(store.unsubscribe(id));
        assert!(!store.unsubscribe(id));
        store.add_channel(Channel::new("B", 100.0, vec![]));
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn test_remove_channel_and_summaries() {
        let mut store = store_with(vec![
            Channel::new("A", 100.0, vec![0.0; 5]),
            Channel::new("B", 200.0, vec![0.0; 7]),
        ]);
        let removed = store.remove_channel(0).unwrap();
        assert_eq!(removed.label, "A");
        let summaries = store.channel_summaries();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].label, "B");
        assert_eq!(summaries[0].sample_count, 7);
        assert_eq!(summaries[0].sampling_rate_hz, 200.0);
    }

    #[test]
    fn test_channel_spectrogram() {
        let samples: Vec<f64> = (0..1024)
            .map(|i| (2.0 * std::f64::consts::PI * 16.0 * i as f64 / 128.0).sin())
            .collect();
        let store = store_with(vec![Channel::new("Oz", 128.0, samples)]);
        let config = SpectrogramConfig {
            window_size: 128,
            hop_size: 64,
        };

        let grid = store.spectrogram(0, &config, None).unwrap();
        assert_eq!(grid.window_count(), (1024 - 128) / 64 + 1);
        assert_eq!(grid.frequencies_hz[16], 16.0);
        assert!(matches!(
            store.spectrogram(1, &config, None),
            Err(EegError::InvalidChannelIndex(1))
        ));
    }

    #[test]
    fn test_copy_from() {
        let mut source = Recording::new();
        source.patient_info = "X".into();
        source.channels.push(Channel::new("A", 10.0, vec![1.0]));
        let mut store = ChannelStore::new();
        store.copy_from(&source);
        assert_eq!(store.recording(), &source);
    }
}
