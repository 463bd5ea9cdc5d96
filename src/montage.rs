//! Montage re-referencing over a full channel set
//!
//! A montage takes an owned snapshot of every channel and returns a new
//! snapshot, possibly with a different channel count (bipolar). Callers
//! replace their channel set with the output rather than merging it.
//!
//! All montages work over the shortest shared length. Non-finite values are
//! never propagated: they are replaced with 0.0 and counted in
//! [`MontageOutput::non_finite_replaced`].

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{EegError, Result};
use crate::utils::strip_trailing_digits;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MontageKind {
    Bipolar,
    AverageReference,
    Laplacian,
}

impl MontageKind {
    /// Smallest channel count the montage can work with
    pub fn min_channels(&self) -> usize {
        match self {
            MontageKind::Bipolar => 2,
            MontageKind::AverageReference => 1,
            MontageKind::Laplacian => 3,
        }
    }
}

/// How bipolar pairs were chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingStrategy {
    /// Odd/even electrode numbers sharing a base name ("F3"/"F4")
    LabelParity,
    /// Labels gave nothing usable; neighbours in channel order were paired
    Consecutive,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MontageOutput {
    pub channels: Vec<Vec<f64>>,
    pub labels: Vec<String>,
    /// Input index each output channel inherits its metadata from
    pub sources: Vec<usize>,
    /// Set for bipolar montages only
    pub pairing: Option<PairingStrategy>,
    pub non_finite_replaced: usize,
}

/// Applies `kind` to a snapshot of channel data
///
/// Fails with [`EegError::InsufficientData`] when there are fewer channels
/// than [`MontageKind::min_channels`] or `labels` does not match the channel
/// count; the caller's own data stays as it was.
///
/// ```rust
/// use eegkit::montage::{apply_montage, MontageKind};
///
/// let labels = vec!["C3".to_string(), "C4".to_string()];
/// let out = apply_montage(MontageKind::Bipolar, vec![vec![5.0, 1.0], vec![2.0, 3.0]], &labels)?;
/// assert_eq!(out.labels, vec!["C3-C4".to_string()]);
/// assert_eq!(out.channels, vec![vec![3.0, -2.0]]);
/// # Ok::<(), eegkit::EegError>(())
/// ```
pub fn apply_montage(kind: MontageKind, channels: Vec<Vec<f64>>, labels: &[String]) -> Result<MontageOutput> {
    if labels.len() != channels.len() {
        return Err(EegError::InsufficientData(format!(
            "{} labels supplied for {} channels",
            labels.len(),
            channels.len()
        )));
    }
    if channels.len() < kind.min_channels() {
        warn!(
            "{:?} montage needs at least {} channels, got {}",
            kind,
            kind.min_channels(),
            channels.len()
        );
        return Err(EegError::InsufficientData(format!(
            "{:?} montage needs at least {} channels, got {}",
            kind,
            kind.min_channels(),
            channels.len()
        )));
    }

    let len = shared_length(&channels);
    let output = match kind {
        MontageKind::AverageReference => average_reference(channels, labels, len),
        MontageKind::Bipolar => bipolar(&channels, labels, len),
        MontageKind::Laplacian => laplacian(&channels, labels, len),
    };

    if output.non_finite_replaced > 0 {
        warn!(
            "{:?} montage replaced {} non-finite values with 0",
            kind, output.non_finite_replaced
        );
    }
    Ok(output)
}

/// Picks bipolar pairs from channel labels
///
/// Labels are grouped by the base name left after stripping trailing digits,
/// groups in order of first appearance. Inside a group, channels ending in an
/// odd digit are paired with channels ending in an even digit (0 counts as
/// even), position by position. Labels without a trailing digit never pair.
/// If nothing pairs up, consecutive channels `(0,1), (1,2), …` are used.
///
/// ```rust
/// use eegkit::montage::{bipolar_pairs, PairingStrategy};
///
/// let labels: Vec<String> = ["F3", "F4", "C3", "C4", "Cz"].iter().map(|s| s.to_string()).collect();
/// let (pairs, strategy) = bipolar_pairs(&labels);
/// assert_eq!(pairs, vec![(0, 1), (2, 3)]);
/// assert_eq!(strategy, PairingStrategy::LabelParity);
/// ```
pub fn bipolar_pairs(labels: &[String]) -> (Vec<(usize, usize)>, PairingStrategy) {
    // (基础名, 奇数后缀, 偶数后缀)
    let mut groups: Vec<(&str, Vec<usize>, Vec<usize>)> = Vec::new();

    for (idx, raw) in labels.iter().enumerate() {
        let label = raw.trim();
        let Some(last) = label.chars().last().and_then(|c| c.to_digit(10)) else {
            continue;
        };
        let base = strip_trailing_digits(label);

        let pos = match groups.iter().position(|(b, _, _)| *b == base) {
            Some(p) => p,
            None => {
                groups.push((base, Vec::new(), Vec::new()));
                groups.len() - 1
            }
        };
        if last % 2 == 1 {
            groups[pos].1.push(idx);
        } else {
            groups[pos].2.push(idx);
        }
    }

    let pairs: Vec<(usize, usize)> = groups
        .iter()
        .flat_map(|(_, odd, even)| odd.iter().copied().zip(even.iter().copied()))
        .collect();

    if pairs.is_empty() {
        let fallback = (1..labels.len()).map(|i| (i - 1, i)).collect();
        (fallback, PairingStrategy::Consecutive)
    } else {
        (pairs, PairingStrategy::LabelParity)
    }
}

fn shared_length(channels: &[Vec<f64>]) -> usize {
    let min = channels.iter().map(Vec::len).min().unwrap_or(0);
    let max = channels.iter().map(Vec::len).max().unwrap_or(0);
    if min != max {
        warn!(
            "Channel lengths differ ({} to {} samples); montage clipped to {}",
            min, max, min
        );
    }
    min
}

#[inline]
fn finite_or_zero(value: f64, replaced: &mut usize) -> f64 {
    if value.is_finite() {
        value
    } else {
        *replaced += 1;
        0.0
    }
}

fn average_reference(mut channels: Vec<Vec<f64>>, labels: &[String], len: usize) -> MontageOutput {
    let mut replaced = 0;
    for ch in channels.iter_mut() {
        ch.truncate(len);
    }

    for s in 0..len {
        let (sum, count) = channels.iter().fold((0.0, 0usize), |(sum, count), ch| {
            if ch[s].is_finite() {
                (sum + ch[s], count + 1)
            } else {
                (sum, count)
            }
        });
        let average = if count > 0 { sum / count as f64 } else { 0.0 };
        let average = finite_or_zero(average, &mut replaced);

        for ch in channels.iter_mut() {
            let value = finite_or_zero(ch[s], &mut replaced);
            ch[s] = finite_or_zero(value - average, &mut replaced);
        }
    }

    MontageOutput {
        sources: (0..channels.len()).collect(),
        labels: labels.to_vec(),
        channels,
        pairing: None,
        non_finite_replaced: replaced,
    }
}

fn bipolar(channels: &[Vec<f64>], labels: &[String], len: usize) -> MontageOutput {
    let (pairs, strategy) = bipolar_pairs(labels);
    let mut replaced = 0;

    let mut out_channels = Vec::with_capacity(pairs.len());
    let mut out_labels = Vec::with_capacity(pairs.len());
    let mut sources = Vec::with_capacity(pairs.len());

    for &(left, right) in &pairs {
        let diff: Vec<f64> = channels[left][..len]
            .iter()
            .zip(&channels[right][..len])
            .map(|(a, b)| finite_or_zero(a - b, &mut replaced))
            .collect();
        out_channels.push(diff);
        out_labels.push(format!("{}-{}", labels[left].trim(), labels[right].trim()));
        sources.push(left);
    }

    MontageOutput {
        channels: out_channels,
        labels: out_labels,
        sources,
        pairing: Some(strategy),
        non_finite_replaced: replaced,
    }
}

fn laplacian(channels: &[Vec<f64>], labels: &[String], len: usize) -> MontageOutput {
    let count = channels.len();
    let mut replaced = 0;
    let mut out = vec![vec![0.0; len]; count];

    for s in 0..len {
        for ch in 0..count {
            let mut neighbor_sum = 0.0;
            let mut neighbors = 0;
            if ch > 0 {
                neighbor_sum += channels[ch - 1][s];
                neighbors += 1;
            }
            if ch + 1 < count {
                neighbor_sum += channels[ch + 1][s];
                neighbors += 1;
            }
            let value = channels[ch][s] - neighbor_sum / neighbors as f64;
            out[ch][s] = finite_or_zero(value, &mut replaced);
        }
    }

    MontageOutput {
        channels: out,
        labels: labels.to_vec(),
        sources: (0..count).collect(),
        pairing: None,
        non_finite_replaced: replaced,
    }
}
