//! Channel reconciliation between the PDF and the config file, calibration,
//! canonical ordering and the 4D to Neuromag renaming.

use std::cmp::Ordering;

use nalgebra::Matrix4;

use super::config::ChannelConfig;
use super::constants::FIFF_LOGNO;
use super::pdf::{PdfChannel, SampleFormat};
use super::transforms::{coil_trans_to_vv, trans_to_loc, CoordFrame};
use crate::error::FormatError;

/// A PDF channel joined with its config record.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedChannel {
    /// 4D channel name, from the config record.
    pub name: String,
    pub chan_no: i16,
    /// Column of this channel in the on-disk sample matrix.
    pub column: usize,
    pub scale: f32,
    pub units_per_bit: f32,
    pub gain: f32,
    pub cal: f64,
    /// Coil transform in 4D device coordinates.
    pub coil_trans: Option<Matrix4<f64>>,
}

pub fn calibration(format: SampleFormat, scale: f32, units_per_bit: f32, gain: f32) -> f64 {
    let (scale, upb, gain) = (scale as f64, units_per_bit as f64, gain as f64);
    if format.is_integer() {
        scale * upb / gain
    } else {
        scale * gain
    }
}

/// Join PDF channels with config channels on channel number.
///
/// Every PDF channel must be described by exactly one config record. The
/// result is sorted by channel number.
pub fn reconcile(
    pdf_channels: &[PdfChannel],
    config_channels: &[ChannelConfig],
    format: SampleFormat,
) -> Result<Vec<MatchedChannel>, FormatError> {
    let mut pdf: Vec<(usize, &PdfChannel)> = pdf_channels.iter().enumerate().collect();
    pdf.sort_by_key(|(_, ch)| ch.chan_no);

    let pdf_numbers: Vec<i16> = pdf.iter().map(|(_, ch)| ch.chan_no).collect();
    let mut cfg: Vec<&ChannelConfig> = config_channels
        .iter()
        .filter(|c| pdf_numbers.binary_search(&c.chan_no).is_ok())
        .collect();
    cfg.sort_by_key(|c| c.chan_no);

    let cfg_numbers: Vec<i16> = cfg.iter().map(|c| c.chan_no).collect();
    if cfg_numbers != pdf_numbers {
        return Err(FormatError::ChannelMismatch {
            pdf: pdf_numbers,
            config: cfg_numbers,
        });
    }

    Ok(pdf
        .into_iter()
        .zip(cfg)
        .map(|((column, ch), ch_cfg)| MatchedChannel {
            name: ch_cfg.name.clone(),
            chan_no: ch.chan_no,
            column,
            scale: ch.scale,
            units_per_bit: ch_cfg.units_per_bit,
            gain: ch_cfg.gain,
            cal: calibration(format, ch.scale, ch_cfg.units_per_bit, ch_cfg.gain),
            coil_trans: ch_cfg.transform().copied(),
        })
        .collect())
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum SortKey<'a> {
    Sensor(u64),
    Other(&'a str),
}

fn sort_key(name: &str) -> SortKey<'_> {
    name.strip_prefix('A')
        .and_then(|n| n.parse::<u64>().ok())
        .map_or(SortKey::Other(name), SortKey::Sensor)
}

/// Canonical channel order: `A<n>` sensors by number, everything else lexically after them.
pub fn canonical_order(channels: &mut [MatchedChannel]) {
    channels.sort_by(|a, b| match sort_key(&a.name).cmp(&sort_key(&b.name)) {
        Ordering::Equal => a.chan_no.cmp(&b.chan_no),
        other => other,
    });
}

#[derive(Debug, Default)]
struct RenameCounters {
    ref_mag: u32,
    ref_grad: u32,
    eog: u32,
    ext: u32,
}

fn next(counter: &mut u32) -> u32 {
    *counter += 1;
    *counter
}

fn rename_channel(name: &str, counters: &mut RenameCounters) -> String {
    if let SortKey::Sensor(n) = sort_key(name) {
        return format!("MEG {:03}", n);
    }
    match name {
        "RESPONSE" => "STI 013".to_string(),
        "TRIGGER" => "STI 014".to_string(),
        "ECG" => "ECG 001".to_string(),
        "UACurrent" => "UTL 001".to_string(),
        _ if name.starts_with("EOG") => format!("EOG {:03}", next(&mut counters.eog)),
        _ if name.starts_with('M') => format!("RFM {:03}", next(&mut counters.ref_mag)),
        _ if name.starts_with('G') => format!("RFG {:03}", next(&mut counters.ref_grad)),
        _ if name.starts_with('X') => format!("EXT {:03}", next(&mut counters.ext)),
        _ => name.to_string(),
    }
}

/// Neuromag names look like `MEG 001`: three capitals, a space, three digits.
fn is_neuromag_name(name: &str) -> bool {
    let bytes = name.as_bytes();
    bytes.len() == 7
        && bytes[..3].iter().all(u8::is_ascii_uppercase)
        && bytes[3] == b' '
        && bytes[4..].iter().all(u8::is_ascii_digit)
}

/// Rename canonically ordered 4D channel names to Neuromag style.
///
/// Ambiguous prefixes are numbered by position, so the result depends on the
/// input order. Names that already look renamed are rejected.
pub fn rename_channels<S: AsRef<str>>(names: &[S]) -> Result<Vec<String>, FormatError> {
    if let Some(name) = names.iter().map(|n| n.as_ref()).find(|n| is_neuromag_name(n)) {
        return Err(FormatError::AlreadyRenamed(name.to_string()));
    }

    let mut counters = RenameCounters::default();
    Ok(names
        .iter()
        .map(|n| rename_channel(n.as_ref(), &mut counters))
        .collect())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Meg,
    RefMeg,
    Stim,
    Eog,
    Ecg,
    Misc,
}

impl ChannelKind {
    /// FIFF channel kind code.
    pub fn fiff_code(self) -> i32 {
        match self {
            ChannelKind::Meg => 1,
            ChannelKind::RefMeg => 301,
            ChannelKind::Stim => 3,
            ChannelKind::Eog => 202,
            ChannelKind::Ecg => 402,
            ChannelKind::Misc => 502,
        }
    }

    pub fn is_meg(self) -> bool {
        matches!(self, ChannelKind::Meg | ChannelKind::RefMeg)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoilType {
    MagnesMag,
    MagnesRefMag,
    MagnesRefGradDiagonal,
    MagnesRefGradOffDiagonal,
}

impl CoilType {
    pub fn fiff_code(self) -> i32 {
        match self {
            CoilType::MagnesMag => 4001,
            CoilType::MagnesRefMag => 4003,
            CoilType::MagnesRefGradDiagonal => 4004,
            CoilType::MagnesRefGradOffDiagonal => 4005,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Tesla,
    TeslaPerMeter,
    Volt,
}

impl Unit {
    pub fn fiff_code(self) -> i32 {
        match self {
            Unit::Tesla => 112,
            Unit::TeslaPerMeter => 201,
            Unit::Volt => 107,
        }
    }
}

/// A channel of the decoded recording, named and located the Neuromag way.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalChannel {
    pub name: String,
    pub bti_name: String,
    pub chan_no: i16,
    pub kind: ChannelKind,
    pub coil_type: Option<CoilType>,
    pub unit: Unit,
    pub cal: f64,
    pub range: f64,
    pub scanno: i32,
    pub logno: i32,
    /// Device frame for MEG and reference channels, unset otherwise.
    pub coord_frame: Option<CoordFrame>,
    /// Coil transform in Neuromag device coordinates.
    pub coil_trans: Option<Matrix4<f64>>,
    pub loc: Option<[f64; 12]>,
    /// Column of this channel in the on-disk sample matrix.
    pub column: usize,
}

fn classify(name: &str, bti_name: &str) -> (ChannelKind, Option<CoilType>, Unit) {
    match name.get(..3).unwrap_or(name) {
        "MEG" => (ChannelKind::Meg, Some(CoilType::MagnesMag), Unit::Tesla),
        "RFM" => (ChannelKind::RefMeg, Some(CoilType::MagnesRefMag), Unit::Tesla),
        "RFG" => {
            let coil = match bti_name {
                "GxxA" | "GyyA" => Some(CoilType::MagnesRefGradDiagonal),
                "GyxA" | "GzxA" | "GzyA" => Some(CoilType::MagnesRefGradOffDiagonal),
                _ => None,
            };
            (ChannelKind::RefMeg, coil, Unit::TeslaPerMeter)
        }
        "STI" => (ChannelKind::Stim, None, Unit::Volt),
        "EOG" => (ChannelKind::Eog, None, Unit::Volt),
        "ECG" => (ChannelKind::Ecg, None, Unit::Volt),
        _ => (ChannelKind::Misc, None, Unit::Volt),
    }
}

/// Build the final channel list from canonically ordered matched channels.
///
/// MEG and reference coil transforms are moved into the Neuromag device frame
/// using the sensor array transform and the 4D to Neuromag transform.
pub fn build_channels(
    matched: &[MatchedChannel],
    sensor_trans: &Matrix4<f64>,
    bti_to_nm: &Matrix4<f64>,
) -> Result<Vec<CanonicalChannel>, FormatError> {
    let names = rename_channels(&matched.iter().map(|c| c.name.as_str()).collect::<Vec<_>>())?;

    let channels = matched
        .iter()
        .zip(names)
        .enumerate()
        .map(|(i, (ch, name))| {
            let idx = i as i32 + 1;
            let (kind, coil_type, unit) = classify(&name, &ch.name);

            let (coil_trans, loc, logno, coord_frame) = if kind.is_meg() {
                let t = ch
                    .coil_trans
                    .as_ref()
                    .map(|t| coil_trans_to_vv(t, sensor_trans, bti_to_nm));
                let loc = t.as_ref().map(trans_to_loc);
                (t, loc, idx, Some(CoordFrame::Device))
            } else {
                (None, None, idx + FIFF_LOGNO, None)
            };

            CanonicalChannel {
                name,
                bti_name: ch.name.clone(),
                chan_no: ch.chan_no,
                kind,
                coil_type,
                unit,
                cal: ch.cal,
                range: 1.0,
                scanno: idx,
                logno,
                coord_frame,
                coil_trans,
                loc,
                column: ch.column,
            }
        })
        .collect();

    Ok(channels)
}
