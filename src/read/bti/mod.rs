//! 4D Neuroimaging / BTi Magnes WH3600 reader.
//!
//! A recording is spread over three files: the processed data file (PDF)
//! holding samples and acquisition header, the system `config` file
//! describing every channel and sensor, and the `hs_file` with the
//! digitized head shape. [`read_raw_bti`] decodes all three into a
//! [`RawBti`] with Neuromag-style channel metadata, digitization points and
//! device to head transform.

pub mod channels;
pub mod config;
pub mod constants;
pub mod head_shape;
pub mod pdf;
pub mod primitives;
pub mod samples;
pub mod transforms;

use std::fs::File;
use std::io::{BufReader, ErrorKind};
use std::path::Path;

use ndarray::{Array1, Array2, ArrayView1};

use self::channels::{build_channels, canonical_order, reconcile, CanonicalChannel};
use self::config::{ETable, SystemConfig};
use self::constants::*;
use self::head_shape::{DigPoint, HeadShape};
use self::pdf::PdfHeader;
use self::primitives::BtiReader;
use self::samples::{calibrate, check_range, read_samples};
use self::transforms::{
    bti_to_vv_trans, convert_coord_frame, device_head_transform, identity_trans, DeviceHeadTransform,
};
use super::BtiPaths;
use crate::error::{BtiError, Result};

/// Operator settings for a read.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadOptions {
    /// Degrees to tilt the x axis, corrects the sensor frame misalignment.
    pub rotation_x: f64,
    /// Meters, places the origin at the center of the head.
    pub translation: [f64; 3],
    /// Keep the HPI coils as digitization points.
    pub use_hpi: bool,
    pub start: Option<i64>,
    pub stop: Option<i64>,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            rotation_x: DEFAULT_ROTATION_X,
            translation: DEFAULT_TRANSLATION,
            use_hpi: false,
            start: None,
            stop: None,
        }
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| BtiError::Options(format!("invalid value `{}` for `{}`", value, key)))
}

impl ReadOptions {
    /// Load options from the `[bti]` section of an INI file. Missing keys keep their defaults.
    pub fn from_ini_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = ini::Ini::load_from_file(path.as_ref()).map_err(|e| match e {
            ini::Error::Io(err) => BtiError::Io(err),
            other => BtiError::Options(other.to_string()),
        })?;
        Self::from_ini(&file)
    }

    pub fn from_ini_str(buf: &str) -> Result<Self> {
        let file = ini::Ini::load_from_str(buf).map_err(|e| BtiError::Options(e.to_string()))?;
        Self::from_ini(&file)
    }

    fn from_ini(file: &ini::Ini) -> Result<Self> {
        let mut options = Self::default();
        let Some(section) = file.section(Some("bti")) else {
            return Ok(options);
        };

        if let Some(v) = section.get("rotation_x") {
            options.rotation_x = parse_value("rotation_x", v)?;
        }
        if let Some(v) = section.get("translation") {
            let values = v
                .split(',')
                .map(|s| parse_value::<f64>("translation", s))
                .collect::<Result<Vec<f64>>>()?;
            options.translation = values.try_into().map_err(|_| {
                BtiError::Options(format!("`translation` needs three values, got `{}`", v))
            })?;
        }
        if let Some(v) = section.get("use_hpi") {
            options.use_hpi = match v.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => true,
                "false" | "no" | "0" => false,
                _ => return Err(BtiError::Options(format!("invalid value `{}` for `use_hpi`", v))),
            };
        }
        if let Some(v) = section.get("start") {
            options.start = Some(parse_value("start", v)?);
        }
        if let Some(v) = section.get("stop") {
            options.stop = Some(parse_value("stop", v)?);
        }

        Ok(options)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeasInfo {
    pub sfreq: f64,
    pub highpass: f64,
    pub lowpass: f64,
    pub meas_date: Option<i32>,
    pub channels: Vec<CanonicalChannel>,
    pub dig: Vec<DigPoint>,
    pub dev_head_t: DeviceHeadTransform,
}

impl MeasInfo {
    pub fn nchan(&self) -> usize {
        self.channels.len()
    }

    pub fn ch_names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.name.as_str()).collect()
    }
}

/// A decoded 4D recording.
#[derive(Debug, Clone)]
pub struct RawBti {
    pub info: MeasInfo,
    /// Channels x time slices, MEG and reference channels in Tesla.
    pub data: Array2<f64>,
    pub first_samp: usize,
    pub last_samp: usize,
    pub pdf: PdfHeader,
    pub config: SystemConfig,
}

impl RawBti {
    pub fn n_times(&self) -> usize {
        self.data.ncols()
    }

    /// Sample times in seconds, counted from the start of the recording.
    pub fn times(&self) -> Array1<f64> {
        let first = self.first_samp;
        Array1::from_iter((first..first + self.n_times()).map(|i| i as f64 / self.info.sfreq))
    }

    pub fn ch_names(&self) -> Vec<&str> {
        self.info.ch_names()
    }

    pub fn pick(&self, name: &str) -> Option<ArrayView1<f64>> {
        self.info
            .channels
            .iter()
            .position(|c| c.name == name)
            .map(|i| self.data.row(i))
    }
}

/// Passband from the E-table filter name, `"<highpass>,<lowpass>"`.
pub fn filter_band(e_table: Option<&ETable>) -> (f64, f64) {
    let default = (DEFAULT_HIGHPASS, DEFAULT_LOWPASS);
    let Some(name) = e_table.map(|t| t.header.filtername.trim()) else {
        log::warn!("No E-table in config, assuming passband {:?} Hz", default);
        return default;
    };
    if name.is_empty() {
        log::warn!("E-table carries no filter name, assuming passband {:?} Hz", default);
        return default;
    }

    let values: std::result::Result<Vec<f64>, _> = name.split(',').map(|s| s.trim().parse::<f64>()).collect();
    match values.as_deref() {
        Ok([low]) => (*low, DEFAULT_LOWPASS),
        Ok([low, high, ..]) => (*low, *high),
        _ => {
            log::warn!("Cannot parse filter name `{}`, assuming passband {:?} Hz", name, default);
            default
        }
    }
}

fn read_dig<P: AsRef<Path>>(path: P, use_hpi: bool) -> Result<Vec<DigPoint>> {
    log::info!("... Reading digitization points from {}", path.as_ref().display());
    match HeadShape::read(path.as_ref()) {
        Ok(head_shape) => Ok(head_shape.dig_points(use_hpi)),
        Err(BtiError::Io(err)) if err.kind() == ErrorKind::NotFound => {
            log::warn!(
                "Head shape file {} not found, continuing without digitization points",
                path.as_ref().display()
            );
            Ok(Vec::new())
        }
        Err(err) => Err(err),
    }
}

/// Read a 4D recording.
///
/// Fails without returning any data if the files are inconsistent: a PDF
/// channel missing from the config, a bad header offset, an out-of-range
/// slice request. A missing head shape file only drops the digitization.
pub fn read_raw_bti<P, Q, S>(pdf_path: P, config_path: Q, head_shape_path: S, options: &ReadOptions) -> Result<RawBti>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
    S: AsRef<Path>,
{
    log::info!("Reading 4D PDF file {}...", pdf_path.as_ref().display());
    let mut pdf_reader = BtiReader::new(BufReader::new(File::open(pdf_path.as_ref())?))?;
    let pdf = PdfHeader::read(&mut pdf_reader)?;
    log::debug!(
        "PDF: {} channels, {} slices, {}",
        pdf.channels.len(),
        pdf.total_slices,
        data_format_name(pdf.data_format)
    );

    let config = SystemConfig::read(config_path.as_ref())?;

    let mut matched = reconcile(&pdf.channels, &config.channels, pdf.format)?;
    canonical_order(&mut matched);

    let sensor_trans = match config.transforms.first() {
        Some(t) => *t,
        None => {
            log::warn!("Config declares no sensor transforms, using identity");
            identity_trans()
        }
    };
    let bti_to_nm = bti_to_vv_trans(options.rotation_x, options.translation);

    log::info!("... Setting channel info structure.");
    let channels = build_channels(&matched, &sensor_trans, &bti_to_nm)?;

    let total = pdf.total_slices;
    let (start, stop) = check_range(options.start.unwrap_or(0), options.stop.unwrap_or(total as i64), total)?;
    let raw = read_samples(&mut pdf_reader, &pdf, start, stop)?;
    drop(pdf_reader);
    let data = calibrate(&raw, &channels);

    let mut dig = read_dig(head_shape_path, options.use_hpi)?;
    let head_alignment = if dig.is_empty() {
        identity_trans()
    } else {
        log::info!("... putting digitization points in Neuromag coordinates");
        convert_coord_frame(&mut dig)?
    };
    log::info!("... Computing new device to head transform.");
    let dev_head_t = device_head_transform(&sensor_trans, &bti_to_nm, &head_alignment);

    let sfreq = pdf.sfreq()?;
    let (highpass, lowpass) = filter_band(config.e_table_used());

    let info = MeasInfo {
        sfreq,
        highpass,
        lowpass,
        meas_date: pdf.meas_date(),
        channels,
        dig,
        dev_head_t,
    };

    log::info!(
        "    Range : {} ... {} = {:9.3} ... {:9.3} secs",
        start,
        stop - 1,
        start as f64 / sfreq,
        (stop - 1) as f64 / sfreq
    );

    Ok(RawBti {
        info,
        data,
        first_samp: start,
        last_samp: stop - 1,
        pdf,
        config,
    })
}

/// Read a recording laid out the way the acquisition software writes it.
pub fn read_raw_bti_session(paths: &BtiPaths, options: &ReadOptions) -> Result<RawBti> {
    read_raw_bti(paths.pdf(), paths.config(), paths.head_shape(), options)
}
