use std::io::{Read, Seek};

use byteorder::{BigEndian, ByteOrder};
use ndarray::Array2;
use num_traits::AsPrimitive;

use super::channels::CanonicalChannel;
use super::constants::MEG_UNIT_SCALE;
use super::pdf::{PdfHeader, SampleFormat};
use super::primitives::BtiReader;
use crate::error::{FormatError, Result};

mod locked {
    pub(crate) trait Locked {}

    impl Locked for i16 {}
    impl Locked for i32 {}
    impl Locked for f32 {}
    impl Locked for f64 {}
}

pub(crate) trait BinaryFormat: locked::Locked + AsPrimitive<f64> {
    const BYTES: usize;

    fn from_bytes(bytes: &[u8]) -> Self;
}

impl BinaryFormat for i16 {
    const BYTES: usize = 2;

    fn from_bytes(bytes: &[u8]) -> Self {
        BigEndian::read_i16(bytes)
    }
}

impl BinaryFormat for i32 {
    const BYTES: usize = 4;

    fn from_bytes(bytes: &[u8]) -> Self {
        BigEndian::read_i32(bytes)
    }
}

impl BinaryFormat for f32 {
    const BYTES: usize = 4;

    fn from_bytes(bytes: &[u8]) -> Self {
        BigEndian::read_f32(bytes)
    }
}

impl BinaryFormat for f64 {
    const BYTES: usize = 8;

    fn from_bytes(bytes: &[u8]) -> Self {
        BigEndian::read_f64(bytes)
    }
}

/// Validate a requested slice range against the recording length.
pub fn check_range(start: i64, stop: i64, total: usize) -> std::result::Result<(usize, usize), FormatError> {
    let total_i = total as i64;
    if start < 0 || stop > total_i || start >= stop {
        return Err(FormatError::InvalidRange {
            start,
            stop,
            total: total_i,
        });
    }

    Ok((start as usize, stop as usize))
}

fn decode<T: BinaryFormat>(raw: &[u8], n_slices: usize, n_chans: usize) -> Result<Array2<f64>> {
    let values = raw
        .chunks_exact(T::BYTES)
        .map(|c| T::from_bytes(c).as_())
        .collect::<Vec<f64>>();
    let data = Array2::from_shape_vec((n_slices, n_chans), values)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

    // Slices are stored time-major, consumers want one row per channel
    Ok(data.reversed_axes())
}

/// Decode a time-major block of samples into a channels x slices matrix.
pub fn decode_samples(raw: &[u8], format: SampleFormat, n_slices: usize, n_chans: usize) -> Result<Array2<f64>> {
    match format {
        SampleFormat::Int16 => decode::<i16>(raw, n_slices, n_chans),
        SampleFormat::Int32 => decode::<i32>(raw, n_slices, n_chans),
        SampleFormat::Float32 => decode::<f32>(raw, n_slices, n_chans),
        SampleFormat::Float64 => decode::<f64>(raw, n_slices, n_chans),
    }
}

/// Read slices `start..stop` of the sample matrix, rows in PDF channel order.
pub fn read_samples<R: Read + Seek>(
    r: &mut BtiReader<R>,
    header: &PdfHeader,
    start: usize,
    stop: usize,
) -> Result<Array2<f64>> {
    let n_chans = header.channels.len();
    let out_of_range = || FormatError::InvalidRange {
        start: start as i64,
        stop: stop as i64,
        total: header.data_slices() as i64,
    };
    let n_slices = stop.checked_sub(start).ok_or_else(out_of_range)?;
    let offset = header.bytes_per_slice.checked_mul(start).ok_or_else(out_of_range)?;
    let len = header.bytes_per_slice.checked_mul(n_slices).ok_or_else(out_of_range)?;
    let end = (offset as u64).checked_add(len as u64).ok_or_else(out_of_range)?;
    if header.data_offset() + end > header.data_end() {
        return Err(out_of_range().into());
    }

    r.seek_to(header.data_offset() + offset as u64)?;
    let raw = r.read_bytes(len)?;

    decode_samples(&raw, header.format, n_slices, n_chans)
}

/// Reorder rows into canonical channel order and apply calibration.
///
/// MEG and reference rows are additionally scaled to Tesla.
pub fn calibrate(data: &Array2<f64>, channels: &[CanonicalChannel]) -> Array2<f64> {
    let mut out = Array2::<f64>::zeros((channels.len(), data.ncols()));
    for (mut row, ch) in out.rows_mut().into_iter().zip(channels) {
        let factor = if ch.kind.is_meg() {
            ch.cal * ch.range * MEG_UNIT_SCALE
        } else {
            ch.cal * ch.range
        };
        row.assign(&(&data.row(ch.column) * factor));
    }

    out
}
