//! Typed big-endian reads over a seekable byte stream.
//!
//! Every read checks the remaining stream length first, so a truncated file
//! surfaces as [`FormatError::UnexpectedEof`] instead of a bare I/O error.
//! Padding is never inferred: callers skip reserved bytes explicitly with
//! [`BtiReader::skip`] or realign with [`BtiReader::correct_offset`].

use std::io::{Read, Seek, SeekFrom};

use byteorder::{BigEndian, ReadBytesExt};
use nalgebra::{Matrix4, Vector3};
use ndarray::Array2;

use super::constants::FILE_CURPOS;
use crate::error::{FormatError, Result};

pub struct BtiReader<R> {
    inner: R,
    pos: u64,
    len: u64,
}

impl<R: Read + Seek> BtiReader<R> {
    pub fn new(mut inner: R) -> Result<Self> {
        let len = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(0))?;

        Ok(Self { inner, pos: 0, len })
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn position(&self) -> u64 {
        self.pos
    }

    pub fn remaining(&self) -> u64 {
        self.len.saturating_sub(self.pos)
    }

    pub fn seek_to(&mut self, pos: u64) -> Result<()> {
        if pos > self.len {
            return Err(FormatError::UnexpectedEof {
                offset: self.pos,
                requested: pos.saturating_sub(self.pos),
                remaining: self.remaining(),
            }
            .into());
        }
        self.inner.seek(SeekFrom::Start(pos))?;
        self.pos = pos;

        Ok(())
    }

    /// Relative seek, used for reserved and padding fields.
    pub fn skip(&mut self, n: i64) -> Result<()> {
        let target = self.pos as i64 + n;
        if target < 0 {
            return Err(FormatError::UnexpectedEof {
                offset: self.pos,
                requested: n.unsigned_abs(),
                remaining: self.pos,
            }
            .into());
        }
        self.seek_to(target as u64)
    }

    /// Advance to the next multiple of 8 if the stream is not aligned.
    pub fn correct_offset(&mut self) -> Result<()> {
        let offset = self.pos % FILE_CURPOS;
        if offset != 0 {
            self.skip((FILE_CURPOS - offset) as i64)?;
        }

        Ok(())
    }

    pub fn require(&self, n: u64) -> Result<()> {
        if n > self.remaining() {
            return Err(FormatError::UnexpectedEof {
                offset: self.pos,
                requested: n,
                remaining: self.remaining(),
            }
            .into());
        }

        Ok(())
    }

    /// Checks that `count` records of `record_size` bytes fit in the rest of the stream.
    pub fn require_records(&self, count: usize, record_size: u64) -> Result<()> {
        self.require((count as u64).checked_mul(record_size).unwrap_or(u64::MAX))
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        self.require(2)?;
        let v = self.inner.read_i16::<BigEndian>()?;
        self.pos += 2;
        Ok(v)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        self.require(2)?;
        let v = self.inner.read_u16::<BigEndian>()?;
        self.pos += 2;
        Ok(v)
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        self.require(4)?;
        let v = self.inner.read_i32::<BigEndian>()?;
        self.pos += 4;
        Ok(v)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        self.require(4)?;
        let v = self.inner.read_u32::<BigEndian>()?;
        self.pos += 4;
        Ok(v)
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        self.require(8)?;
        let v = self.inner.read_i64::<BigEndian>()?;
        self.pos += 8;
        Ok(v)
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        self.require(4)?;
        let v = self.inner.read_f32::<BigEndian>()?;
        self.pos += 4;
        Ok(v)
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        self.require(8)?;
        let v = self.inner.read_f64::<BigEndian>()?;
        self.pos += 8;
        Ok(v)
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        self.require(n as u64)?;
        let mut buf = vec![0u8; n];
        self.inner.read_exact(&mut buf)?;
        self.pos += n as u64;
        Ok(buf)
    }

    /// Fixed-length string field, cut at the first NUL with pad bytes stripped.
    pub fn read_str(&mut self, n: usize) -> Result<String> {
        let buf = self.read_bytes(n)?;
        let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());

        Ok(String::from_utf8_lossy(&buf[..end])
            .trim_end_matches(' ')
            .to_string())
    }

    pub fn read_vec3(&mut self) -> Result<Vector3<f64>> {
        Ok(Vector3::new(
            self.read_f64()?,
            self.read_f64()?,
            self.read_f64()?,
        ))
    }

    /// 4x4 row-major double matrix.
    pub fn read_transform(&mut self) -> Result<Matrix4<f64>> {
        self.require(16 * 8)?;
        let mut values = [0.0f64; 16];
        for v in values.iter_mut() {
            *v = self.read_f64()?;
        }

        Ok(Matrix4::from_row_slice(&values))
    }

    pub fn read_f64_matrix(&mut self, rows: usize, cols: usize) -> Result<Array2<f64>> {
        self.require_records(rows.saturating_mul(cols), 8)?;
        let mut values = Vec::with_capacity(rows * cols);
        for _ in 0..rows * cols {
            values.push(self.read_f64()?);
        }

        Ok(Array2::from_shape_vec((rows, cols), values).map_err(shape_error)?)
    }

    pub fn read_f32_matrix(&mut self, rows: usize, cols: usize) -> Result<Array2<f32>> {
        self.require_records(rows.saturating_mul(cols), 4)?;
        let mut values = Vec::with_capacity(rows * cols);
        for _ in 0..rows * cols {
            values.push(self.read_f32()?);
        }

        Ok(Array2::from_shape_vec((rows, cols), values).map_err(shape_error)?)
    }

    pub fn read_i16_matrix(&mut self, rows: usize, cols: usize) -> Result<Array2<i16>> {
        self.require_records(rows.saturating_mul(cols), 2)?;
        let mut values = Vec::with_capacity(rows * cols);
        for _ in 0..rows * cols {
            values.push(self.read_i16()?);
        }

        Ok(Array2::from_shape_vec((rows, cols), values).map_err(shape_error)?)
    }
}

fn shape_error(err: ndarray::ShapeError) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, err)
}

/// Converts a count field read from disk into a usable length.
pub fn checked_count(count: i64, what: &'static str) -> std::result::Result<usize, FormatError> {
    usize::try_from(count).map_err(|_| FormatError::NegativeCount { what, count })
}
