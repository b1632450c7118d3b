use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use nalgebra::Vector3;
use ndarray::{Array2, ArrayView1};

use super::constants::{DATA_N_IDX_POINTS, FILE_HS_N_DIGPOINTS, FILE_HS_VERSION};
use super::primitives::{checked_count, BtiReader};
use super::transforms::CoordFrame;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointKind {
    Cardinal,
    Hpi,
    Extra,
}

impl PointKind {
    pub fn fiff_code(self) -> i32 {
        match self {
            PointKind::Cardinal => 1,
            PointKind::Hpi => 2,
            PointKind::Extra => 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DigPoint {
    pub kind: PointKind,
    pub ident: u32,
    pub r: Vector3<f64>,
    pub coord_frame: CoordFrame,
}

/// Contents of a 4D head shape file: five index points (three fiducials and
/// two HPI coils) followed by the digitized head surface.
#[derive(Debug, Clone, PartialEq)]
pub struct HeadShape {
    pub version: i32,
    pub timestamp: i32,
    pub checksum: i32,
    pub idx_points: Array2<f64>,
    pub dig_points: Array2<f64>,
}

impl HeadShape {
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn from_reader<R: Read + Seek>(reader: R) -> Result<Self> {
        let mut r = BtiReader::new(reader)?;

        r.seek_to(FILE_HS_VERSION)?;
        let version = r.read_i32()?;
        let timestamp = r.read_i32()?;
        let checksum = r.read_i32()?;

        r.seek_to(FILE_HS_N_DIGPOINTS)?;
        let n_dig_points = checked_count(r.read_i32()?.into(), "digitization points")?;
        let idx_points = r.read_f64_matrix(DATA_N_IDX_POINTS, 3)?;
        let dig_points = r.read_f64_matrix(n_dig_points, 3)?;

        Ok(Self {
            version,
            timestamp,
            checksum,
            idx_points,
            dig_points,
        })
    }

    /// Digitization points with Neuromag kinds and identifiers.
    ///
    /// The first three index points are fiducials, the remaining index points
    /// HPI coils (dropped unless `use_hpi`), the head surface points are extra.
    pub fn dig_points(&self, use_hpi: bool) -> Vec<DigPoint> {
        let n_idx = self.idx_points.nrows();
        let point = |row: ArrayView1<f64>| Vector3::new(row[0], row[1], row[2]);

        let mut dig = Vec::with_capacity(n_idx + self.dig_points.nrows());
        for (i, row) in self.idx_points.rows().into_iter().enumerate() {
            let (kind, ident) = if i < 3 {
                (PointKind::Cardinal, i + 1)
            } else if use_hpi {
                (PointKind::Hpi, i - 2)
            } else {
                continue;
            };
            dig.push(DigPoint {
                kind,
                ident: ident as u32,
                r: point(row),
                coord_frame: CoordFrame::Head,
            });
        }
        for (i, row) in self.dig_points.rows().into_iter().enumerate() {
            dig.push(DigPoint {
                kind: PointKind::Extra,
                ident: i as u32 + 1,
                r: point(row),
                coord_frame: CoordFrame::Head,
            });
        }

        dig
    }
}
