//! Coordinate transforms between the 4D device frame and the Neuromag frames.
//!
//! 4D transforms are 4x4 matrices with the rotation in the upper-left 3x3
//! block, the translation in the last column and a per-column scale row at
//! the bottom (all ones for the identity).

use nalgebra::{Matrix3, Matrix4, RowVector4, Vector3};

use super::head_shape::{DigPoint, PointKind};
use crate::error::FormatError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordFrame {
    Device,
    Head,
}

impl CoordFrame {
    pub fn fiff_code(self) -> i32 {
        match self {
            CoordFrame::Device => 1,
            CoordFrame::Head => 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeviceHeadTransform {
    pub from: CoordFrame,
    pub to: CoordFrame,
    pub trans: Matrix4<f64>,
}

pub fn identity_trans() -> Matrix4<f64> {
    let mut t = Matrix4::identity();
    t.set_row(3, &RowVector4::repeat(1.0));
    t
}

fn rotation(t: &Matrix4<f64>) -> Matrix3<f64> {
    t.fixed_view::<3, 3>(0, 0).into_owned()
}

fn translation(t: &Matrix4<f64>) -> Vector3<f64> {
    t.fixed_view::<3, 1>(0, 3).into_owned()
}

fn scale_row(x: &mut Matrix4<f64>, t: &Matrix4<f64>) {
    for j in 0..4 {
        x[(3, j)] *= t[(3, j)];
    }
}

/// Homogeneous form of the rigid part of `t`.
fn rigid(t: &Matrix4<f64>) -> Matrix4<f64> {
    let mut h = *t;
    h.set_row(3, &RowVector4::new(0.0, 0.0, 0.0, 1.0));
    h
}

/// 4D to Neuromag device transform: axis flip, tilt about x by `adjust`
/// degrees, then `translation` meters.
pub fn bti_to_vv_trans(adjust: f64, translation: [f64; 3]) -> Matrix4<f64> {
    let flip = Matrix3::new(0.0, -1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0);
    let (sin, cos) = adjust.to_radians().sin_cos();
    let tilt = Matrix3::new(1.0, 0.0, 0.0, 0.0, cos, -sin, 0.0, sin, cos);

    let mut t = Matrix4::repeat(1.0);
    t.fixed_view_mut::<3, 3>(0, 0).copy_from(&(flip * tilt));
    t.fixed_view_mut::<3, 1>(0, 3)
        .copy_from(&Vector3::from(translation));
    t
}

/// Express `x` in the frame of `t`.
pub fn inverse_trans(x: &Matrix4<f64>, t: &Matrix4<f64>) -> Matrix4<f64> {
    let mut x = *x;
    scale_row(&mut x, t);

    let rt = rotation(t).transpose();
    let rot = rt * rotation(&x);
    let trans = rt * (translation(&x) - translation(t));
    x.fixed_view_mut::<3, 3>(0, 0).copy_from(&rot);
    x.fixed_view_mut::<3, 1>(0, 3).copy_from(&trans);
    x
}

pub fn apply_trans(x: &Matrix4<f64>, t: &Matrix4<f64>) -> Matrix4<f64> {
    let mut x = *x;

    let r = rotation(t);
    let rot = r * rotation(&x);
    let trans = r * translation(&x) + translation(t);
    x.fixed_view_mut::<3, 3>(0, 0).copy_from(&rot);
    x.fixed_view_mut::<3, 1>(0, 3).copy_from(&trans);
    scale_row(&mut x, t);
    x
}

/// Compose two transforms, `t1` applied after `t2`.
pub fn merge_trans(t1: &Matrix4<f64>, t2: &Matrix4<f64>) -> Matrix4<f64> {
    let mut t = rigid(t1) * rigid(t2);
    t.set_row(3, &RowVector4::repeat(1.0));
    t
}

/// Move a coil transform from 4D device coordinates to Neuromag device coordinates.
pub fn coil_trans_to_vv(
    coil_trans: &Matrix4<f64>,
    sensor_trans: &Matrix4<f64>,
    bti_to_nm: &Matrix4<f64>,
) -> Matrix4<f64> {
    let mut t = apply_trans(&inverse_trans(coil_trans, sensor_trans), bti_to_nm);
    t.fixed_view_mut::<1, 3>(3, 0).fill(0.0);
    t
}

/// Flattened location: origin followed by the x, y and z axis directions.
pub fn trans_to_loc(t: &Matrix4<f64>) -> [f64; 12] {
    let mut loc = [0.0; 12];
    for (k, col) in [3, 0, 1, 2].into_iter().enumerate() {
        for row in 0..3 {
            loc[k * 3 + row] = t[(row, col)];
        }
    }
    loc
}

pub fn transform_point(t: &Matrix4<f64>, p: &Vector3<f64>) -> Vector3<f64> {
    rotation(t) * p + translation(t)
}

/// In-plane alignment from the three fiducials (in 4D order: left, right, nasion).
///
/// The nasion is projected onto the left-right axis; the projection fixes
/// the rotation about z and the shift along x.
pub fn align_fiducials(fiducials: &[Vector3<f64>]) -> Result<Matrix4<f64>, FormatError> {
    let [lpa, rpa, nasion] = match fiducials {
        [a, b, c, ..] => [a, b, c],
        _ => return Err(FormatError::DegenerateFiducials),
    };

    let axis = lpa - rpa;
    let dp = nasion.dot(&axis);
    let tmp1 = nasion.norm_squared();
    let tmp2 = axis.norm_squared();
    if !(tmp1 * tmp2 > 0.0) {
        return Err(FormatError::DegenerateFiducials);
    }

    let dcos = -dp / (tmp1 * tmp2).sqrt();
    let dsin = (1.0 - dcos * dcos).max(0.0).sqrt();
    let dt = dp / tmp2.sqrt();

    let mut t = identity_trans();
    t[(0, 0)] = dcos;
    t[(0, 1)] = -dsin;
    t[(1, 0)] = dsin;
    t[(1, 1)] = dcos;
    t[(0, 3)] = dt;

    Ok(t)
}

/// Put digitization points in Neuromag head coordinates.
///
/// Returns the 4D head to Neuromag head transform. Points are rewritten in
/// place and the second and third fiducials swap places, giving the
/// left, nasion, right order Neuromag expects.
pub fn convert_coord_frame(dig: &mut [DigPoint]) -> Result<Matrix4<f64>, FormatError> {
    let fiducials: Vec<Vector3<f64>> = dig
        .iter()
        .filter(|d| d.kind == PointKind::Cardinal)
        .map(|d| d.r)
        .collect();
    let t = align_fiducials(&fiducials)?;

    for point in dig.iter_mut() {
        point.r = transform_point(&t, &point.r);
    }

    let cardinal: Vec<usize> = dig
        .iter()
        .enumerate()
        .filter(|(_, d)| d.kind == PointKind::Cardinal)
        .map(|(i, _)| i)
        .take(3)
        .collect();
    if let [_, second, third] = cardinal[..] {
        let r = dig[second].r;
        dig[second].r = dig[third].r;
        dig[third].r = r;
    }

    Ok(t)
}

/// Neuromag device to head transform.
///
/// `head_alignment` is the fiducial alignment from [`convert_coord_frame`],
/// `sensor_trans` the first sensor transform of the config file.
pub fn device_head_transform(
    sensor_trans: &Matrix4<f64>,
    bti_to_nm: &Matrix4<f64>,
    head_alignment: &Matrix4<f64>,
) -> DeviceHeadTransform {
    let nm_to_m_sensor = inverse_trans(&identity_trans(), bti_to_nm);
    let nm_sensor_m_head = merge_trans(sensor_trans, &nm_to_m_sensor);
    let mut trans = merge_trans(head_alignment, &nm_sensor_m_head);
    trans.fixed_view_mut::<1, 3>(3, 0).fill(0.0);

    DeviceHeadTransform {
        from: CoordFrame::Device,
        to: CoordFrame::Head,
        trans,
    }
}
