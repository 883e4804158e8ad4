use crate::error::Error;
use num_traits::ToPrimitive;

#[derive(Debug, Copy, Clone, PartialEq)]
pub(crate) struct Point3 {
    pub(crate) x: f32,
    pub(crate) y: f32,
    pub(crate) z: f32,
}

impl Point3 {
    pub(crate) fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// A point with every coordinate set to NaN, marking a missing depth.
    pub(crate) fn nan() -> Self {
        Self::new(f32::NAN, f32::NAN, f32::NAN)
    }

    pub(crate) fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// Pinhole camera intrinsics of the color sensor.
#[derive(Debug, Copy, Clone, PartialEq)]
pub(crate) struct Intrinsics {
    pub(crate) fx: f32,
    pub(crate) fy: f32,
    pub(crate) cx: f32,
    pub(crate) cy: f32,
}

impl Intrinsics {
    /// Build intrinsics from a row-major 3x3 camera matrix.
    pub(crate) fn from_camera_matrix(k: &[f64; 9]) -> Result<Self, Error> {
        let (fx, fy) = (k[0], k[4]);
        if fx == 0.0 || fy == 0.0 || !fx.is_finite() || !fy.is_finite() {
            return Err(Error::InvalidCameraMatrix(fx, fy));
        }
        Ok(Self {
            fx: fx.to_f32().ok_or(Error::ConvertToF32)?,
            fy: fy.to_f32().ok_or(Error::ConvertToF32)?,
            cx: k[2].to_f32().ok_or(Error::ConvertToF32)?,
            cy: k[5].to_f32().ok_or(Error::ConvertToF32)?,
        })
    }

    /// Back-project pixel `(u, v)` at `depth` meters into the optical frame.
    pub(crate) fn deproject(&self, u: f32, v: f32, depth: f32) -> Point3 {
        Point3 {
            x: (u - self.cx) * depth / self.fx,
            y: (v - self.cy) * depth / self.fy,
            z: depth,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Intrinsics, Point3};
    use assert_approx_eq::assert_approx_eq;

    const K: [f64; 9] = [615.0, 0.0, 320.0, 0.0, 615.5, 240.0, 0.0, 0.0, 1.0];

    #[test]
    fn reads_camera_matrix() {
        let intrinsics = Intrinsics::from_camera_matrix(&K).unwrap();
        assert_approx_eq!(intrinsics.fx, 615.0);
        assert_approx_eq!(intrinsics.fy, 615.5);
        assert_approx_eq!(intrinsics.cx, 320.0);
        assert_approx_eq!(intrinsics.cy, 240.0);
    }

    #[test]
    fn rejects_zero_focal_length() {
        let mut k = K;
        k[4] = 0.0;
        assert!(Intrinsics::from_camera_matrix(&k).is_err());
    }

    #[test]
    fn principal_point_lies_on_the_optical_axis() {
        let intrinsics = Intrinsics::from_camera_matrix(&K).unwrap();
        let point = intrinsics.deproject(320.0, 240.0, 2.0);
        assert_approx_eq!(point.x, 0.0);
        assert_approx_eq!(point.y, 0.0);
        assert_approx_eq!(point.z, 2.0);
    }

    #[test]
    fn deproject_scales_with_depth() {
        let intrinsics = Intrinsics {
            fx: 500.0,
            fy: 400.0,
            cx: 300.0,
            cy: 200.0,
        };
        let point = intrinsics.deproject(400.0, 100.0, 1.5);
        assert_approx_eq!(point.x, 0.3);
        assert_approx_eq!(point.y, -0.375);
        assert_approx_eq!(point.z, 1.5);
    }

    #[test]
    fn nan_point_is_not_finite() {
        assert!(!Point3::nan().is_finite());
        assert!(Point3::new(0.0, 1.0, 2.0).is_finite());
    }
}
