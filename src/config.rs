use crate::error::Error;
use num_traits::ToPrimitive;
use std::{convert::TryFrom, path::PathBuf, str::FromStr};

const MODEL_DIR_PARAM: &str = "openpose_model_dir";
const NET_INPUT_MULTIPLE: f64 = 16.0;

/// Startup parameters read from the node's private namespace.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct NodeParams {
    pub(crate) model_dir: PathBuf,
    pub(crate) color_topic: String,
    pub(crate) depth_topic: String,
    pub(crate) cam_info_topic: String,
    pub(crate) frame_id: String,
    pub(crate) pub_topic: String,
}

impl NodeParams {
    /// Read parameters from the ROS parameter server.
    pub(crate) fn from_ros() -> Result<Self, Error> {
        Self::from_lookup(|name| {
            rosrust::param(&format!("~{}", name)).and_then(|param| param.get::<String>().ok())
        })
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str, default: &str| {
            lookup(name)
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| default.to_owned())
        };

        let model_dir = lookup(MODEL_DIR_PARAM)
            .filter(|value| !value.is_empty())
            .ok_or(Error::GetRequiredParam(MODEL_DIR_PARAM))?;

        Ok(Self {
            model_dir: PathBuf::from(model_dir),
            color_topic: get("color_topic", "/camera/color/image_raw"),
            depth_topic: get("depth_topic", "/camera/aligned_depth_to_color/image_raw"),
            cam_info_topic: get("cam_info_topic", "/camera/color/camera_info"),
            frame_id: get("frame_id", "camera_color_optical_frame"),
            pub_topic: get("pub_topic", "/frame"),
        })
    }
}

/// Network input resolution. `None` is derived from the image aspect ratio.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct NetResolution {
    width: Option<u32>,
    height: Option<u32>,
}

impl NetResolution {
    /// Compute the network input size `(width, height)` for an image.
    pub(crate) fn input_size(
        &self,
        image_width: usize,
        image_height: usize,
    ) -> Result<(i32, i32), Error> {
        let error = || Error::ComputeNetInputSize(image_width, image_height);
        if image_width == 0 || image_height == 0 {
            return Err(error());
        }
        let aspect = image_width.to_f64().ok_or_else(error)?
            / image_height.to_f64().ok_or_else(error)?;
        let round = |value: f64| {
            ((value / NET_INPUT_MULTIPLE).round() * NET_INPUT_MULTIPLE)
                .max(NET_INPUT_MULTIPLE)
                .to_i32()
                .ok_or(Error::ConvertToI32)
        };

        match (self.width, self.height) {
            (Some(width), Some(height)) => Ok((
                width.to_i32().ok_or(Error::ConvertToI32)?,
                height.to_i32().ok_or(Error::ConvertToI32)?,
            )),
            (None, Some(height)) => Ok((
                round(f64::from(height) * aspect)?,
                height.to_i32().ok_or(Error::ConvertToI32)?,
            )),
            (Some(width), None) => Ok((
                width.to_i32().ok_or(Error::ConvertToI32)?,
                round(f64::from(width) / aspect)?,
            )),
            (None, None) => Err(error()),
        }
    }
}

impl Default for NetResolution {
    fn default() -> Self {
        Self {
            width: None,
            height: Some(368),
        }
    }
}

impl FromStr for NetResolution {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let error = || Error::ParseNetResolution(s.to_owned());
        let parse = |value: &str| -> Result<Option<u32>, Error> {
            match value.trim().parse::<i64>().map_err(|_| error())? {
                -1 => Ok(None),
                v if v > 0 => u32::try_from(v).map(Some).map_err(|_| error()),
                _ => Err(error()),
            }
        };

        let mut parts = s.split('x');
        let (width, height) = match (parts.next(), parts.next(), parts.next()) {
            (Some(width), Some(height), None) => (parse(width)?, parse(height)?),
            _ => return Err(error()),
        };
        if width.is_none() && height.is_none() {
            return Err(error());
        }
        Ok(Self { width, height })
    }
}

#[cfg(test)]
mod tests {
    use super::{NetResolution, NodeParams};
    use std::{collections::HashMap, path::PathBuf};

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map = pairs
            .iter()
            .map(|&(k, v)| (k.to_owned(), v.to_owned()))
            .collect::<HashMap<_, _>>();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn model_dir_is_required() {
        assert!(NodeParams::from_lookup(lookup(&[])).is_err());
        assert!(NodeParams::from_lookup(lookup(&[("openpose_model_dir", "")])).is_err());
    }

    #[test]
    fn params_fall_back_to_defaults() {
        let params = NodeParams::from_lookup(lookup(&[
            ("openpose_model_dir", "/opt/openpose/models"),
            ("frame_id", "head_camera"),
            ("pub_topic", ""),
        ]))
        .unwrap();
        assert_eq!(params.model_dir, PathBuf::from("/opt/openpose/models"));
        assert_eq!(params.frame_id, "head_camera");
        assert_eq!(params.pub_topic, "/frame");
        assert_eq!(params.color_topic, "/camera/color/image_raw");
    }

    #[test]
    fn parses_resolutions() {
        assert_eq!(
            "-1x368".parse::<NetResolution>().unwrap(),
            NetResolution::default()
        );
        assert!("656x368".parse::<NetResolution>().is_ok());
        assert!("-1x-1".parse::<NetResolution>().is_err());
        assert!("0x368".parse::<NetResolution>().is_err());
        assert!("368".parse::<NetResolution>().is_err());
        assert!("1x2x3".parse::<NetResolution>().is_err());
        assert!("axb".parse::<NetResolution>().is_err());
    }

    #[test]
    fn derives_width_from_aspect_ratio() {
        let resolution = NetResolution::default();
        assert_eq!(resolution.input_size(640, 480).unwrap(), (496, 368));
    }

    #[test]
    fn derives_height_from_aspect_ratio() {
        let resolution = "656x-1".parse::<NetResolution>().unwrap();
        assert_eq!(resolution.input_size(640, 480).unwrap(), (656, 496));
    }

    #[test]
    fn fixed_resolution_ignores_image() {
        let resolution = "320x240".parse::<NetResolution>().unwrap();
        assert_eq!(resolution.input_size(1920, 1080).unwrap(), (320, 240));
    }

    #[test]
    fn empty_image_has_no_input_size() {
        assert!(NetResolution::default().input_size(0, 480).is_err());
    }
}
