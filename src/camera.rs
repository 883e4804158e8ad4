use crate::{
    config::NodeParams,
    error::Error,
    intrinsics::{Intrinsics, Point3},
    msg,
    throttle::Throttle,
};
use ndarray::Array2;
use std::{
    convert::TryFrom,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};
use tracing::{debug, warn};

const MILLIMETERS_PER_METER: f32 = 1000.0;
const BAD_IMAGE_WARN_PERIOD: Duration = Duration::from_secs(10);

/// A tightly packed bgr8 image.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ColorImage {
    width: usize,
    height: usize,
    data: Vec<u8>,
}

impl ColorImage {
    pub(crate) const CHANNELS: usize = 3;

    pub(crate) fn from_bgr8(width: usize, height: usize, data: Vec<u8>) -> Result<Self, Error> {
        let expected = width * height * Self::CHANNELS;
        if data.len() != expected {
            return Err(Error::ImageDataTooShort {
                expected,
                got: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Decode a raw image buffer, converting it to packed bgr8.
    pub(crate) fn decode(
        encoding: &str,
        width: u32,
        height: u32,
        step: u32,
        data: &[u8],
    ) -> Result<Self, Error> {
        let (bytes_per_pixel, blue, green, red) = match encoding {
            "bgr8" => (3, 0, 1, 2),
            "rgb8" => (3, 2, 1, 0),
            "bgra8" => (4, 0, 1, 2),
            "rgba8" => (4, 2, 1, 0),
            other => return Err(Error::UnsupportedEncoding(other.to_owned())),
        };
        let (width, height, step) = dims(width, height, step)?;
        let rows = rows(data, width, height, step, bytes_per_pixel)?;

        let mut bgr = Vec::with_capacity(width * height * Self::CHANNELS);
        for row in rows {
            for pixel in row.chunks_exact(bytes_per_pixel) {
                bgr.extend_from_slice(&[pixel[blue], pixel[green], pixel[red]]);
            }
        }
        Self::from_bgr8(width, height, bgr)
    }

    pub(crate) fn width(&self) -> usize {
        self.width
    }

    pub(crate) fn height(&self) -> usize {
        self.height
    }

    pub(crate) fn data(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Depth in meters, indexed by `(row, col)`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DepthImage(Array2<f32>);

impl DepthImage {
    pub(crate) fn new(depth: Array2<f32>) -> Self {
        Self(depth)
    }

    /// Decode a raw depth buffer. Integer encodings are millimeters.
    pub(crate) fn decode(
        encoding: &str,
        width: u32,
        height: u32,
        step: u32,
        is_bigendian: bool,
        data: &[u8],
    ) -> Result<Self, Error> {
        let bytes_per_pixel = match encoding {
            "16UC1" | "mono16" => 2,
            "32FC1" => 4,
            other => return Err(Error::UnsupportedEncoding(other.to_owned())),
        };
        let (width, height, step) = dims(width, height, step)?;
        let rows = rows(data, width, height, step, bytes_per_pixel)?;

        let mut meters = Vec::with_capacity(width * height);
        for row in rows {
            for pixel in row.chunks_exact(bytes_per_pixel) {
                meters.push(if bytes_per_pixel == 2 {
                    let raw = [pixel[0], pixel[1]];
                    let millis = if is_bigendian {
                        u16::from_be_bytes(raw)
                    } else {
                        u16::from_le_bytes(raw)
                    };
                    f32::from(millis) / MILLIMETERS_PER_METER
                } else {
                    let raw = [pixel[0], pixel[1], pixel[2], pixel[3]];
                    if is_bigendian {
                        f32::from_be_bytes(raw)
                    } else {
                        f32::from_le_bytes(raw)
                    }
                });
            }
        }

        Array2::from_shape_vec((height, width), meters)
            .map(Self)
            .map_err(Error::ConstructArrayView)
    }

    /// Valid depth at pixel `(x, y)`, truncating to the containing pixel.
    pub(crate) fn at(&self, x: f32, y: f32) -> Option<f32> {
        if !(x.is_finite() && y.is_finite()) || x < 0.0 || y < 0.0 {
            return None;
        }
        self.0
            .get((y as usize, x as usize))
            .copied()
            .filter(|depth| depth.is_finite() && *depth > 0.0)
    }
}

fn dims(width: u32, height: u32, step: u32) -> Result<(usize, usize, usize), Error> {
    Ok((
        usize::try_from(width).map_err(Error::ConvertImageDimToUSize)?,
        usize::try_from(height).map_err(Error::ConvertImageDimToUSize)?,
        usize::try_from(step).map_err(Error::ConvertImageDimToUSize)?,
    ))
}

/// Split a strided buffer into rows of exactly `width` pixels.
fn rows(
    data: &[u8],
    width: usize,
    height: usize,
    step: usize,
    bytes_per_pixel: usize,
) -> Result<impl Iterator<Item = &[u8]>, Error> {
    let row_len = width * bytes_per_pixel;
    if step < row_len {
        return Err(Error::InvalidImageStep {
            step,
            width,
            bytes_per_pixel,
        });
    }
    let expected = step * height;
    if data.len() < expected {
        return Err(Error::ImageDataTooShort {
            expected,
            got: data.len(),
        });
    }
    Ok(data[..expected]
        .chunks(step.max(1))
        .take(height)
        .map(move |row| &row[..row_len]))
}

#[derive(Default)]
struct Latest {
    color: Option<(u64, Arc<ColorImage>)>,
    depth: Option<Arc<DepthImage>>,
    intrinsics: Option<Intrinsics>,
    color_seq: u64,
}

/// Latest color and depth images plus the camera intrinsics, shared between
/// the subscriber callbacks and the workers.
#[derive(Default)]
pub(crate) struct CameraReader {
    latest: Mutex<Latest>,
}

impl CameraReader {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set_color(&self, image: ColorImage) {
        let mut latest = self.latest.lock().unwrap_or_else(PoisonError::into_inner);
        latest.color_seq += 1;
        latest.color = Some((latest.color_seq, Arc::new(image)));
    }

    pub(crate) fn set_depth(&self, image: DepthImage) {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .depth = Some(Arc::new(image));
    }

    pub(crate) fn set_intrinsics(&self, intrinsics: Intrinsics) {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .intrinsics = Some(intrinsics);
    }

    /// The latest color image and its sequence number, if any has arrived.
    pub(crate) fn color_frame(&self) -> Option<(u64, Arc<ColorImage>)> {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .color
            .clone()
    }

    /// Freeze the latest depth image and intrinsics for one output frame.
    pub(crate) fn copy_latest_depth_image(&self) -> DepthSnapshot {
        let latest = self.latest.lock().unwrap_or_else(PoisonError::into_inner);
        DepthSnapshot {
            depth: latest.depth.clone(),
            intrinsics: latest.intrinsics,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct DepthSnapshot {
    depth: Option<Arc<DepthImage>>,
    intrinsics: Option<Intrinsics>,
}

impl DepthSnapshot {
    /// 3D point for pixel `(x, y)`; NaN when depth or intrinsics are unavailable.
    pub(crate) fn compute_3d_point(&self, x: f32, y: f32) -> Point3 {
        match (&self.depth, &self.intrinsics) {
            (Some(depth), Some(intrinsics)) => depth
                .at(x, y)
                .map(|depth| intrinsics.deproject(x, y, depth))
                .unwrap_or_else(Point3::nan),
            _ => Point3::nan(),
        }
    }
}

fn subscribe_error(topic: &str) -> impl FnOnce(rosrust::error::Error) -> Error + '_ {
    move |e| Error::Subscribe {
        topic: topic.to_owned(),
        message: e.to_string(),
    }
}

/// Feed `reader` from the color, depth and camera info topics.
///
/// The returned subscribers must be kept alive for as long as frames are
/// needed.
pub(crate) fn subscribe(
    reader: &Arc<CameraReader>,
    params: &NodeParams,
) -> Result<Vec<rosrust::Subscriber>, Error> {
    let color = {
        let reader = Arc::clone(reader);
        let throttle = Mutex::new(Throttle::new(BAD_IMAGE_WARN_PERIOD));
        rosrust::subscribe(
            &params.color_topic,
            1,
            move |image: msg::sensor_msgs::Image| {
                match ColorImage::decode(
                    &image.encoding,
                    image.width,
                    image.height,
                    image.step,
                    &image.data,
                ) {
                    Ok(color) => reader.set_color(color),
                    Err(e) => {
                        if throttle
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .ready()
                        {
                            warn!(error = %e, "dropping color image");
                        }
                    }
                }
            },
        )
        .map_err(subscribe_error(&params.color_topic))?
    };

    let depth = {
        let reader = Arc::clone(reader);
        let throttle = Mutex::new(Throttle::new(BAD_IMAGE_WARN_PERIOD));
        rosrust::subscribe(
            &params.depth_topic,
            1,
            move |image: msg::sensor_msgs::Image| {
                match DepthImage::decode(
                    &image.encoding,
                    image.width,
                    image.height,
                    image.step,
                    image.is_bigendian != 0,
                    &image.data,
                ) {
                    Ok(depth) => reader.set_depth(depth),
                    Err(e) => {
                        if throttle
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .ready()
                        {
                            warn!(error = %e, "dropping depth image");
                        }
                    }
                }
            },
        )
        .map_err(subscribe_error(&params.depth_topic))?
    };

    let camera_info = {
        let reader = Arc::clone(reader);
        rosrust::subscribe(
            &params.cam_info_topic,
            1,
            move |info: msg::sensor_msgs::CameraInfo| {
                match Intrinsics::from_camera_matrix(&info.K) {
                    Ok(intrinsics) => {
                        debug!(?intrinsics, "received camera intrinsics");
                        reader.set_intrinsics(intrinsics);
                    }
                    Err(e) => warn!(error = %e, "ignoring camera info"),
                }
            },
        )
        .map_err(subscribe_error(&params.cam_info_topic))?
    };

    Ok(vec![color, depth, camera_info])
}
