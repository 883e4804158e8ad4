use crate::{
    camera::ColorImage,
    config::NetResolution,
    decode::Decoder,
    error::Error,
    pose::{PoseKeypoints, PoseModel},
    worker::PoseEstimator,
};
use ndarray::ArrayView4;
use num_traits::cast::ToPrimitive;
use opencv::{
    core::{Mat, Mat_AUTO_STEP, Scalar, Size, CV_32F, CV_8UC3},
    dnn,
    prelude::*,
};
use std::{
    convert::TryFrom,
    ffi::c_void,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};
use tracing::info;

const PIXEL_SCALE: f64 = 1.0 / 255.0;

#[derive(Debug, Copy, Clone, Default)]
pub(crate) struct Timing {
    pub(crate) inference: Duration,
    pub(crate) frames: usize,
}

/// Network definition and weights of a pose model.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ModelFiles {
    pub(crate) prototxt: PathBuf,
    pub(crate) caffemodel: PathBuf,
}

impl ModelFiles {
    /// Resolve model files under `model_folder`, with optional overrides
    /// relative to the same folder.
    pub(crate) fn new(
        model_folder: &Path,
        model: PoseModel,
        prototxt: Option<&Path>,
        caffemodel: Option<&Path>,
    ) -> Self {
        Self {
            prototxt: model_folder.join(prototxt.map_or_else(|| model.prototxt(), Path::to_path_buf)),
            caffemodel: model_folder
                .join(caffemodel.map_or_else(|| model.caffemodel(), Path::to_path_buf)),
        }
    }

    pub(crate) fn check_exist(&self) -> Result<(), Error> {
        [&self.prototxt, &self.caffemodel]
            .iter()
            .find(|path| !path.is_file())
            .map_or(Ok(()), |path| Err(Error::FindModelFile(path.to_path_buf())))
    }
}

fn path_str(path: &Path) -> Result<&str, Error> {
    path.to_str()
        .ok_or_else(|| Error::GetModelPathAsStr(path.to_path_buf()))
}

pub(crate) struct Engine<D> {
    net: dnn::Net,
    decoder: D,
    net_resolution: NetResolution,
    pub(crate) timing: Timing,
}

impl<D> Engine<D>
where
    D: Decoder,
{
    pub(crate) fn new(
        model: &ModelFiles,
        decoder: D,
        net_resolution: NetResolution,
        num_gpu: i32,
    ) -> Result<Self, Error> {
        model.check_exist()?;

        let mut net = dnn::read_net_from_caffe(
            path_str(&model.prototxt)?,
            path_str(&model.caffemodel)?,
        )
        .map_err(Error::ReadNet)?;

        let (backend, target) = if num_gpu > 0 {
            (dnn::DNN_BACKEND_CUDA, dnn::DNN_TARGET_CUDA)
        } else {
            (dnn::DNN_BACKEND_OPENCV, dnn::DNN_TARGET_CPU)
        };
        net.set_preferable_backend(backend)
            .map_err(Error::SetPreferableBackend)?;
        net.set_preferable_target(target)
            .map_err(Error::SetPreferableTarget)?;

        info!(
            message = "loaded pose network",
            prototxt = %model.prototxt.display(),
            caffemodel = %model.caffemodel.display(),
            gpu = num_gpu > 0,
        );

        Ok(Self {
            net,
            decoder,
            net_resolution,
            timing: Default::default(),
        })
    }

    fn infer(&mut self, image: &ColorImage) -> Result<Mat, Error> {
        let rows = image.height().to_i32().ok_or(Error::ConvertToI32)?;
        let cols = image.width().to_i32().ok_or(Error::ConvertToI32)?;

        // SAFETY: `input` only borrows the pixels of `image`, which outlives it,
        // and blob_from_image copies them before returning.
        let input = unsafe {
            Mat::new_rows_cols_with_data(
                rows,
                cols,
                CV_8UC3,
                image.data().as_ptr() as *mut c_void,
                Mat_AUTO_STEP,
            )
        }
        .map_err(Error::WrapColorImage)?;

        let (width, height) = self
            .net_resolution
            .input_size(image.width(), image.height())?;
        let blob = dnn::blob_from_image(
            &input,
            PIXEL_SCALE,
            Size::new(width, height),
            Scalar::all(0.0),
            false, // swap_rb
            false, // crop
            CV_32F,
        )
        .map_err(Error::BlobFromImage)?;
        self.net
            .set_input(&blob, "", 1.0, Scalar::all(0.0))
            .map_err(Error::SetInput)?;

        // run inference
        let start_inference = Instant::now();
        let output = self.net.forward_single("").map_err(Error::Forward)?;
        self.timing.inference += start_inference.elapsed();
        self.timing.frames += 1;
        Ok(output)
    }

    pub(crate) fn detect_poses(&mut self, image: &ColorImage) -> Result<PoseKeypoints, Error> {
        let output = self.infer(image)?;

        let shape = output
            .mat_size()
            .iter()
            .map(|&dim| usize::try_from(dim).map_err(Error::ConvertDimI32ToUSize))
            .collect::<Result<Vec<_>, _>>()?;
        let dims = match shape[..] {
            [batch, channels, height, width] => (batch, channels, height, width),
            _ => return Err(Error::GetOutputDims(shape.len())),
        };

        let data = output.data_typed::<f32>().map_err(Error::GetOutputData)?;
        let output = ArrayView4::from_shape(dims, data).map_err(Error::ConstructArrayView)?;
        self.decoder.decode(output, image.width(), image.height())
    }
}

impl<D> PoseEstimator for Engine<D>
where
    D: Decoder + Send,
{
    fn estimate(&mut self, image: &ColorImage) -> Result<PoseKeypoints, Error> {
        self.detect_poses(image)
    }

    fn timing(&self) -> Timing {
        self.timing
    }
}

#[cfg(test)]
mod tests {
    use super::ModelFiles;
    use crate::pose::PoseModel;
    use std::path::{Path, PathBuf};

    #[test]
    fn resolves_default_model_files() {
        let files = ModelFiles::new(Path::new("/models"), PoseModel::Coco, None, None);
        assert_eq!(
            files.prototxt,
            PathBuf::from("/models/pose/coco/pose_deploy_linevec.prototxt")
        );
        assert_eq!(
            files.caffemodel,
            PathBuf::from("/models/pose/coco/pose_iter_440000.caffemodel")
        );
    }

    #[test]
    fn overrides_are_relative_to_model_folder() {
        let files = ModelFiles::new(
            Path::new("/models"),
            PoseModel::Body25,
            Some(Path::new("custom/net.prototxt")),
            None,
        );
        assert_eq!(files.prototxt, PathBuf::from("/models/custom/net.prototxt"));
        assert_eq!(
            files.caffemodel,
            PathBuf::from("/models/pose/body_25/pose_iter_584000.caffemodel")
        );
    }

    #[test]
    fn missing_model_files_are_reported() {
        let files = ModelFiles::new(
            Path::new("/nonexistent/pose3d/models"),
            PoseModel::Body25,
            None,
            None,
        );
        assert!(files.check_exist().is_err());
    }
}
