use crate::{
    error::Error,
    pose::{self, PoseKeypoints, KEYPOINT_VALUES},
};
use ndarray::{s, Array3, ArrayView2, ArrayView4};
use num_traits::cast::ToPrimitive;
use ordered_float::NotNan;

pub(crate) trait Decoder {
    /// Return the number of output channels the decoder expects to operate on.
    fn expected_output_channels(&self) -> usize;

    /// Decode network output shaped `[1, channels, height, width]` into
    /// keypoints in the pixel space of an `image_width` x `image_height` input.
    fn decode(
        &self,
        output: ArrayView4<f32>,
        image_width: usize,
        image_height: usize,
    ) -> Result<PoseKeypoints, Error>;

    /// Validate that the network produces enough output channels.
    fn validate_output_channels(&self, output_channels: usize) -> Result<(), Error> {
        let expected_output_channels = self.expected_output_channels();
        if output_channels < expected_output_channels {
            Err(Error::GetExpectedNumOutputs(
                expected_output_channels,
                output_channels,
            ))
        } else {
            Ok(())
        }
    }
}

/// Reduces each part confidence map to its strongest peak, reporting at most
/// one person per frame.
#[derive(Debug, Clone, Copy)]
pub(crate) struct HeatmapDecoder {
    pub(crate) num_parts: usize,
    pub(crate) score_threshold: f32,
}

struct Peak {
    x: usize,
    y: usize,
    score: NotNan<f32>,
}

fn find_peak(heatmap: ArrayView2<f32>) -> Result<Option<Peak>, Error> {
    let mut best: Option<Peak> = None;
    for ((y, x), &score) in heatmap.indexed_iter() {
        let score = NotNan::new(score).map_err(|e| Error::ConstructNotNan(e, score))?;
        if best.as_ref().map_or(true, |peak| score > peak.score) {
            best = Some(Peak { x, y, score });
        }
    }
    Ok(best)
}

impl Decoder for HeatmapDecoder {
    fn expected_output_channels(&self) -> usize {
        self.num_parts
    }

    fn decode(
        &self,
        output: ArrayView4<f32>,
        image_width: usize,
        image_height: usize,
    ) -> Result<PoseKeypoints, Error> {
        let (_, channels, height, width) = output.dim();
        self.validate_output_channels(channels)?;

        let scale_x = image_width.to_f32().ok_or(Error::ConvertToF32)?
            / width.to_f32().ok_or(Error::ConvertToF32)?;
        let scale_y = image_height.to_f32().ok_or(Error::ConvertToF32)?
            / height.to_f32().ok_or(Error::ConvertToF32)?;

        let mut person = Array3::<f32>::zeros((1, self.num_parts, KEYPOINT_VALUES));
        let mut detected = false;

        for part in 0..self.num_parts {
            let peak = match find_peak(output.slice(s![0, part, .., ..]))? {
                Some(peak) if peak.score.into_inner() >= self.score_threshold => peak,
                _ => continue,
            };
            detected = true;
            person[(0, part, 0)] = peak.x.to_f32().ok_or(Error::ConvertToF32)? * scale_x;
            person[(0, part, 1)] = peak.y.to_f32().ok_or(Error::ConvertToF32)? * scale_y;
            person[(0, part, 2)] = peak.score.into_inner();
        }

        Ok(if detected {
            person
        } else {
            pose::empty_keypoints(self.num_parts)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{Decoder, HeatmapDecoder};
    use assert_approx_eq::assert_approx_eq;
    use ndarray::Array4;

    fn decoder() -> HeatmapDecoder {
        HeatmapDecoder {
            num_parts: 2,
            score_threshold: 0.1,
        }
    }

    #[test]
    fn decodes_peaks_in_image_pixels() {
        // 2 parts + 1 background channel on a 4x8 grid
        let mut output = Array4::<f32>::zeros((1, 3, 4, 8));
        output[(0, 0, 1, 2)] = 0.9;
        output[(0, 0, 3, 7)] = 0.4;
        output[(0, 1, 2, 5)] = 0.6;
        output[(0, 2, 0, 0)] = 1.0;

        let keypoints = decoder().decode(output.view(), 64, 32).unwrap();
        assert_eq!(keypoints.dim(), (1, 2, 3));

        assert_approx_eq!(keypoints[(0, 0, 0)], 16.0);
        assert_approx_eq!(keypoints[(0, 0, 1)], 8.0);
        assert_approx_eq!(keypoints[(0, 0, 2)], 0.9);

        assert_approx_eq!(keypoints[(0, 1, 0)], 40.0);
        assert_approx_eq!(keypoints[(0, 1, 1)], 16.0);
        assert_approx_eq!(keypoints[(0, 1, 2)], 0.6);
    }

    #[test]
    fn weak_parts_are_zeroed() {
        let mut output = Array4::<f32>::zeros((1, 2, 2, 2));
        output[(0, 0, 1, 1)] = 0.5;
        output[(0, 1, 1, 0)] = 0.05;

        let keypoints = decoder().decode(output.view(), 2, 2).unwrap();
        assert_eq!(keypoints.dim(), (1, 2, 3));
        assert_approx_eq!(keypoints[(0, 0, 2)], 0.5);
        assert_approx_eq!(keypoints[(0, 1, 0)], 0.0);
        assert_approx_eq!(keypoints[(0, 1, 1)], 0.0);
        assert_approx_eq!(keypoints[(0, 1, 2)], 0.0);
    }

    #[test]
    fn nobody_detected() {
        let output = Array4::<f32>::zeros((1, 2, 4, 4));
        let keypoints = decoder().decode(output.view(), 16, 16).unwrap();
        assert_eq!(keypoints.dim(), (0, 2, 3));
    }

    #[test]
    fn too_few_channels() {
        let output = Array4::<f32>::zeros((1, 1, 4, 4));
        assert!(decoder().decode(output.view(), 16, 16).is_err());
    }

    #[test]
    fn nan_scores_are_errors() {
        let mut output = Array4::<f32>::zeros((1, 2, 2, 2));
        output[(0, 0, 0, 1)] = f32::NAN;
        assert!(decoder().decode(output.view(), 2, 2).is_err());
    }
}
