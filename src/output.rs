use crate::{
    camera::CameraReader,
    error::Error,
    intrinsics::Point3,
    pose::{BodyPart, Frame, Person, Pixel},
    worker::{Consumer, Datum},
};
use indicatif::ProgressBar;
use num_traits::cast::ToPrimitive;
use std::{sync::Arc, time::Instant};
use tracing::trace;

/// Sink for finished frames.
pub(crate) trait FramePublisher: Send {
    fn publish(&self, frame: &Frame) -> Result<(), Error>;
}

/// Receives keypoints, attaches a 3D point to each and publishes the frame.
pub(crate) struct FrameOutput<P> {
    publisher: P,
    camera: Arc<CameraReader>,
    part_names: &'static [&'static str],
    frame: Frame,
    progress: Option<ProgressBar>,
    published: usize,
    started: Instant,
}

impl<P> FrameOutput<P>
where
    P: FramePublisher,
{
    pub(crate) fn new(
        publisher: P,
        camera: Arc<CameraReader>,
        part_names: &'static [&'static str],
        frame_id: String,
        progress: Option<ProgressBar>,
    ) -> Self {
        Self {
            publisher,
            camera,
            part_names,
            frame: Frame {
                frame_id,
                persons: Vec::new(),
            },
            progress,
            published: 0,
            started: Instant::now(),
        }
    }

    fn report_progress(&self, datum: &Datum) -> Result<(), Error> {
        let progress = match &self.progress {
            Some(progress) => progress,
            None => return Ok(()),
        };
        let model_frames = datum.timing.frames.to_f64().ok_or(Error::ConvertToF64)?;
        let published = self.published.to_f64().ok_or(Error::ConvertToF64)?;
        progress.set_message(format!(
            "FPS => model: {:.1}, published: {:.1}",
            model_frames / datum.timing.inference.as_secs_f64(),
            published / self.started.elapsed().as_secs_f64(),
        ));
        progress.inc(1);
        Ok(())
    }
}

impl<P> Consumer for FrameOutput<P>
where
    P: FramePublisher,
{
    fn consume(&mut self, datum: Datum) -> Result<(), Error> {
        let keypoints = match &datum.keypoints {
            Some(keypoints) => keypoints,
            None => return Ok(()),
        };

        self.frame.persons.clear();

        // every body part of this frame uses the same depth image
        let depth = self.camera.copy_latest_depth_image();
        let part_names = self.part_names;

        for (index, person) in keypoints.outer_iter().enumerate() {
            let body_parts = person
                .outer_iter()
                .enumerate()
                .map(|(part, keypoint)| {
                    let (x, y, score) = (keypoint[0], keypoint[1], keypoint[2]);
                    let point = if score > 0.0 {
                        depth.compute_3d_point(x, y)
                    } else {
                        Point3::nan()
                    };
                    if point.is_finite() {
                        trace!(
                            person = index,
                            part = part_names.get(part).copied().unwrap_or("unknown"),
                            x = point.x,
                            y = point.y,
                            z = point.z,
                            "located body part"
                        );
                    }
                    BodyPart {
                        pixel: Pixel { x, y },
                        score,
                        point,
                    }
                })
                .collect();
            self.frame.persons.push(Person { body_parts });
        }

        self.publisher.publish(&self.frame)?;
        self.published += 1;
        trace!(
            seq = datum.seq,
            persons = self.frame.persons.len(),
            "published frame"
        );

        self.report_progress(&datum)
    }
}
