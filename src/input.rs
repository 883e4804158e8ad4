use crate::{
    camera::CameraReader,
    error::Error,
    throttle::Throttle,
    worker::{Datum, Producer},
};
use std::{
    sync::Arc,
    thread,
    time::{Duration, Instant},
};
use tracing::{trace, warn};

const IDLE_SLEEP: Duration = Duration::from_millis(1);
const EMPTY_FRAME_WARN_PERIOD: Duration = Duration::from_secs(10);

/// Supplies the latest color frame from the camera to the pose estimator.
pub(crate) struct FrameInput {
    camera: Arc<CameraReader>,
    last_seq: Option<u64>,
    min_interval: Option<Duration>,
    last_produced: Option<Instant>,
    empty_frame_warning: Throttle,
    idle_sleep: Duration,
}

impl FrameInput {
    /// `fps_max <= 0` disables rate limiting.
    pub(crate) fn new(camera: Arc<CameraReader>, fps_max: f64) -> Self {
        Self {
            camera,
            last_seq: None,
            min_interval: if fps_max > 0.0 && fps_max.is_finite() {
                Some(Duration::from_secs_f64(1.0 / fps_max))
            } else {
                None
            },
            last_produced: None,
            empty_frame_warning: Throttle::new(EMPTY_FRAME_WARN_PERIOD),
            idle_sleep: IDLE_SLEEP,
        }
    }

    fn rate_limited(&self) -> bool {
        match (self.min_interval, self.last_produced) {
            (Some(interval), Some(last)) => last.elapsed() < interval,
            _ => false,
        }
    }
}

impl Producer for FrameInput {
    fn produce(&mut self) -> Result<Option<Datum>, Error> {
        thread::sleep(self.idle_sleep);

        if self.rate_limited() {
            return Ok(None);
        }

        let (seq, image) = match self.camera.color_frame() {
            Some((seq, _)) if self.last_seq == Some(seq) => return Ok(None),
            Some((seq, image)) if !image.is_empty() => (seq, image),
            frame => {
                self.last_seq = frame.map(|(seq, _)| seq).or(self.last_seq);
                if self.empty_frame_warning.ready() {
                    warn!("empty color image frame detected, ignoring");
                }
                return Ok(None);
            }
        };
        self.last_seq = Some(seq);
        self.last_produced = Some(Instant::now());

        trace!(seq, width = image.width(), height = image.height(), "produced frame");
        Ok(Some(Datum::new(seq, image)))
    }
}

#[cfg(test)]
mod tests {
    use super::FrameInput;
    use crate::{
        camera::{CameraReader, ColorImage},
        worker::Producer,
    };
    use std::{sync::Arc, time::Duration};

    fn image(value: u8) -> ColorImage {
        ColorImage::from_bgr8(1, 1, vec![value; 3]).unwrap()
    }

    fn input(camera: &Arc<CameraReader>, fps_max: f64) -> FrameInput {
        let mut input = FrameInput::new(camera.clone(), fps_max);
        input.idle_sleep = Duration::from_millis(0);
        input
    }

    #[test]
    fn missing_frame_is_skipped() {
        let camera = Arc::new(CameraReader::new());
        let mut input = input(&camera, -1.0);
        assert!(input.produce().unwrap().is_none());
        assert!(input.produce().unwrap().is_none());
    }

    #[test]
    fn each_frame_is_produced_once() {
        let camera = Arc::new(CameraReader::new());
        let mut input = input(&camera, -1.0);

        camera.set_color(image(1));
        let datum = input.produce().unwrap().unwrap();
        assert_eq!(datum.image.data(), &[1, 1, 1]);
        assert!(datum.keypoints.is_none());
        assert!(input.produce().unwrap().is_none());

        camera.set_color(image(2));
        let next = input.produce().unwrap().unwrap();
        assert!(next.seq > datum.seq);
        assert_eq!(next.image.data(), &[2, 2, 2]);
    }

    #[test]
    fn empty_frame_is_skipped() {
        let camera = Arc::new(CameraReader::new());
        let mut input = input(&camera, -1.0);

        camera.set_color(ColorImage::from_bgr8(0, 0, Vec::new()).unwrap());
        assert!(input.produce().unwrap().is_none());
        assert!(input.produce().unwrap().is_none());

        camera.set_color(ColorImage::from_bgr8(4, 0, Vec::new()).unwrap());
        assert!(input.produce().unwrap().is_none());

        camera.set_color(image(3));
        let datum = input.produce().unwrap().unwrap();
        assert_eq!(datum.image.data(), &[3, 3, 3]);
    }

    #[test]
    fn fps_max_limits_rate() {
        let camera = Arc::new(CameraReader::new());
        let mut input = input(&camera, 0.001);

        camera.set_color(image(1));
        assert!(input.produce().unwrap().is_some());

        camera.set_color(image(2));
        assert!(input.produce().unwrap().is_none());
    }
}
