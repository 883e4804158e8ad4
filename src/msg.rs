use crate::{error::Error, output::FramePublisher, pose};

rosrust::rosmsg_include!(sensor_msgs / Image, sensor_msgs / CameraInfo, pose3d_msgs / Frame);

pub(crate) fn frame_to_msg(frame: &pose::Frame, stamp: rosrust::Time) -> pose3d_msgs::Frame {
    pose3d_msgs::Frame {
        header: std_msgs::Header {
            seq: 0,
            stamp,
            frame_id: frame.frame_id.clone(),
        },
        persons: frame
            .persons
            .iter()
            .map(|person| pose3d_msgs::Person {
                body_parts: person
                    .body_parts
                    .iter()
                    .map(|part| pose3d_msgs::BodyPart {
                        score: part.score,
                        pixel: pose3d_msgs::Pixel {
                            x: part.pixel.x,
                            y: part.pixel.y,
                        },
                        point: geometry_msgs::Point {
                            x: f64::from(part.point.x),
                            y: f64::from(part.point.y),
                            z: f64::from(part.point.z),
                        },
                    })
                    .collect(),
            })
            .collect(),
    }
}

/// Publishes frames on a ROS topic, stamped at publish time.
pub(crate) struct RosFramePublisher {
    publisher: rosrust::Publisher<pose3d_msgs::Frame>,
}

impl RosFramePublisher {
    pub(crate) fn new(topic: &str) -> Result<Self, Error> {
        Ok(Self {
            publisher: rosrust::publish(topic, 1).map_err(|e| Error::Advertise {
                topic: topic.to_owned(),
                message: e.to_string(),
            })?,
        })
    }
}

impl FramePublisher for RosFramePublisher {
    fn publish(&self, frame: &pose::Frame) -> Result<(), Error> {
        self.publisher
            .send(frame_to_msg(frame, rosrust::now()))
            .map_err(|e| Error::Publish(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::frame_to_msg;
    use crate::{
        intrinsics::Point3,
        pose::{BodyPart, Frame, Person, Pixel},
    };
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn converts_frame_to_message() {
        let frame = Frame {
            frame_id: "camera_color_optical_frame".to_owned(),
            persons: vec![
                Person {
                    body_parts: vec![BodyPart {
                        pixel: Pixel { x: 10.0, y: 20.0 },
                        score: 0.75,
                        point: Point3::new(0.5, -0.25, 1.5),
                    }],
                },
                Person::default(),
            ],
        };
        let stamp = rosrust::Time { sec: 12, nsec: 34 };

        let msg = frame_to_msg(&frame, stamp);
        assert_eq!(msg.header.frame_id, "camera_color_optical_frame");
        assert_eq!(msg.header.stamp, stamp);
        assert_eq!(msg.persons.len(), 2);
        assert!(msg.persons[1].body_parts.is_empty());

        let part = &msg.persons[0].body_parts[0];
        assert_approx_eq!(part.score, 0.75);
        assert_approx_eq!(part.pixel.x, 10.0);
        assert_approx_eq!(part.pixel.y, 20.0);
        assert_approx_eq!(part.point.x, 0.5);
        assert_approx_eq!(part.point.y, -0.25);
        assert_approx_eq!(part.point.z, 1.5);
    }
}
