use crate::{error::Error, intrinsics::Point3};
use ndarray::Array3;
use std::{path::PathBuf, str::FromStr};

/// Keypoints of every detected person, shaped `(persons, parts, 3)`.
///
/// The last axis holds `(x, y, score)` in input image pixels. Parts that were
/// not detected are all zeros.
pub(crate) type PoseKeypoints = Array3<f32>;

/// Number of values stored per keypoint: x, y and score.
pub(crate) const KEYPOINT_VALUES: usize = 3;

/// Create a keypoint array holding no persons.
pub(crate) fn empty_keypoints(num_parts: usize) -> PoseKeypoints {
    Array3::zeros((0, num_parts, KEYPOINT_VALUES))
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum PoseModel {
    Body25,
    Coco,
    Mpi,
    Mpi4Layers,
}

impl PoseModel {
    pub(crate) fn part_names(self) -> &'static [&'static str] {
        match self {
            Self::Body25 => &constants::BODY_25_PARTS,
            Self::Coco => &constants::COCO_PARTS,
            Self::Mpi | Self::Mpi4Layers => &constants::MPI_PARTS,
        }
    }

    pub(crate) fn num_parts(self) -> usize {
        self.part_names().len()
    }

    /// Default network definition, relative to the model folder.
    pub(crate) fn prototxt(self) -> PathBuf {
        PathBuf::from(match self {
            Self::Body25 => "pose/body_25/pose_deploy.prototxt",
            Self::Coco => "pose/coco/pose_deploy_linevec.prototxt",
            Self::Mpi => "pose/mpi/pose_deploy_linevec.prototxt",
            Self::Mpi4Layers => "pose/mpi/pose_deploy_linevec_faster_4_stages.prototxt",
        })
    }

    /// Default trained weights, relative to the model folder.
    pub(crate) fn caffemodel(self) -> PathBuf {
        PathBuf::from(match self {
            Self::Body25 => "pose/body_25/pose_iter_584000.caffemodel",
            Self::Coco => "pose/coco/pose_iter_440000.caffemodel",
            Self::Mpi | Self::Mpi4Layers => "pose/mpi/pose_iter_160000.caffemodel",
        })
    }
}

impl Default for PoseModel {
    fn default() -> Self {
        Self::Body25
    }
}

impl FromStr for PoseModel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BODY_25" => Ok(Self::Body25),
            "COCO" => Ok(Self::Coco),
            "MPI" => Ok(Self::Mpi),
            "MPI_4_layers" => Ok(Self::Mpi4Layers),
            other => Err(Error::ParsePoseModel(other.to_owned())),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub(crate) struct Pixel {
    pub(crate) x: f32,
    pub(crate) y: f32,
}

#[derive(Debug, Copy, Clone)]
pub(crate) struct BodyPart {
    pub(crate) pixel: Pixel,
    pub(crate) score: f32,
    pub(crate) point: Point3,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Person {
    pub(crate) body_parts: Vec<BodyPart>,
}

/// All persons detected in a single camera snapshot.
#[derive(Debug, Clone, Default)]
pub(crate) struct Frame {
    pub(crate) frame_id: String,
    pub(crate) persons: Vec<Person>,
}

pub(crate) mod constants {
    pub(crate) const BODY_25_PARTS: [&str; 25] = [
        "Nose",
        "Neck",
        "RShoulder",
        "RElbow",
        "RWrist",
        "LShoulder",
        "LElbow",
        "LWrist",
        "MidHip",
        "RHip",
        "RKnee",
        "RAnkle",
        "LHip",
        "LKnee",
        "LAnkle",
        "REye",
        "LEye",
        "REar",
        "LEar",
        "LBigToe",
        "LSmallToe",
        "LHeel",
        "RBigToe",
        "RSmallToe",
        "RHeel",
    ];

    pub(crate) const COCO_PARTS: [&str; 18] = [
        "Nose",
        "Neck",
        "RShoulder",
        "RElbow",
        "RWrist",
        "LShoulder",
        "LElbow",
        "LWrist",
        "RHip",
        "RKnee",
        "RAnkle",
        "LHip",
        "LKnee",
        "LAnkle",
        "REye",
        "LEye",
        "REar",
        "LEar",
    ];

    pub(crate) const MPI_PARTS: [&str; 15] = [
        "Head",
        "Neck",
        "RShoulder",
        "RElbow",
        "RWrist",
        "LShoulder",
        "LElbow",
        "LWrist",
        "RHip",
        "RKnee",
        "RAnkle",
        "LHip",
        "LKnee",
        "LAnkle",
        "Chest",
    ];
}
