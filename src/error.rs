#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[error("missing '{0}' parameter")]
    GetRequiredParam(&'static str),

    #[error("failed to parse net resolution {0:?}: expected WxH with at most one -1")]
    ParseNetResolution(String),

    #[error("failed to parse pose model {0:?}: expected one of BODY_25, COCO, MPI, MPI_4_layers")]
    ParsePoseModel(String),

    #[error("cannot compute net input size for a {0}x{1} image")]
    ComputeNetInputSize(usize, usize),

    #[error("failed to get model path as &str: {0:?}")]
    GetModelPathAsStr(std::path::PathBuf),

    #[error("model file does not exist: {0:?}")]
    FindModelFile(std::path::PathBuf),

    #[error("failed to read caffe network")]
    ReadNet(#[source] opencv::Error),

    #[error("failed to set preferable dnn backend")]
    SetPreferableBackend(#[source] opencv::Error),

    #[error("failed to set preferable dnn target")]
    SetPreferableTarget(#[source] opencv::Error),

    #[error("failed to wrap color image in a Mat")]
    WrapColorImage(#[source] opencv::Error),

    #[error("failed to construct input blob from image")]
    BlobFromImage(#[source] opencv::Error),

    #[error("failed to set network input")]
    SetInput(#[source] opencv::Error),

    #[error("failed to run forward pass")]
    Forward(#[source] opencv::Error),

    #[error("failed to get output Mat data")]
    GetOutputData(#[source] opencv::Error),

    #[error("expected a 4 dimensional network output, got {0} dimensions")]
    GetOutputDims(usize),

    #[error("expected at least {0} output channels, got {1}")]
    GetExpectedNumOutputs(usize, usize),

    #[error("failed to construct array view from network output")]
    ConstructArrayView(#[source] ndarray::ShapeError),

    #[error("failed to construct NotNan from f32: {1}")]
    ConstructNotNan(#[source] ordered_float::FloatIsNan, f32),

    #[error("failed to convert value to f32")]
    ConvertToF32,

    #[error("failed to convert value to f64")]
    ConvertToF64,

    #[error("failed to convert value to i32")]
    ConvertToI32,

    #[error("failed to convert dim i32 to usize")]
    ConvertDimI32ToUSize(#[source] std::num::TryFromIntError),

    #[error("failed to convert u32 image dimension to usize")]
    ConvertImageDimToUSize(#[source] std::num::TryFromIntError),

    #[error("unsupported image encoding: {0:?}")]
    UnsupportedEncoding(String),

    #[error("image row step {step} is smaller than a row of {width} pixels of {bytes_per_pixel} bytes")]
    InvalidImageStep {
        step: usize,
        width: usize,
        bytes_per_pixel: usize,
    },

    #[error("image buffer too short: expected {expected} bytes, got {got}")]
    ImageDataTooShort { expected: usize, got: usize },

    #[error("invalid camera matrix: focal lengths must be non-zero, got fx={0}, fy={1}")]
    InvalidCameraMatrix(f64, f64),

    #[error("failed to subscribe to {topic}: {message}")]
    Subscribe { topic: String, message: String },

    #[error("failed to advertise {topic}: {message}")]
    Advertise { topic: String, message: String },

    #[error("failed to publish frame: {0}")]
    Publish(String),

    #[error("failed to spawn {1} worker thread")]
    SpawnWorker(#[source] std::io::Error, &'static str),

    #[error("{0} worker panicked")]
    JoinWorker(&'static str),
}
