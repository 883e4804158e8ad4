use anyhow::{anyhow, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::{path::PathBuf, sync::Arc, thread, time::Duration};
use structopt::StructOpt;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;

mod camera;
mod config;
mod decode;
mod engine;
mod error;
mod input;
mod intrinsics;
mod msg;
mod output;
mod pose;
mod throttle;
mod worker;

const NODE_NAME: &str = "pose3d_node";
const SPIN_INTERVAL: Duration = Duration::from_millis(100);

#[derive(structopt::StructOpt)]
struct Opt {
    /// Folder containing the pose models. Overrides the openpose_model_dir parameter.
    #[structopt(long)]
    model_folder: Option<PathBuf>,

    /// Pose model: BODY_25, COCO, MPI or MPI_4_layers.
    #[structopt(long, default_value = "BODY_25")]
    model_pose: pose::PoseModel,

    /// Network input resolution as WxH; -1 on one side keeps the aspect ratio.
    #[structopt(long, default_value = "-1x368", allow_hyphen_values = true)]
    net_resolution: config::NetResolution,

    /// Network definition, relative to the model folder.
    #[structopt(long)]
    prototxt_path: Option<PathBuf>,

    /// Network weights, relative to the model folder.
    #[structopt(long)]
    caffemodel_path: Option<PathBuf>,

    /// Minimum confidence for a body part to be reported.
    #[structopt(long, default_value = "0.05")]
    render_threshold: f32,

    /// Run inference on the GPU when greater than zero.
    #[structopt(long, default_value = "0")]
    num_gpu: i32,

    /// Maximum processing rate. Non-positive values disable the limit.
    #[structopt(long, default_value = "-1", allow_hyphen_values = true)]
    fps_max: f64,

    /// Run every worker sequentially on a single thread.
    #[structopt(long)]
    disable_multi_thread: bool,

    #[structopt(long, default_value = "2")]
    input_queue_size: usize,

    #[structopt(long, default_value = "2")]
    output_queue_size: usize,

    #[structopt(short, long, default_value = "info", env = "RUST_LOG")]
    log_level: tracing_subscriber::filter::EnvFilter,

    #[structopt(short, long)]
    show_progress: bool,
}

fn main() -> Result<()> {
    let opt = Opt::from_iter(rosrust::args());

    tracing::subscriber::set_global_default(
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_file(true)
                    .with_line_number(true),
            )
            .with(opt.log_level),
    )?;

    rosrust::init(NODE_NAME);

    let params = config::NodeParams::from_ros()
        .map_err(|e| {
            error!(error = %e, "missing 'openpose_model_dir' info in launch file");
            e
        })
        .context("missing 'openpose_model_dir' info in launch file")?;
    let model_folder = opt.model_folder.unwrap_or_else(|| params.model_dir.clone());

    let model = engine::ModelFiles::new(
        &model_folder,
        opt.model_pose,
        opt.prototxt_path.as_deref(),
        opt.caffemodel_path.as_deref(),
    );
    let decoder = decode::HeatmapDecoder {
        num_parts: opt.model_pose.num_parts(),
        score_threshold: opt.render_threshold,
    };
    let engine = engine::Engine::new(&model, decoder, opt.net_resolution, opt.num_gpu)
        .context("failed constructing engine")?;

    let camera_reader = Arc::new(camera::CameraReader::new());
    let _subscribers =
        camera::subscribe(&camera_reader, &params).context("failed subscribing to camera")?;

    // the frame consists of the location of detected body parts of each person
    let publisher = msg::RosFramePublisher::new(&params.pub_topic)
        .context("failed advertising frame topic")?;

    let progress = if opt.show_progress {
        Some(
            ProgressBar::new_spinner().with_style(
                ProgressStyle::default_spinner()
                    .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
                    .template("{prefix:.bold.dim} {spinner} {wide_msg}"),
            ),
        )
    } else {
        None
    };

    info!(
        message = "starting pose3d",
        color_topic = %params.color_topic,
        depth_topic = %params.depth_topic,
        pub_topic = %params.pub_topic,
    );

    let wrapper = worker::Wrapper::start(
        input::FrameInput::new(camera_reader.clone(), opt.fps_max),
        engine,
        output::FrameOutput::new(
            publisher,
            camera_reader,
            opt.model_pose.part_names(),
            params.frame_id.clone(),
            progress,
        ),
        worker::WrapperConfig {
            multi_thread: !opt.disable_multi_thread,
            input_queue_size: opt.input_queue_size,
            output_queue_size: opt.output_queue_size,
        },
    )
    .context("failed starting pipeline")?;

    // exit when Ctrl-C is pressed, the node is shut down, or a worker fails
    while rosrust::is_ok() && wrapper.is_running() {
        thread::sleep(SPIN_INTERVAL);
    }
    let halted = rosrust::is_ok();

    info!("exiting pose3d");
    wrapper.stop().context("failed stopping pipeline")?;

    if halted {
        Err(anyhow!("pose pipeline halted"))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{config, Opt};
    use structopt::StructOpt;

    #[test]
    fn net_resolution_accepts_auto_width_as_separate_argument() {
        let opt = Opt::from_iter_safe(&["pose3d_node", "--net-resolution", "-1x256"]).unwrap();
        assert_eq!(opt.net_resolution, "-1x256".parse::<config::NetResolution>().unwrap());
        assert_eq!(opt.net_resolution.input_size(640, 480).unwrap(), (336, 256));

        let opt = Opt::from_iter_safe(&["pose3d_node", "--net-resolution=-1x256"]).unwrap();
        assert_eq!(opt.net_resolution, "-1x256".parse::<config::NetResolution>().unwrap());
    }

    #[test]
    fn defaults_match_documented_values() {
        let opt = Opt::from_iter_safe(&["pose3d_node"]).unwrap();
        assert_eq!(opt.net_resolution, "-1x368".parse::<config::NetResolution>().unwrap());
        assert_eq!(opt.fps_max, -1.0);
        assert!(!opt.disable_multi_thread);
    }
}
