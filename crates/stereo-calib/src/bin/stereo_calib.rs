use std::error::Error;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use clap::Parser;
use log::LevelFilter;
#[cfg(not(feature = "tracing"))]
use stereo_calib::core::init_with_level;
#[cfg(feature = "tracing")]
use stereo_calib::core::{init_tracing_with_filter, workspace_filter};
use stereo_calib::core::verbosity_level;
use stereo_calib::{
    calibrate_stereo_checkerboard, load_camera_info, CheckerboardPattern, ExportFormat,
    FramePairing, StereoCalibConfig, StereoCalibInput, DEFAULT_CAM1_NAME, DEFAULT_CAM2_NAME,
};
#[cfg(feature = "tracing")]
use tracing_log::LogTracer;

/// Estimate the rigid transform between two cameras from synchronized
/// checkerboard frames, with both cameras' intrinsics held fixed.
#[derive(Debug, Parser)]
#[command(author, version, about = "Stereo extrinsic calibration with a checkerboard")]
struct Args {
    /// Folder with the frames of camera 1 (.jpg / .png).
    input_dir_1: PathBuf,

    /// Folder with the frames of camera 2 (.jpg / .png).
    input_dir_2: PathBuf,

    /// camera_info.txt of camera 1 (fx, fy, cx, cy, k1, k2, p1, p2, ...kn).
    camera_info_1: PathBuf,

    /// camera_info.txt of camera 2.
    camera_info_2: PathBuf,

    /// Checkerboard inner corners and square size, ROWSxCOLUMNSxSQUARE_SIZE (e.g. 7x6x70).
    #[arg(long, value_name = "ROWSxCOLUMNSxSQUARE_SIZE")]
    checkerboard: CheckerboardPattern,

    /// Where to save the rig (.yaml, .yml or .json). Printed to stdout if omitted.
    #[arg(long)]
    savepath: Option<PathBuf>,

    /// Optional JSON StereoCalibConfig. Defaults are used if omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Name of camera 1 in the exported keys.
    #[arg(long)]
    cam1_name: Option<String>,

    /// Name of camera 2 in the exported keys.
    #[arg(long)]
    cam2_name: Option<String>,

    /// Pair frames by identical file name instead of by sorted position.
    #[arg(long)]
    pair_by_name: bool,

    /// Fewest frame pairs with the board visible in both views.
    #[arg(long)]
    min_observations: Option<usize>,

    /// Write the calibration report as JSON.
    #[arg(long)]
    report: Option<PathBuf>,

    /// Confirm that the two frame sequences are synchronized without asking.
    #[arg(short = 'y', long)]
    yes: bool,

    /// Debug logging.
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Warnings and errors only.
    #[arg(short, long)]
    quiet: bool,
}

impl Args {
    fn resolve_config(&self) -> Result<StereoCalibConfig, Box<dyn Error>> {
        let mut config = match &self.config {
            Some(path) => StereoCalibConfig::load_json(path)?,
            None => StereoCalibConfig::default(),
        };
        if let Some(name) = &self.cam1_name {
            config.cam1_name = name.clone();
        }
        if let Some(name) = &self.cam2_name {
            config.cam2_name = name.clone();
        }
        if self.pair_by_name {
            config.pairing = FramePairing::FileName;
        }
        if let Some(n) = self.min_observations {
            config.solver.min_observations = n;
        }
        if config.cam1_name.is_empty() {
            config.cam1_name = DEFAULT_CAM1_NAME.to_string();
        }
        if config.cam2_name.is_empty() {
            config.cam2_name = DEFAULT_CAM2_NAME.to_string();
        }
        config.validate()?;
        if let Some(path) = &self.savepath {
            ExportFormat::from_path(path)?;
        }
        Ok(config)
    }

    fn log_level(&self) -> LevelFilter {
        verbosity_level(self.verbose, self.quiet)
    }
}

fn init_logging(level: LevelFilter) {
    #[cfg(feature = "tracing")]
    {
        let _ = LogTracer::init();
        init_tracing_with_filter(&workspace_filter(level), false);
    }
    #[cfg(not(feature = "tracing"))]
    {
        let _ = init_with_level(level);
    }
}

/// Ask until the answer is `y` or `n`. End of input counts as no answer.
fn confirm_synchronized(
    input: &mut impl BufRead,
    output: &mut impl Write,
) -> io::Result<Option<bool>> {
    writeln!(
        output,
        "[WARN]: frame i of input_dir_1 must show the same instant as frame i of input_dir_2."
    )?;
    write!(output, "        Are the two frame sequences synchronized? [y/n]  ")?;
    output.flush()?;

    let mut line = String::new();
    loop {
        line.clear();
        if input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        match line.trim() {
            "y" => return Ok(Some(true)),
            "n" => return Ok(Some(false)),
            _ => {
                write!(output, "Please enter [y] or [n].  ")?;
                output.flush()?;
            }
        }
    }
}

fn main() {
    if let Err(err) = try_main() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_logging(args.log_level());
    let config = args.resolve_config()?;

    if !args.yes {
        let answer = confirm_synchronized(&mut io::stdin().lock(), &mut io::stdout())?;
        match answer {
            Some(true) => {}
            Some(false) => {
                println!("Aborted: synchronize the frame sequences first.");
                return Ok(());
            }
            None => return Err("synchronization not confirmed (pass --yes to skip the prompt)".into()),
        }
    }

    let input = StereoCalibInput {
        frames_dir1: args.input_dir_1.clone(),
        frames_dir2: args.input_dir_2.clone(),
        cam1: load_camera_info(&args.camera_info_1)?,
        cam2: load_camera_info(&args.camera_info_2)?,
        pattern: args.checkerboard,
    };

    println!("Estimating camera-to-camera transformation...");
    let run = calibrate_stereo_checkerboard(&input, &config)?;
    println!("\n{}", run.report);

    if let Some(path) = &args.report {
        std::fs::write(path, serde_json::to_string_pretty(&run.report)?)?;
    }

    match &args.savepath {
        Some(path) => {
            run.export(path)?;
            println!("\nSaved camera parameters to {}", path.display());
        }
        None => {
            let yaml = run
                .rig
                .to_yaml_string(&config.cam1_name, &config.cam2_name)?;
            println!("\n{yaml}");
        }
    }
    Ok(())
}
