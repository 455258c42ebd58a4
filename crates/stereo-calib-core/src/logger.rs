//! Logging setup for binaries and examples.
//!
//! Library code in this workspace only talks to the `log` facade. A binary
//! installs either the stderr logger ([`init_with_level`]) or, with the
//! `tracing` feature, a `tracing` subscriber ([`init_tracing`]).
//!
//! Stderr lines look like `[  0.412s  INFO extrinsics] rms 0.213 px`, the tag
//! being the emitting workspace crate.

use std::io::Write;
use std::sync::OnceLock;
use std::time::Instant;

use log::{LevelFilter, Log, Metadata, Record};

#[cfg(feature = "tracing")]
use tracing_subscriber::fmt::format::FmtSpan;
#[cfg(feature = "tracing")]
use tracing_subscriber::util::SubscriberInitExt;
#[cfg(feature = "tracing")]
use tracing_subscriber::{fmt, EnvFilter};

/// Filter used when `RUST_LOG` is unset: dependencies at `warn`, this
/// workspace at `info`.
pub const DEFAULT_FILTER: &str = "warn,stereo_calib=info,stereo_calib_core=info,\
stereo_calib_chessboard=info,stereo_calib_extrinsics=info";

/// Level for a `-v` / `-q` pair of command-line switches.
pub fn verbosity_level(verbose: bool, quiet: bool) -> LevelFilter {
    match (verbose, quiet) {
        (true, _) => LevelFilter::Debug,
        (false, true) => LevelFilter::Warn,
        (false, false) => LevelFilter::Info,
    }
}

/// Short tag for a record target: `stereo_calib_extrinsics::solver` becomes
/// `extrinsics`, the facade crate `calib`, anything else its first segment.
fn target_tag(target: &str) -> &str {
    let krate = target.split("::").next().unwrap_or(target);
    match krate.strip_prefix("stereo_calib_") {
        Some(tag) => tag,
        None if krate == "stereo_calib" => "calib",
        None => krate,
    }
}

struct StderrLogger {
    level: LevelFilter,
    started: Instant,
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(
            stderr,
            "[{:7.3}s {:>5} {}] {}",
            self.started.elapsed().as_secs_f64(),
            record.level(),
            target_tag(record.target()),
            record.args()
        );
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

static LOGGER: OnceLock<StderrLogger> = OnceLock::new();

/// Install the stderr logger. Only the first call has an effect; later
/// calls keep the level chosen first.
pub fn init_with_level(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    if LOGGER.get().is_some() {
        return Ok(());
    }
    let logger = LOGGER.get_or_init(|| StderrLogger {
        level,
        started: Instant::now(),
    });
    log::set_logger(logger)?;
    log::set_max_level(level);
    Ok(())
}

/// Install a `tracing` subscriber writing to stderr, with span close events
/// so the timings of detection, correspondence building and solving show up.
/// `RUST_LOG` overrides [`DEFAULT_FILTER`].
#[cfg(feature = "tracing")]
pub fn init_tracing(json: bool) {
    init_tracing_with_filter(DEFAULT_FILTER, json);
}

/// [`init_tracing`] with a caller-chosen filter for when `RUST_LOG` is unset.
#[cfg(feature = "tracing")]
pub fn init_tracing_with_filter(default_filter: &str, json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let builder = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_span_events(FmtSpan::CLOSE);
    let _ = if json {
        builder.json().flatten_event(true).finish().try_init()
    } else {
        builder
            .with_timer(fmt::time::Uptime::default())
            .finish()
            .try_init()
    };
}

/// Filter keeping dependencies at `warn` and this workspace at `level`.
pub fn workspace_filter(level: LevelFilter) -> String {
    let level = level.to_string().to_lowercase();
    ["stereo_calib", "stereo_calib_core", "stereo_calib_chessboard", "stereo_calib_extrinsics"]
        .iter()
        .fold(String::from("warn"), |acc, krate| format!("{acc},{krate}={level}"))
}
