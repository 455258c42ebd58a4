//! `camera_info.txt` files: precomputed intrinsics as a flat list of
//! `fx, fy, cx, cy, k1, k2, p1, p2[, k3, k4, k5, k6]`.
//!
//! Lines (or line tails) starting with `#` are comments. Values may be split
//! by commas, whitespace or newlines.

use std::fs;
use std::path::{Path, PathBuf};
use stereo_calib_core::{CameraIntrinsics, IntrinsicsError};

const HEADER: &str = "# camera parameters (fx, fy, cx, cy, k1, k2, p1, p2, ...kn)";

#[derive(thiserror::Error, Debug)]
pub enum CameraInfoError {
    #[error("cannot access camera info {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}: `{token}` is not a number")]
    Parse { path: PathBuf, token: String },

    #[error("{path}: {source}")]
    Intrinsics {
        path: PathBuf,
        #[source]
        source: IntrinsicsError,
    },
}

/// Parse camera-info text; the model follows from the value count.
pub fn parse_camera_info(text: &str) -> Result<CameraIntrinsics, ParseFailure> {
    let mut values = Vec::new();
    for line in text.lines() {
        let data = line.split('#').next().unwrap_or_default();
        for token in data
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|t| !t.is_empty())
        {
            let v = token
                .parse::<f64>()
                .map_err(|_| ParseFailure::Token(token.to_string()))?;
            values.push(v);
        }
    }
    CameraIntrinsics::from_params(&values).map_err(ParseFailure::Intrinsics)
}

/// Reason a camera-info text was rejected, before a path is attached.
#[derive(thiserror::Error, Debug)]
pub enum ParseFailure {
    #[error("`{0}` is not a number")]
    Token(String),
    #[error(transparent)]
    Intrinsics(IntrinsicsError),
}

impl ParseFailure {
    fn at(self, path: &Path) -> CameraInfoError {
        let path = path.to_path_buf();
        match self {
            Self::Token(token) => CameraInfoError::Parse { path, token },
            Self::Intrinsics(source) => CameraInfoError::Intrinsics { path, source },
        }
    }
}

pub fn load_camera_info(path: impl AsRef<Path>) -> Result<CameraIntrinsics, CameraInfoError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|source| CameraInfoError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let camera = parse_camera_info(&text).map_err(|e| e.at(path))?;
    log::debug!("loaded {} intrinsics from {}", camera.model(), path.display());
    Ok(camera)
}

/// Camera-info text for `camera`: header comment, then one value per line.
pub fn format_camera_info(camera: &CameraIntrinsics) -> String {
    let mut out = String::from(HEADER);
    out.push('\n');
    for v in camera.params() {
        out.push_str(&format_scientific(v));
        out.push('\n');
    }
    out
}

/// Write `camera` to `path`, creating parent directories.
pub fn save_camera_info(
    camera: &CameraIntrinsics,
    path: impl AsRef<Path>,
) -> Result<(), CameraInfoError> {
    let path = path.as_ref();
    let io_err = |source| CameraInfoError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    fs::write(path, format_camera_info(camera)).map_err(io_err)
}

/// `%.18e` formatting: 18 fractional digits, signed exponent of at least two
/// digits (`6.000000000000000000e+02`).
fn format_scientific(v: f64) -> String {
    let s = format!("{v:.18e}");
    let Some((mantissa, exp)) = s.split_once('e') else {
        return s;
    };
    let (sign, digits) = match exp.strip_prefix('-') {
        Some(d) => ('-', d),
        None => ('+', exp),
    };
    format!("{mantissa}e{sign}{digits:0>2}")
}
