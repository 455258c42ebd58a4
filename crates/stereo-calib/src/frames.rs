//! Frame sequence discovery.
//!
//! Frame `i` of one sequence and frame `i` of the other are assumed to show
//! the same instant. Both directories are listed in natural filename order, so
//! this holds when both cameras use the same naming scheme.

use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};

const FRAME_EXTENSIONS: [&str; 2] = ["jpg", "png"];

#[derive(thiserror::Error, Debug)]
pub enum FrameError {
    #[error("cannot read frame directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} is not a directory")]
    NotADirectory(PathBuf),
}

/// `.jpg` and `.png` files directly inside `dir`, naturally sorted by name.
pub fn list_frames(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>, FrameError> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Err(FrameError::NotADirectory(dir.to_path_buf()));
    }
    let read_err = |source| FrameError::ReadDir {
        path: dir.to_path_buf(),
        source,
    };

    let mut frames = Vec::new();
    for entry in fs::read_dir(dir).map_err(read_err)? {
        let path = entry.map_err(read_err)?.path();
        if path.is_file() && is_frame(&path) {
            frames.push(path);
        }
    }
    natural_sort_paths(&mut frames);
    log::debug!("{} frames in {}", frames.len(), dir.display());
    Ok(frames)
}

/// Second sequence built by joining every file name of `frames` onto `dir`.
///
/// For rigs whose cameras write identically named files. Paths are not
/// checked for existence here; a missing file surfaces when it is loaded.
pub fn pair_by_filename(frames: &[PathBuf], dir: impl AsRef<Path>) -> Vec<PathBuf> {
    let dir = dir.as_ref();
    frames
        .iter()
        .filter_map(|p| p.file_name().map(|name| dir.join(name)))
        .collect()
}

fn is_frame(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| FRAME_EXTENSIONS.contains(&e))
}

pub fn natural_sort<S: AsRef<str>>(items: &mut [S]) {
    items.sort_by(|a, b| natural_cmp(a.as_ref(), b.as_ref()));
}

pub fn natural_sort_paths(paths: &mut [PathBuf]) {
    paths.sort_by(|a, b| natural_cmp(&a.to_string_lossy(), &b.to_string_lossy()));
}

#[derive(Debug, PartialEq, Eq)]
enum Chunk<'a> {
    Text(&'a str),
    Number(&'a str),
}

fn chunks(s: &str) -> Vec<Chunk<'_>> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut digits = None;
    for (i, c) in s.char_indices() {
        let is_digit = c.is_ascii_digit();
        match digits {
            Some(prev) if prev != is_digit => {
                out.push(chunk(&s[start..i], prev));
                start = i;
            }
            _ => {}
        }
        digits = Some(is_digit);
    }
    if let Some(prev) = digits {
        out.push(chunk(&s[start..], prev));
    }
    out
}

fn chunk(s: &str, digits: bool) -> Chunk<'_> {
    if digits {
        Chunk::Number(s)
    } else {
        Chunk::Text(s)
    }
}

/// Compare digit runs by value without parsing (arbitrary length).
fn cmp_numeric(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Human ordering: digit runs compare by numeric value, text runs
/// case-insensitively. Strings equal under that rule fall back to a plain
/// comparison so the order stays total.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let (ca, cb) = (chunks(a), chunks(b));
    for (x, y) in ca.iter().zip(&cb) {
        let ord = match (x, y) {
            (Chunk::Number(x), Chunk::Number(y)) => cmp_numeric(x, y),
            (Chunk::Text(x), Chunk::Text(y)) => x.to_lowercase().cmp(&y.to_lowercase()),
            // digits before letters, as in a byte-wise comparison
            (Chunk::Number(_), Chunk::Text(_)) => Ordering::Less,
            (Chunk::Text(_), Chunk::Number(_)) => Ordering::Greater,
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    ca.len().cmp(&cb.len()).then_with(|| a.cmp(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_sort_by_value() {
        let mut names = vec!["f10", "f2", "f1"];
        natural_sort(&mut names);
        assert_eq!(vec!["f1", "f2", "f10"], names);

        let mut names = vec!["f1", "f10", "f2"];
        natural_sort(&mut names);
        assert_eq!(vec!["f1", "f2", "f10"], names);
    }

    #[test]
    fn mixed_names() {
        let mut names = vec![
            "img_010.png",
            "IMG_9.png",
            "img_100.png",
            "a.png",
            "img_10b.png",
            "img_10a.png",
        ];
        natural_sort(&mut names);
        assert_eq!(
            vec![
                "a.png",
                "IMG_9.png",
                "img_010.png",
                "img_10a.png",
                "img_10b.png",
                "img_100.png",
            ],
            names
        );
    }

    #[test]
    fn order_is_total() {
        assert_eq!(Ordering::Equal, natural_cmp("frame7", "frame7"));
        assert_ne!(Ordering::Equal, natural_cmp("frame07", "frame7"));
        assert_ne!(Ordering::Equal, natural_cmp("Frame", "frame"));
        assert_eq!(Ordering::Less, natural_cmp("frame", "frame1"));
        assert_eq!(Ordering::Less, natural_cmp("", "a"));
        assert_eq!(
            natural_cmp("x99999999999999999999999", "x100000000000000000000000"),
            Ordering::Less
        );
    }

    #[test]
    fn lists_only_frames_in_natural_order() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["f10.png", "f2.jpg", "f1.png", "notes.txt", "f3.bmp"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        fs::create_dir(dir.path().join("f0.png")).unwrap();

        let frames = list_frames(dir.path()).unwrap();
        let names: Vec<_> = frames
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(vec!["f1.png", "f2.jpg", "f10.png"], names);
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = list_frames(dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, FrameError::NotADirectory(_)));
    }

    #[test]
    fn pairs_by_file_name() {
        let a = vec![PathBuf::from("/rgb/0001.png"), PathBuf::from("/rgb/0002.png")];
        let b = pair_by_filename(&a, "/ir");
        assert_eq!(
            vec![PathBuf::from("/ir/0001.png"), PathBuf::from("/ir/0002.png")],
            b
        );
    }
}
